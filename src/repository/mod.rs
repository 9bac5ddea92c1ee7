// ==========================================
// 畜产品合规引擎 - 数据仓储层 (养殖档案协作方)
// ==========================================
// 红线: Repository 不含业务逻辑
// ==========================================
// 职责: 提供数据访问接口,屏蔽数据库细节
// 约束: 所有查询使用参数化,防止 SQL 注入
// ==========================================

pub mod alert_repo;
pub mod animal_repo;
pub mod countdown_repo;
pub mod error;
pub mod lab_test_repo;
pub mod treatment_repo;

// 重导出核心仓储
pub use alert_repo::{AlertCountRow, AlertStats, RegulatorAlertRepository};
pub use animal_repo::AnimalRepository;
pub use countdown_repo::{CountdownNotificationRecord, CountdownNotificationRepository};
pub use error::{RepositoryError, RepositoryResult};
pub use lab_test_repo::LabTestRepository;
pub use treatment_repo::TreatmentRepository;
