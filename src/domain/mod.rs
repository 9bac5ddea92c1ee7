// ==========================================
// 畜产品合规引擎 - 领域模型层
// ==========================================
// 职责: 定义领域实体、类型
// 红线: 不含数据访问逻辑,不含引擎逻辑
// ==========================================

pub mod alert;
pub mod animal;
pub mod treatment;
pub mod types;

// 重导出核心类型
pub use alert::{AlertFilter, NewAlert, Page, RegulatorAlert};
pub use animal::Animal;
pub use lab_test::LabTestResult;
pub use treatment::Treatment;
pub use types::{
    AlertStatus, AlertType, ApprovalStatus, ComplianceStatus, ReviewStatus, RiskLevel, Severity,
};
