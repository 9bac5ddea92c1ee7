// ==========================================
// 畜产品合规引擎 - 监管预警数据仓储
// ==========================================
// 红线: 预警只增不删
// 并发: 更新一律使用 revision 乐观锁
// ==========================================

mod core;
mod queries;


pub use self::core::RegulatorAlertRepository;
pub use self::queries::{AlertCountRow, AlertStats};
