// ==========================================
// 畜产品合规引擎 - 应用层
// ==========================================
// 职责: 组件装配, 供二进制入口与集成测试使用
// ==========================================

pub mod state;

// 重导出
pub use state::{get_default_db_path, AppState};
