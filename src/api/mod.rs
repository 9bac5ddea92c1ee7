// ==========================================
// 畜产品合规引擎 - API 层
// ==========================================
// 职责: 查询接口 + 预警管理接口 + 运维手动触发
// ==========================================

pub mod alert_api;
pub mod compliance_api;
pub mod error;
pub mod operations_api;

pub use alert_api::{AlertApi, AlertDetail, FarmViolationHistory};
pub use compliance_api::{ComplianceApi, SaleAttemptResult};
pub use error::{ApiError, ApiResult};
pub use operations_api::OperationsApi;
