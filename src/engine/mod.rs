// ==========================================
// 畜产品合规引擎 - 引擎层
// ==========================================
// 职责: 实现业务规则引擎,不拼 SQL
// 红线: Engine 不拼 SQL, 所有判定必须输出原因
// ==========================================

pub mod compliance_status;
pub mod error;
pub mod pattern;
pub mod violation_classifier;

// 重导出核心引擎
pub use compliance_status::{
    ComplianceCounts, ComplianceDetails, ComplianceQuery, ComplianceReport,
    ComplianceStatusResolver,
};
pub use error::{EngineError, EngineResult};
pub use pattern::{PatternDecision, PatternEvaluator, PatternObservation, PriorPatternAlert};
pub use violation_classifier::{ViolationClassification, ViolationClassifier};
