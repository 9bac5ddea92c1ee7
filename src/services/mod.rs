// ==========================================
// 畜产品合规引擎 - 服务层
// ==========================================
// 职责: 编排引擎 + 仓储 + 通知, 承载有副作用的流程
// ==========================================

pub mod alert_lifecycle;
pub mod countdown_scheduler;
pub mod daily_scheduler;
pub mod error;
pub mod expiry_reconciler;
pub mod pattern_detector;
pub mod run_guard;
pub mod violation_intake;

pub use alert_lifecycle::AlertLifecycleManager;
pub use countdown_scheduler::{CountdownSweepReport, WithdrawalCountdownScheduler};
pub use daily_scheduler::{next_trigger_after, DailyScheduler};
pub use error::{ServiceError, ServiceResult};
pub use expiry_reconciler::{ExpiryReconciliationReport, WithdrawalExpiryReconciler};
pub use pattern_detector::{PatternCheckRequest, PatternDetector, PatternTrigger, PatternWorker};
pub use run_guard::SweepOutcome;
pub use violation_intake::{LabTestIntakeOutcome, ViolationIntakeService};
