// ==========================================
// 畜产品合规引擎 - 运维手动触发
// ==========================================
// 与定时任务共用同一实例, 防重入标志同样生效
// ==========================================

use std::sync::Arc;

use crate::api::error::ApiResult;
use crate::services::countdown_scheduler::{CountdownSweepReport, WithdrawalCountdownScheduler};
use crate::services::expiry_reconciler::{ExpiryReconciliationReport, WithdrawalExpiryReconciler};
use crate::services::run_guard::SweepOutcome;

pub struct OperationsApi {
    countdown: Arc<WithdrawalCountdownScheduler>,
    expiry: Arc<WithdrawalExpiryReconciler>,
}

impl OperationsApi {
    pub fn new(
        countdown: Arc<WithdrawalCountdownScheduler>,
        expiry: Arc<WithdrawalExpiryReconciler>,
    ) -> Self {
        Self { countdown, expiry }
    }

    pub async fn run_withdrawal_countdown_sweep(
        &self,
    ) -> ApiResult<SweepOutcome<CountdownSweepReport>> {
        tracing::info!("手动触发休药倒计时扫描");
        Ok(self.countdown.run_sweep().await?)
    }

    pub async fn run_withdrawal_expiry_reconciliation(
        &self,
    ) -> ApiResult<SweepOutcome<ExpiryReconciliationReport>> {
        tracing::info!("手动触发休药期到期对账");
        Ok(self.expiry.run_reconciliation().await?)
    }
}
