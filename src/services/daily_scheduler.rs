// ==========================================
// 畜产品合规引擎 - 每日定时触发
// ==========================================
// 两个任务独立计时: 倒计时通知 / 到期对账
// 停止: watch 通道置 true 或发送端释放
// ==========================================

use crate::config::policy::SchedulePolicy;
use crate::services::countdown_scheduler::WithdrawalCountdownScheduler;
use crate::services::expiry_reconciler::WithdrawalExpiryReconciler;
use crate::services::run_guard::SweepOutcome;
use chrono::{DateTime, Duration, NaiveTime, TimeZone, Utc};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::watch;

/// 严格晚于 `now` 的下一个触发时刻 (UTC)
pub fn next_trigger_after(now: DateTime<Utc>, at: NaiveTime) -> DateTime<Utc> {
    let today = Utc.from_utc_datetime(&now.date_naive().and_time(at));
    if today > now {
        today
    } else {
        today + Duration::days(1)
    }
}

pub struct DailyScheduler {
    countdown: Arc<WithdrawalCountdownScheduler>,
    expiry: Arc<WithdrawalExpiryReconciler>,
    schedule: SchedulePolicy,
}

impl DailyScheduler {
    pub fn new(
        countdown: Arc<WithdrawalCountdownScheduler>,
        expiry: Arc<WithdrawalExpiryReconciler>,
        schedule: SchedulePolicy,
    ) -> Self {
        Self {
            countdown,
            expiry,
            schedule,
        }
    }

    /// 运行直到收到停止信号
    pub async fn run(&self, shutdown: watch::Receiver<bool>) {
        tracing::info!(
            countdown_time = %self.schedule.countdown_time,
            expiry_time = %self.schedule.expiry_time,
            "每日调度已启动"
        );

        let countdown = self.countdown.clone();
        let expiry = self.expiry.clone();

        futures::future::join(
            run_daily("withdrawal_countdown", self.schedule.countdown_time, shutdown.clone(), move || {
                let countdown = countdown.clone();
                async move {
                    match countdown.run_sweep().await {
                        Ok(SweepOutcome::Completed(_)) | Ok(SweepOutcome::Skipped) => {}
                        Err(e) => tracing::error!("休药倒计时扫描失败: {}", e),
                    }
                }
            }),
            run_daily("withdrawal_expiry", self.schedule.expiry_time, shutdown, move || {
                let expiry = expiry.clone();
                async move {
                    match expiry.run_reconciliation().await {
                        Ok(SweepOutcome::Completed(_)) | Ok(SweepOutcome::Skipped) => {}
                        Err(e) => tracing::error!("休药期到期对账失败: {}", e),
                    }
                }
            }),
        )
        .await;

        tracing::info!("每日调度已停止");
    }
}

async fn run_daily<F, Fut>(job: &str, at: NaiveTime, mut shutdown: watch::Receiver<bool>, task: F)
where
    F: Fn() -> Fut,
    Fut: Future<Output = ()>,
{
    loop {
        if *shutdown.borrow() {
            break;
        }

        let next = next_trigger_after(Utc::now(), at);
        let delay = (next - Utc::now()).to_std().unwrap_or_default();
        tracing::debug!(job = job, next = %next, "等待下一次触发");

        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
                continue;
            }
        }

        tracing::info!(job = job, "定时任务触发");
        task().await;
    }
}
