// ==========================================
// 畜产品合规引擎 - 休药倒计时通知
// ==========================================
// 触发: 每日定时 / 运维手动
// 去重: (treatment_id, threshold_day) 先占位再发送, 同一阈值至多发送一次
// 限流: 相邻两次发送之间固定间隔, 只阻塞本任务
// ==========================================

use crate::config::policy::CountdownPolicy;
use crate::domain::treatment::Treatment;
use crate::notification::{NotificationDispatcher, NotificationPayload};
use crate::repository::countdown_repo::CountdownNotificationRepository;
use crate::repository::treatment_repo::TreatmentRepository;
use crate::services::error::ServiceResult;
use crate::services::run_guard::{RunGuard, SweepOutcome};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration as StdDuration;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CountdownSweepReport {
    pub run_at: Option<DateTime<Utc>>,
    pub treatments_scanned: usize,
    pub due: usize,             // 命中阈值
    pub sent: usize,            // 投递成功
    pub failed: usize,          // 投递失败 (已占位, 不重发)
    pub already_notified: usize,
    pub errors: usize,          // 单条记录处理异常
}

pub struct WithdrawalCountdownScheduler {
    treatment_repo: Arc<TreatmentRepository>,
    countdown_repo: Arc<CountdownNotificationRepository>,
    dispatcher: Arc<dyn NotificationDispatcher>,
    policy: CountdownPolicy,
    running: AtomicBool,
}

impl WithdrawalCountdownScheduler {
    pub fn new(
        treatment_repo: Arc<TreatmentRepository>,
        countdown_repo: Arc<CountdownNotificationRepository>,
        dispatcher: Arc<dyn NotificationDispatcher>,
        policy: CountdownPolicy,
    ) -> Self {
        Self {
            treatment_repo,
            countdown_repo,
            dispatcher,
            policy,
            running: AtomicBool::new(false),
        }
    }

    pub async fn run_sweep(&self) -> ServiceResult<SweepOutcome<CountdownSweepReport>> {
        self.run_sweep_at(Utc::now()).await
    }

    /// 扫描休药期未结束的已批准用药, 对命中阈值的发送倒计时通知
    pub async fn run_sweep_at(
        &self,
        now: DateTime<Utc>,
    ) -> ServiceResult<SweepOutcome<CountdownSweepReport>> {
        let _guard = match RunGuard::acquire(&self.running) {
            Some(guard) => guard,
            None => {
                tracing::warn!("休药倒计时扫描仍在执行, 本次跳过");
                return Ok(SweepOutcome::Skipped);
            }
        };

        let treatment_ids = self.treatment_repo.find_approved_ids_with_withdrawal_from(now)?;
        let mut report = CountdownSweepReport {
            run_at: Some(now),
            treatments_scanned: treatment_ids.len(),
            ..CountdownSweepReport::default()
        };

        let delay = StdDuration::from_millis(self.policy.send_delay_ms);
        let mut dispatched_any = false;

        for treatment_id in &treatment_ids {
            let treatment = match self.treatment_repo.find_by_id(treatment_id) {
                Ok(Some(t)) => t,
                // 扫描期间被删除
                Ok(None) => continue,
                Err(e) => {
                    tracing::warn!(treatment_id = %treatment_id, "用药记录加载失败, 跳过: {}", e);
                    report.errors += 1;
                    continue;
                }
            };

            let days_remaining = days_remaining(&treatment, now);
            if !self.policy.thresholds.contains(&days_remaining) {
                continue;
            }
            report.due += 1;

            match self.countdown_repo.try_claim(
                &treatment.treatment_id,
                days_remaining,
                &treatment.farmer_id,
                &treatment.animal_id,
                now,
            ) {
                Ok(true) => {}
                Ok(false) => {
                    report.already_notified += 1;
                    continue;
                }
                Err(e) => {
                    tracing::warn!(
                        treatment_id = %treatment.treatment_id,
                        "倒计时占位失败, 跳过: {}",
                        e
                    );
                    report.errors += 1;
                    continue;
                }
            }

            if dispatched_any && !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            dispatched_any = true;

            let payload = NotificationPayload::WithdrawalCountdown {
                farmer_id: treatment.farmer_id.clone(),
                animal_id: treatment.animal_id.clone(),
                treatment_id: treatment.treatment_id.clone(),
                drug_name: treatment.drug_name.clone(),
                days_remaining,
                withdrawal_end_date: treatment.withdrawal_end_date,
            };
            let outcome = self.dispatcher.send(&treatment.farmer_id, &payload).await;

            if outcome.success {
                report.sent += 1;
            } else {
                report.failed += 1;
                tracing::warn!(
                    treatment_id = %treatment.treatment_id,
                    farmer_id = %treatment.farmer_id,
                    days_remaining,
                    "倒计时通知投递失败: {}",
                    outcome.reason.as_deref().unwrap_or("unknown")
                );
            }

            if let Err(e) = self.countdown_repo.record_outcome(
                &treatment.treatment_id,
                days_remaining,
                outcome.success,
                outcome.reason.as_deref(),
            ) {
                tracing::warn!(treatment_id = %treatment.treatment_id, "投递结果回写失败: {}", e);
            }
        }

        tracing::info!(
            scanned = report.treatments_scanned,
            due = report.due,
            sent = report.sent,
            failed = report.failed,
            already_notified = report.already_notified,
            errors = report.errors,
            "休药倒计时扫描完成"
        );
        Ok(SweepOutcome::Completed(report))
    }
}

/// 剩余整天数 (向下取整)
fn days_remaining(treatment: &Treatment, now: DateTime<Utc>) -> i64 {
    (treatment.withdrawal_end_date - now).num_days()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::ApprovalStatus;
    use chrono::Duration;

    fn treatment(end: DateTime<Utc>) -> Treatment {
        Treatment {
            treatment_id: "T1".to_string(),
            animal_id: "A1".to_string(),
            farmer_id: "F1".to_string(),
            drug_name: "penicillin".to_string(),
            start_date: end - Duration::days(14),
            withdrawal_end_date: end,
            approval_status: ApprovalStatus::Approved,
            approved_by: Some("vet-1".to_string()),
            mrl_compliant: None,
            requires_mrl_test: true,
            linked_lab_test_ids: Vec::new(),
            created_at: end - Duration::days(14),
        }
    }

    #[test]
    fn test_days_remaining_floors_partial_days() {
        let now = Utc::now();
        assert_eq!(days_remaining(&treatment(now + Duration::days(3)), now), 3);
        assert_eq!(
            days_remaining(&treatment(now + Duration::days(3) - Duration::minutes(1)), now),
            2
        );
        assert_eq!(days_remaining(&treatment(now + Duration::hours(5)), now), 0);
    }
}
