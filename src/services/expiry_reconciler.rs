// ==========================================
// 畜产品合规引擎 - 休药期到期对账
// ==========================================
// 触发: 每日零点 / 运维手动
// 动作: withdrawal_active -> false, requires_mrl_test -> true
// 通知: 按养殖户合并, 每户一条
// 容错: 单只牲畜/单个养殖户失败不影响其余
// ==========================================

use crate::notification::{NotificationDispatcher, NotificationPayload};
use crate::repository::animal_repo::AnimalRepository;
use crate::services::error::ServiceResult;
use crate::services::run_guard::{RunGuard, SweepOutcome};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExpiryReconciliationReport {
    pub run_at: Option<DateTime<Utc>>,
    pub candidates: usize,
    pub animals_updated: usize,
    pub animals_failed: usize,
    pub farmers_notified: usize,
    pub notifications_failed: usize,
    /// farmer_id -> 已转为待检的耳标号
    pub affected: BTreeMap<String, Vec<String>>,
}

pub struct WithdrawalExpiryReconciler {
    animal_repo: Arc<AnimalRepository>,
    dispatcher: Arc<dyn NotificationDispatcher>,
    running: AtomicBool,
}

impl WithdrawalExpiryReconciler {
    pub fn new(animal_repo: Arc<AnimalRepository>, dispatcher: Arc<dyn NotificationDispatcher>) -> Self {
        Self {
            animal_repo,
            dispatcher,
            running: AtomicBool::new(false),
        }
    }

    pub async fn run_reconciliation(&self) -> ServiceResult<SweepOutcome<ExpiryReconciliationReport>> {
        self.run_reconciliation_at(Utc::now()).await
    }

    pub async fn run_reconciliation_at(
        &self,
        now: DateTime<Utc>,
    ) -> ServiceResult<SweepOutcome<ExpiryReconciliationReport>> {
        let _guard = match RunGuard::acquire(&self.running) {
            Some(guard) => guard,
            None => {
                tracing::warn!("休药期到期对账仍在执行, 本次跳过");
                return Ok(SweepOutcome::Skipped);
            }
        };

        let candidate_ids = self.animal_repo.find_expired_withdrawal_ids(now)?;
        let mut report = ExpiryReconciliationReport {
            run_at: Some(now),
            candidates: candidate_ids.len(),
            ..ExpiryReconciliationReport::default()
        };

        for animal_id in &candidate_ids {
            let animal = match self.animal_repo.find_by_id(animal_id) {
                Ok(Some(animal)) => animal,
                Ok(None) => continue,
                Err(e) => {
                    report.animals_failed += 1;
                    tracing::warn!(animal_id = %animal_id, "牲畜记录加载失败, 跳过: {}", e);
                    continue;
                }
            };
            // 查询之后已被用药审批延长
            if !animal.withdrawal_expired_at(now) {
                continue;
            }

            match self.animal_repo.mark_withdrawal_expired(&animal.animal_id, now) {
                Ok(true) => {
                    report.animals_updated += 1;
                    report
                        .affected
                        .entry(animal.farmer_id.clone())
                        .or_default()
                        .push(animal.tag_id.clone());
                }
                // 并发写入已翻转
                Ok(false) => {}
                Err(e) => {
                    report.animals_failed += 1;
                    tracing::warn!(animal_id = %animal.animal_id, "休药期到期更新失败: {}", e);
                }
            }
        }

        for (farmer_id, tag_ids) in &report.affected {
            let payload = NotificationPayload::WithdrawalExpired {
                farmer_id: farmer_id.clone(),
                tag_ids: tag_ids.clone(),
                expired_at: now,
            };
            let outcome = self.dispatcher.send(farmer_id, &payload).await;
            if outcome.success {
                report.farmers_notified += 1;
            } else {
                report.notifications_failed += 1;
                tracing::warn!(
                    farmer_id = %farmer_id,
                    animals = tag_ids.len(),
                    "到期通知投递失败: {}",
                    outcome.reason.as_deref().unwrap_or("unknown")
                );
            }
        }

        tracing::info!(
            candidates = report.candidates,
            updated = report.animals_updated,
            failed = report.animals_failed,
            farmers_notified = report.farmers_notified,
            notifications_failed = report.notifications_failed,
            "休药期到期对账完成"
        );
        Ok(SweepOutcome::Completed(report))
    }
}
