// ==========================================
// 畜产品合规引擎 - 监管预警生命周期
// ==========================================
// 职责: 预警创建 + 状态迁移 (确认/处理/升级/闭环)
// 红线: 预警的所有修改必须经过本服务
// 并发: 每次修改都带 revision 乐观锁, 冲突返回 ConcurrencyConflict
// ==========================================

use crate::domain::alert::{NewAlert, RegulatorAlert};
use crate::domain::types::{AlertStatus, AlertType, RiskLevel, Severity};
use crate::notification::{NotificationDispatcher, NotificationPayload};
use crate::repository::alert_repo::RegulatorAlertRepository;
use crate::repository::error::RepositoryError;
use crate::repository::lab_test_repo::LabTestRepository;
use crate::services::error::{require_id, ServiceError, ServiceResult};
use crate::services::pattern_detector::{PatternCheckRequest, PatternTrigger};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use uuid::Uuid;

// ==========================================
// AlertLifecycleManager
// ==========================================
#[derive(Clone)]
pub struct AlertLifecycleManager {
    alert_repo: Arc<RegulatorAlertRepository>,
    lab_test_repo: Arc<LabTestRepository>,
    dispatcher: Arc<dyn NotificationDispatcher>,
    regulator_recipient: String,
    pattern_trigger: Option<PatternTrigger>,
}

impl AlertLifecycleManager {
    pub fn new(
        alert_repo: Arc<RegulatorAlertRepository>,
        lab_test_repo: Arc<LabTestRepository>,
        dispatcher: Arc<dyn NotificationDispatcher>,
        regulator_recipient: impl Into<String>,
    ) -> Self {
        Self {
            alert_repo,
            lab_test_repo,
            dispatcher,
            regulator_recipient: regulator_recipient.into(),
            pattern_trigger: None,
        }
    }

    /// 挂接模式检测队列 (MRL_VIOLATION / BLOCKED_SALE_ATTEMPT 创建后投递)
    pub fn with_pattern_trigger(mut self, trigger: PatternTrigger) -> Self {
        self.pattern_trigger = Some(trigger);
        self
    }

    pub fn alert_repo(&self) -> &Arc<RegulatorAlertRepository> {
        &self.alert_repo
    }

    // ==========================================
    // 创建
    // ==========================================

    pub async fn create(&self, new_alert: NewAlert) -> ServiceResult<RegulatorAlert> {
        self.create_at(new_alert, Utc::now()).await
    }

    /// 以指定时刻创建预警 (状态 NEW, revision 1)
    ///
    /// 通知投递失败只记录 email_sent=false, 不影响创建结果
    pub async fn create_at(
        &self,
        new_alert: NewAlert,
        now: DateTime<Utc>,
    ) -> ServiceResult<RegulatorAlert> {
        require_id("farmer_id", &new_alert.farmer_id)?;
        if new_alert.message.trim().is_empty() {
            return Err(ServiceError::Validation("message 不能为空".to_string()));
        }

        let mut alert = RegulatorAlert {
            alert_id: Uuid::new_v4().to_string(),
            alert_type: new_alert.alert_type,
            severity: new_alert.severity,
            risk_level: new_alert.risk_level,
            farmer_id: new_alert.farmer_id,
            animal_id: new_alert.animal_id,
            lab_test_id: new_alert.lab_test_id,
            message: new_alert.message,
            violation_details: new_alert.violation_details,
            status: AlertStatus::New,
            status_notes: None,
            acknowledged_by: None,
            acknowledged_at: None,
            resolved_by: None,
            resolved_at: None,
            resolution_notes: None,
            escalated_at: None,
            email_sent: false,
            created_at: now,
            updated_at: now,
            updated_by: None,
            revision: 1,
        };

        self.alert_repo.insert(&alert)?;
        tracing::info!(
            alert_id = %alert.alert_id,
            alert_type = %alert.alert_type,
            severity = %alert.severity,
            farmer_id = %alert.farmer_id,
            "监管预警已创建"
        );

        alert.email_sent = self.notify_regulator(&alert).await;
        if alert.email_sent {
            if let Err(e) = self.alert_repo.set_email_sent(&alert.alert_id, true) {
                tracing::warn!(alert_id = %alert.alert_id, "email_sent 回写失败: {}", e);
            }
        }

        if alert.alert_type.triggers_pattern_check() {
            if let Some(trigger) = &self.pattern_trigger {
                trigger.request(PatternCheckRequest {
                    farmer_id: alert.farmer_id.clone(),
                    trigger_alert_id: alert.alert_id.clone(),
                    alert_type: alert.alert_type,
                });
            }
        }

        Ok(alert)
    }

    async fn notify_regulator(&self, alert: &RegulatorAlert) -> bool {
        let payload = NotificationPayload::RegulatorAlert {
            alert_id: alert.alert_id.clone(),
            alert_type: alert.alert_type.as_str().to_string(),
            severity: alert.severity.as_str().to_string(),
            risk_level: alert.risk_level.as_str().to_string(),
            farmer_id: alert.farmer_id.clone(),
            message: alert.message.clone(),
            details: alert.violation_details.clone(),
        };

        let outcome = self.dispatcher.send(&self.regulator_recipient, &payload).await;
        if !outcome.success {
            tracing::warn!(
                alert_id = %alert.alert_id,
                recipient = %self.regulator_recipient,
                "监管通知投递失败: {}",
                outcome.reason.as_deref().unwrap_or("unknown")
            );
        }
        outcome.success
    }

    // ==========================================
    // 状态迁移
    // ==========================================

    /// 确认预警 (NEW -> ACKNOWLEDGED)
    pub fn acknowledge(
        &self,
        alert_id: &str,
        actor_id: &str,
        expected_revision: Option<i32>,
    ) -> ServiceResult<RegulatorAlert> {
        require_id("actor_id", actor_id)?;
        let mut alert = self.load(alert_id, expected_revision)?;
        let now = Utc::now();

        ensure_transition(&alert, AlertStatus::Acknowledged)?;
        alert.status = AlertStatus::Acknowledged;
        alert.acknowledged_by = Some(actor_id.to_string());
        alert.acknowledged_at = Some(now);

        self.persist(alert, actor_id, now)
    }

    /// 更新状态
    ///
    /// - RESOLVED: 记录处理人/时间/备注; MRL_VIOLATION 同时回写检测单 violation_resolved
    /// - ESCALATED: 与 escalate 相同的风险/严重程度调整
    pub fn update_status(
        &self,
        alert_id: &str,
        new_status: AlertStatus,
        notes: Option<&str>,
        actor_id: &str,
        expected_revision: Option<i32>,
    ) -> ServiceResult<RegulatorAlert> {
        require_id("actor_id", actor_id)?;
        let mut alert = self.load(alert_id, expected_revision)?;
        let now = Utc::now();

        if alert.status == new_status {
            return Err(ServiceError::IllegalTransition {
                from: alert.status,
                to: new_status,
            });
        }
        ensure_transition(&alert, new_status)?;

        alert.status = new_status;
        alert.status_notes = notes.map(str::to_string);
        match new_status {
            AlertStatus::Acknowledged => {
                alert.acknowledged_by = Some(actor_id.to_string());
                alert.acknowledged_at = Some(now);
            }
            AlertStatus::Resolved => {
                alert.resolved_by = Some(actor_id.to_string());
                alert.resolved_at = Some(now);
                alert.resolution_notes = notes.map(str::to_string);
            }
            AlertStatus::Escalated => apply_escalation(&mut alert, now),
            AlertStatus::New | AlertStatus::Investigating => {}
        }

        let alert = self.persist(alert, actor_id, now)?;

        if alert.status == AlertStatus::Resolved && alert.alert_type == AlertType::MrlViolation {
            self.close_lab_test_violation(&alert)?;
        }
        Ok(alert)
    }

    /// 升级预警
    ///
    /// risk_level 固定为 IMMEDIATE_ACTION; severity 不低于 HIGH
    pub fn escalate(
        &self,
        alert_id: &str,
        actor_id: &str,
        expected_revision: Option<i32>,
    ) -> ServiceResult<RegulatorAlert> {
        require_id("actor_id", actor_id)?;
        let mut alert = self.load(alert_id, expected_revision)?;
        let now = Utc::now();

        ensure_transition(&alert, AlertStatus::Escalated)?;
        apply_escalation(&mut alert, now);

        self.persist(alert, actor_id, now)
    }

    // ==========================================
    // 内部
    // ==========================================

    fn load(&self, alert_id: &str, expected_revision: Option<i32>) -> ServiceResult<RegulatorAlert> {
        require_id("alert_id", alert_id)?;
        let alert = self
            .alert_repo
            .find_by_id(alert_id)?
            .ok_or_else(|| ServiceError::not_found("RegulatorAlert", alert_id))?;

        if let Some(expected) = expected_revision {
            if expected != alert.revision {
                return Err(RepositoryError::OptimisticLockFailure {
                    entity: "RegulatorAlert".to_string(),
                    id: alert_id.to_string(),
                    expected,
                    actual: alert.revision,
                }
                .into());
            }
        }
        Ok(alert)
    }

    fn persist(
        &self,
        mut alert: RegulatorAlert,
        actor_id: &str,
        now: DateTime<Utc>,
    ) -> ServiceResult<RegulatorAlert> {
        alert.updated_at = now;
        alert.updated_by = Some(actor_id.to_string());
        alert.revision = self.alert_repo.update_lifecycle(&alert)?;

        tracing::info!(
            alert_id = %alert.alert_id,
            status = %alert.status,
            severity = %alert.severity,
            actor = actor_id,
            revision = alert.revision,
            "预警状态已更新"
        );
        Ok(alert)
    }

    fn close_lab_test_violation(&self, alert: &RegulatorAlert) -> ServiceResult<()> {
        match &alert.lab_test_id {
            Some(lab_test_id) => {
                self.lab_test_repo.mark_violation_resolved(lab_test_id)?;
                tracing::info!(
                    alert_id = %alert.alert_id,
                    lab_test_id = %lab_test_id,
                    "超标检测已闭环, 允许复检"
                );
                Ok(())
            }
            None => {
                tracing::warn!(alert_id = %alert.alert_id, "MRL_VIOLATION 预警未关联检测单");
                Ok(())
            }
        }
    }
}

fn ensure_transition(alert: &RegulatorAlert, next: AlertStatus) -> ServiceResult<()> {
    if alert.status.is_terminal() {
        tracing::warn!(alert_id = %alert.alert_id, to = %next, "预警已结案, 拒绝状态变更");
    } else if alert.status.can_transition_to(next) {
        return Ok(());
    }
    Err(ServiceError::IllegalTransition {
        from: alert.status,
        to: next,
    })
}

fn apply_escalation(alert: &mut RegulatorAlert, now: DateTime<Utc>) {
    alert.status = AlertStatus::Escalated;
    alert.risk_level = RiskLevel::ImmediateAction;
    alert.severity = alert.severity.max(Severity::High);
    if alert.escalated_at.is_none() {
        alert.escalated_at = Some(now);
    }
}
