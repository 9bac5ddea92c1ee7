// ==========================================
// 畜产品合规引擎 - 违规模式检测
// ==========================================
// 触发: MRL_VIOLATION / BLOCKED_SALE_ATTEMPT 预警创建后投递到队列
// 消费: 独立 worker 任务, 失败仅记录日志, 不回传给创建方
// ==========================================

use crate::config::policy::PatternPolicy;
use crate::domain::alert::{NewAlert, RegulatorAlert};
use crate::domain::types::AlertType;
use crate::engine::pattern::{PatternDecision, PatternEvaluator, PatternObservation, PriorPatternAlert};
use crate::services::alert_lifecycle::AlertLifecycleManager;
use crate::services::error::{require_id, ServiceResult};
use chrono::{DateTime, Utc};
use serde_json::json;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// 模式检测请求
#[derive(Debug, Clone, PartialEq)]
pub struct PatternCheckRequest {
    pub farmer_id: String,
    pub trigger_alert_id: String,
    pub alert_type: AlertType,
}

// ==========================================
// PatternTrigger - 队列发送端
// ==========================================
#[derive(Debug, Clone)]
pub struct PatternTrigger {
    tx: mpsc::UnboundedSender<PatternCheckRequest>,
}

impl PatternTrigger {
    /// 创建一个未绑定 worker 的队列 (由调用方自行消费)
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<PatternCheckRequest>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// 投递请求, 不阻塞; worker 已退出时仅告警
    pub fn request(&self, request: PatternCheckRequest) -> bool {
        let farmer_id = request.farmer_id.clone();
        match self.tx.send(request) {
            Ok(()) => true,
            Err(_) => {
                tracing::warn!(farmer_id = %farmer_id, "模式检测队列已关闭, 请求丢弃");
                false
            }
        }
    }
}

// ==========================================
// PatternDetector
// ==========================================
pub struct PatternDetector {
    alerts: AlertLifecycleManager,
    evaluator: PatternEvaluator,
}

impl PatternDetector {
    /// `alerts` 不应挂接 PatternTrigger (模式预警本身不再触发检测)
    pub fn new(alerts: AlertLifecycleManager, policy: PatternPolicy) -> Self {
        Self {
            alerts,
            evaluator: PatternEvaluator::new(policy),
        }
    }

    pub async fn check_farmer(&self, farmer_id: &str) -> ServiceResult<Vec<RegulatorAlert>> {
        self.check_farmer_at(farmer_id, Utc::now()).await
    }

    /// 统计窗口内计数并生成模式预警, 返回新建的预警
    pub async fn check_farmer_at(
        &self,
        farmer_id: &str,
        at: DateTime<Utc>,
    ) -> ServiceResult<Vec<RegulatorAlert>> {
        require_id("farmer_id", farmer_id)?;
        let repo = self.alerts.alert_repo();
        let since = self.evaluator.window_start(at);

        let observation = PatternObservation {
            farmer_id: farmer_id.to_string(),
            observed_at: at,
            mrl_violation_count: repo.count_by_type_since(farmer_id, AlertType::MrlViolation, since)?,
            blocked_sale_count: repo.count_by_type_since(
                farmer_id,
                AlertType::BlockedSaleAttempt,
                since,
            )?,
            last_repeated_violation: self.prior(farmer_id, AlertType::RepeatedViolation)?,
            last_compliance_pattern: self.prior(farmer_id, AlertType::CompliancePattern)?,
        };

        let mut created = Vec::new();
        for decision in self.evaluator.evaluate(&observation) {
            match decision {
                PatternDecision::Emit {
                    alert_type,
                    severity,
                    risk_level,
                    count,
                } => {
                    let new_alert = NewAlert::new(
                        alert_type,
                        severity,
                        farmer_id,
                        json!({
                            "farmer_id": farmer_id,
                            "count": count,
                            "window_days": self.evaluator.policy().window_days,
                            "window_start": since,
                        }),
                        pattern_message(alert_type, farmer_id, count, self.evaluator.policy().window_days),
                        risk_level,
                    );
                    created.push(self.alerts.create_at(new_alert, at).await?);
                }
                PatternDecision::Suppressed {
                    alert_type,
                    count,
                    last_emitted_at,
                    ..
                } => {
                    tracing::debug!(
                        farmer_id = farmer_id,
                        alert_type = %alert_type,
                        count,
                        last_emitted_at = %last_emitted_at,
                        "模式预警处于抑制期"
                    );
                }
            }
        }
        Ok(created)
    }

    fn prior(&self, farmer_id: &str, alert_type: AlertType) -> ServiceResult<Option<PriorPatternAlert>> {
        Ok(self
            .alerts
            .alert_repo()
            .find_latest_by_type(farmer_id, alert_type)?
            .map(|a| PriorPatternAlert {
                created_at: a.created_at,
                severity: a.severity,
            }))
    }
}

fn pattern_message(alert_type: AlertType, farmer_id: &str, count: u64, window_days: i64) -> String {
    match alert_type {
        AlertType::RepeatedViolation => format!(
            "养殖户 {} 在 {} 天内累计 {} 次 MRL 超标",
            farmer_id, window_days, count
        ),
        _ => format!(
            "养殖户 {} 在 {} 天内累计 {} 次违规销售尝试",
            farmer_id, window_days, count
        ),
    }
}

// ==========================================
// PatternWorker - 队列消费
// ==========================================
pub struct PatternWorker;

impl PatternWorker {
    /// 启动消费任务; 所有 PatternTrigger 释放后任务结束
    pub fn spawn(detector: PatternDetector) -> (PatternTrigger, JoinHandle<()>) {
        let (trigger, rx) = PatternTrigger::channel();
        let handle = tokio::spawn(Self::run(detector, rx));
        (trigger, handle)
    }

    async fn run(detector: PatternDetector, mut rx: mpsc::UnboundedReceiver<PatternCheckRequest>) {
        while let Some(request) = rx.recv().await {
            match detector.check_farmer(&request.farmer_id).await {
                Ok(created) if !created.is_empty() => {
                    tracing::info!(
                        farmer_id = %request.farmer_id,
                        trigger_alert_id = %request.trigger_alert_id,
                        created = created.len(),
                        "已生成模式预警"
                    );
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::error!(
                        farmer_id = %request.farmer_id,
                        trigger_alert_id = %request.trigger_alert_id,
                        "模式检测失败: {}",
                        e
                    );
                }
            }
        }
        tracing::debug!("模式检测 worker 已退出");
    }
}
