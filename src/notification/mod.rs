// ==========================================
// 畜产品合规引擎 - 通知派发协作方
// ==========================================
// 职责: 定义通知派发 trait，核心引擎只依赖此接口
// 说明: 投递重试由实现方负责，任何结果都不影响核心状态
// ==========================================

pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

pub use memory::{InMemoryDispatcher, SentNotification};

// ==========================================
// 通知负载
// ==========================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationPayload {
    /// 监管预警
    RegulatorAlert {
        alert_id: String,
        alert_type: String,
        severity: String,
        risk_level: String,
        farmer_id: String,
        message: String,
        details: JsonValue,
    },
    /// 休药倒计时
    WithdrawalCountdown {
        farmer_id: String,
        animal_id: String,
        treatment_id: String,
        drug_name: String,
        days_remaining: i64,
        withdrawal_end_date: DateTime<Utc>,
    },
    /// 休药期到期, 需送检 (按养殖户批量)
    WithdrawalExpired {
        farmer_id: String,
        tag_ids: Vec<String>,
        expired_at: DateTime<Utc>,
    },
}

impl NotificationPayload {
    pub fn kind(&self) -> &'static str {
        match self {
            NotificationPayload::RegulatorAlert { .. } => "REGULATOR_ALERT",
            NotificationPayload::WithdrawalCountdown { .. } => "WITHDRAWAL_COUNTDOWN",
            NotificationPayload::WithdrawalExpired { .. } => "WITHDRAWAL_EXPIRED",
        }
    }
}

/// 派发结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchOutcome {
    pub success: bool,
    pub reason: Option<String>,
}

impl DispatchOutcome {
    pub fn delivered() -> Self {
        Self {
            success: true,
            reason: None,
        }
    }

    pub fn failed(reason: impl Into<String>) -> Self {
        Self {
            success: false,
            reason: Some(reason.into()),
        }
    }
}

// ==========================================
// 派发 Trait
// ==========================================

/// 通知派发者
///
/// 不返回 Err: 不可达等依赖错误以 `success=false` 表达
#[async_trait]
pub trait NotificationDispatcher: Send + Sync {
    async fn send(&self, recipient_id: &str, payload: &NotificationPayload) -> DispatchOutcome;
}

/// 空操作派发者
#[derive(Debug, Clone, Default)]
pub struct NoOpDispatcher;

#[async_trait]
impl NotificationDispatcher for NoOpDispatcher {
    async fn send(&self, recipient_id: &str, payload: &NotificationPayload) -> DispatchOutcome {
        tracing::debug!(
            "NoOpDispatcher: 跳过通知 - recipient={}, kind={}",
            recipient_id,
            payload.kind()
        );
        DispatchOutcome::delivered()
    }
}

/// 仅写日志的派发者 (未接入外部通道时使用)
#[derive(Debug, Clone, Default)]
pub struct LoggingDispatcher;

#[async_trait]
impl NotificationDispatcher for LoggingDispatcher {
    async fn send(&self, recipient_id: &str, payload: &NotificationPayload) -> DispatchOutcome {
        match serde_json::to_string(payload) {
            Ok(body) => {
                tracing::info!(recipient = recipient_id, kind = payload.kind(), "通知: {}", body);
                DispatchOutcome::delivered()
            }
            Err(e) => DispatchOutcome::failed(format!("序列化失败: {}", e)),
        }
    }
}
