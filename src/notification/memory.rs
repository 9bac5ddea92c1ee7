// ==========================================
// 内存派发者
// ==========================================
// 用途: 演练模式 (dry-run) 收集待发通知; 测试替身
// ==========================================

use super::{DispatchOutcome, NotificationDispatcher, NotificationPayload};
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Mutex;

#[derive(Debug, Clone, PartialEq)]
pub struct SentNotification {
    pub recipient_id: String,
    pub payload: NotificationPayload,
    pub delivered: bool,
}

#[derive(Debug, Default)]
pub struct InMemoryDispatcher {
    sent: Mutex<Vec<SentNotification>>,
    failing_recipients: HashSet<String>,
}

impl InMemoryDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// 对指定收件人模拟投递失败
    pub fn failing_for<I, S>(recipients: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            sent: Mutex::new(Vec::new()),
            failing_recipients: recipients.into_iter().map(Into::into).collect(),
        }
    }

    /// 已记录的通知 (含失败)
    pub fn sent(&self) -> Vec<SentNotification> {
        match self.sent.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn delivered_to(&self, recipient_id: &str) -> Vec<NotificationPayload> {
        self.sent()
            .into_iter()
            .filter(|n| n.delivered && n.recipient_id == recipient_id)
            .map(|n| n.payload)
            .collect()
    }
}

#[async_trait]
impl NotificationDispatcher for InMemoryDispatcher {
    async fn send(&self, recipient_id: &str, payload: &NotificationPayload) -> DispatchOutcome {
        let delivered = !self.failing_recipients.contains(recipient_id);
        let record = SentNotification {
            recipient_id: recipient_id.to_string(),
            payload: payload.clone(),
            delivered,
        };
        match self.sent.lock() {
            Ok(mut guard) => guard.push(record),
            Err(poisoned) => poisoned.into_inner().push(record),
        }

        if delivered {
            DispatchOutcome::delivered()
        } else {
            DispatchOutcome::failed(format!("收件人不可达: {}", recipient_id))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[tokio::test]
    async fn test_failing_recipient_is_recorded_but_not_delivered() {
        let dispatcher = InMemoryDispatcher::failing_for(["F2"]);
        let payload = NotificationPayload::WithdrawalExpired {
            farmer_id: "F2".to_string(),
            tag_ids: vec!["TAG-1".to_string()],
            expired_at: Utc::now(),
        };

        let outcome = dispatcher.send("F2", &payload).await;
        assert!(!outcome.success);
        assert!(outcome.reason.is_some());

        assert!(dispatcher.send("F1", &payload).await.success);
        assert_eq!(dispatcher.sent().len(), 2);
        assert_eq!(dispatcher.delivered_to("F1").len(), 1);
        assert!(dispatcher.delivered_to("F2").is_empty());
    }
}
