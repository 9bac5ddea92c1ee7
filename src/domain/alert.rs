// ==========================================
// 畜产品合规引擎 - 监管预警领域模型
// ==========================================
// 红线: 预警只增不删, 只能通过 AlertLifecycleManager 修改
// 并发: revision 字段做乐观锁
// ==========================================

use crate::domain::types::{AlertStatus, AlertType, RiskLevel, Severity};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

// ==========================================
// RegulatorAlert - 监管预警
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegulatorAlert {
    // ===== 主键 =====
    pub alert_id: String,
    pub alert_type: AlertType,
    pub severity: Severity,
    pub risk_level: RiskLevel,
    pub farmer_id: String,

    // ===== 关联对象 =====
    pub animal_id: Option<String>,
    pub lab_test_id: Option<String>, // MRL_VIOLATION 闭环时回写 violation_resolved

    // ===== 内容 =====
    pub message: String,
    pub violation_details: JsonValue,

    // ===== 生命周期 =====
    pub status: AlertStatus,
    pub status_notes: Option<String>,
    pub acknowledged_by: Option<String>,
    pub acknowledged_at: Option<DateTime<Utc>>,
    pub resolved_by: Option<String>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub resolution_notes: Option<String>,
    pub escalated_at: Option<DateTime<Utc>>,

    // ===== 审计 =====
    pub email_sent: bool, // 通知是否投递成功 (失败不影响状态)
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub updated_by: Option<String>,
    pub revision: i32,
}

// ==========================================
// NewAlert - 创建预警入参
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewAlert {
    pub alert_type: AlertType,
    pub severity: Severity,
    pub risk_level: RiskLevel,
    pub farmer_id: String,
    pub animal_id: Option<String>,
    pub lab_test_id: Option<String>,
    pub message: String,
    pub violation_details: JsonValue,
}

impl NewAlert {
    pub fn new(
        alert_type: AlertType,
        severity: Severity,
        farmer_id: &str,
        violation_details: JsonValue,
        message: impl Into<String>,
        risk_level: RiskLevel,
    ) -> Self {
        Self {
            alert_type,
            severity,
            risk_level,
            farmer_id: farmer_id.to_string(),
            animal_id: None,
            lab_test_id: None,
            message: message.into(),
            violation_details,
        }
    }

    pub fn with_animal(mut self, animal_id: &str) -> Self {
        self.animal_id = Some(animal_id.to_string());
        self
    }

    pub fn with_lab_test(mut self, lab_test_id: &str) -> Self {
        self.lab_test_id = Some(lab_test_id.to_string());
        self
    }
}

// ==========================================
// AlertFilter - 列表过滤 + 分页
// ==========================================
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AlertFilter {
    pub farmer_id: Option<String>,
    pub status: Option<AlertStatus>,
    pub severity: Option<Severity>,
    pub alert_type: Option<AlertType>,
    pub risk_level: Option<RiskLevel>,
    pub page: u32,      // 从 1 开始
    pub page_size: u32, // 0 表示使用默认值
}

/// 分页结果
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u32,
    pub page_size: u32,
}

impl<T> Page<T> {
    pub fn total_pages(&self) -> u64 {
        if self.page_size == 0 {
            return 0;
        }
        self.total.div_ceil(self.page_size as u64)
    }
}
