// ==========================================
// 畜产品合规引擎 - 用药记录领域模型
// ==========================================
// 约束: withdrawal_end_date >= start_date
// ==========================================

use crate::domain::types::ApprovalStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ==========================================
// Treatment - 用药记录
// ==========================================
// 养殖户创建, 兽医审批; 调度任务只读
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Treatment {
    pub treatment_id: String,
    pub animal_id: String,
    pub farmer_id: String,
    pub drug_name: String,
    pub start_date: DateTime<Utc>,
    pub withdrawal_end_date: DateTime<Utc>,
    pub approval_status: ApprovalStatus,
    pub approved_by: Option<String>,          // 审批兽医
    pub mrl_compliant: Option<bool>,          // 关联检测是否合规 (None = 未检测)
    pub requires_mrl_test: bool,              // 休药期结束后是否强制检测
    pub linked_lab_test_ids: Vec<String>,     // 关联检测单
    pub created_at: DateTime<Utc>,
}

impl Treatment {
    /// 休药期窗口是否在 `at` 时刻仍有效
    pub fn withdrawal_active_at(&self, at: DateTime<Utc>) -> bool {
        self.withdrawal_end_date > at
    }

    pub fn is_approved(&self) -> bool {
        self.approval_status == ApprovalStatus::Approved
    }

    /// 休药期已结束、强制检测、且尚无关联检测
    pub fn needs_test_at(&self, at: DateTime<Utc>) -> bool {
        self.requires_mrl_test
            && !self.withdrawal_active_at(at)
            && self.linked_lab_test_ids.is_empty()
    }
}
