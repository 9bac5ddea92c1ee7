// ==========================================
// 畜产品合规引擎 - 牲畜领域模型
// ==========================================
// 红线: requires_mrl_test 只能在 withdrawal_active 置 false 之后变为 true
// ==========================================

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ==========================================
// Animal - 牲畜
// ==========================================
// 写入方:
// - 用药审批 (设置休药期窗口)
// - 休药期到期对账 (两个标志位同时翻转)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Animal {
    pub animal_id: String,                          // 主键
    pub tag_id: String,                             // 耳标号
    pub farmer_id: String,                          // 所属养殖户
    pub species: String,                            // 物种
    pub withdrawal_active: bool,                    // 是否处于休药期
    pub withdrawal_end_date: Option<DateTime<Utc>>, // 休药期结束时间
    pub requires_mrl_test: bool,                    // 是否需要残留检测
    pub updated_at: DateTime<Utc>,
}

impl Animal {
    pub fn new(animal_id: &str, tag_id: &str, farmer_id: &str, species: &str) -> Self {
        Self {
            animal_id: animal_id.to_string(),
            tag_id: tag_id.to_string(),
            farmer_id: farmer_id.to_string(),
            species: species.to_string(),
            withdrawal_active: false,
            withdrawal_end_date: None,
            requires_mrl_test: false,
            updated_at: Utc::now(),
        }
    }

    /// 休药期是否已到期 (仍标记为休药中)
    pub fn withdrawal_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.withdrawal_active
            && self
                .withdrawal_end_date
                .map(|end| end <= now)
                .unwrap_or(false)
    }
}
