// ==========================================
// 畜产品合规引擎 - 合规策略参数
// ==========================================
// 分级阈值、模式检测计数、调度时间均为注入配置
// ==========================================

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};

/// 超标分级阈值 (百分比, 严格大于)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifierPolicy {
    pub critical_pct: f64, // > critical_pct -> CRITICAL / IMMEDIATE_ACTION
    pub high_pct: f64,     // > high_pct -> HIGH / HIGH_PRIORITY
}

impl Default for ClassifierPolicy {
    fn default() -> Self {
        Self {
            critical_pct: 100.0,
            high_pct: 50.0,
        }
    }
}

/// 重复违规模式检测参数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternPolicy {
    pub window_days: i64,
    pub repeat_threshold: u64,          // MRL_VIOLATION 数 >= 此值 -> REPEATED_VIOLATION (HIGH)
    pub repeat_critical_threshold: u64, // >= 此值 -> CRITICAL
    pub blocked_sale_threshold: u64,    // BLOCKED_SALE_ATTEMPT 数 >= 此值 -> COMPLIANCE_PATTERN
    pub cooldown_days: i64,             // 同类模式预警抑制期 (0 = 不抑制)
}

impl Default for PatternPolicy {
    fn default() -> Self {
        Self {
            window_days: 90,
            repeat_threshold: 3,
            repeat_critical_threshold: 5,
            blocked_sale_threshold: 5,
            cooldown_days: 7,
        }
    }
}

/// 休药倒计时通知参数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CountdownPolicy {
    pub thresholds: Vec<i64>, // 剩余天数阈值
    pub send_delay_ms: u64,   // 相邻两次发送的间隔
}

impl Default for CountdownPolicy {
    fn default() -> Self {
        Self {
            thresholds: vec![7, 3, 1, 0],
            send_delay_ms: 200,
        }
    }
}

/// 每日调度触发时间 (UTC)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchedulePolicy {
    pub countdown_time: NaiveTime,
    pub expiry_time: NaiveTime,
}

impl Default for SchedulePolicy {
    fn default() -> Self {
        Self {
            countdown_time: NaiveTime::from_hms_opt(8, 0, 0).unwrap_or_default(),
            expiry_time: NaiveTime::default(),
        }
    }
}

// ==========================================
// CompliancePolicy - 全量策略
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompliancePolicy {
    pub lookback_days: i64,
    pub classifier: ClassifierPolicy,
    pub pattern: PatternPolicy,
    pub countdown: CountdownPolicy,
    pub schedule: SchedulePolicy,
    pub regulator_recipient: String,
}

impl Default for CompliancePolicy {
    fn default() -> Self {
        Self {
            lookback_days: 90,
            classifier: ClassifierPolicy::default(),
            pattern: PatternPolicy::default(),
            countdown: CountdownPolicy::default(),
            schedule: SchedulePolicy::default(),
            regulator_recipient: "regulator-desk".to_string(),
        }
    }
}
