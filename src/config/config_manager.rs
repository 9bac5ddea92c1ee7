// ==========================================
// 畜产品合规引擎 - 配置管理器
// ==========================================
// 职责: 配置加载、查询、覆写管理
// 存储: config_kv 表 (key-value + scope)
// ==========================================

use crate::config::policy::CompliancePolicy;
use crate::db::open_sqlite_connection;
use chrono::NaiveTime;
use rusqlite::{params, Connection};
use std::error::Error;
use std::str::FromStr;
use std::sync::{Arc, Mutex};

// ==========================================
// ConfigManager - 配置管理器
// ==========================================
pub struct ConfigManager {
    conn: Arc<Mutex<Connection>>,
}

impl ConfigManager {
    /// 创建新的 ConfigManager 实例
    ///
    /// # 参数
    /// - db_path: 数据库文件路径
    pub fn new(db_path: &str) -> Result<Self, Box<dyn Error>> {
        let conn = open_sqlite_connection(db_path)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 从已有连接创建 ConfigManager
    ///
    /// 说明：为保证连接行为一致，会对传入连接再次应用统一 PRAGMA（幂等）。
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Result<Self, Box<dyn Error>> {
        {
            let conn_guard = conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;
            crate::db::configure_sqlite_connection(&conn_guard)?;
        }

        Ok(Self { conn })
    }

    /// 从 config_kv 表读取配置值（scope_id='global'）
    fn get_config_value(&self, key: &str) -> Result<Option<String>, Box<dyn Error>> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;

        let result = conn.query_row(
            "SELECT value FROM config_kv WHERE scope_id = 'global' AND key = ?1",
            params![key],
            |row| row.get::<_, String>(0),
        );

        match result {
            Ok(value) => Ok(Some(value)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(Box::new(e)),
        }
    }

    /// 读取 global scope 的配置值
    pub fn get_global_config_value(&self, key: &str) -> Result<Option<String>, Box<dyn Error>> {
        self.get_config_value(key)
    }

    /// 写入 global scope 的配置值（UPSERT）
    pub fn set_global_config_value(&self, key: &str, value: &str) -> Result<(), Box<dyn Error>> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;
        conn.execute(
            "INSERT INTO config_kv (scope_id, key, value) VALUES ('global', ?1, ?2)
             ON CONFLICT(scope_id, key) DO UPDATE SET value = ?2",
            params![key, value],
        )?;
        Ok(())
    }

    /// 读取并解析配置，缺失或格式错误时回退默认值
    fn get_parsed_or<T: FromStr>(&self, key: &str, default: T) -> Result<T, Box<dyn Error>> {
        match self.get_config_value(key)? {
            Some(raw) => match raw.trim().parse::<T>() {
                Ok(v) => Ok(v),
                Err(_) => {
                    tracing::warn!("配置项格式错误，使用默认值: key={}, value={}", key, raw);
                    Ok(default)
                }
            },
            None => Ok(default),
        }
    }

    fn get_time_or(&self, key: &str, default: NaiveTime) -> Result<NaiveTime, Box<dyn Error>> {
        match self.get_config_value(key)? {
            Some(raw) => match NaiveTime::parse_from_str(raw.trim(), "%H:%M") {
                Ok(t) => Ok(t),
                Err(_) => {
                    tracing::warn!("时间配置格式错误(应为 HH:MM)，使用默认值: key={}, value={}", key, raw);
                    Ok(default)
                }
            },
            None => Ok(default),
        }
    }

    /// 解析倒计时阈值列表，例如 "7,3,1,0"
    fn get_thresholds_or(&self, key: &str, default: Vec<i64>) -> Result<Vec<i64>, Box<dyn Error>> {
        let raw = match self.get_config_value(key)? {
            Some(raw) => raw,
            None => return Ok(default),
        };

        let parsed: Result<Vec<i64>, _> = raw
            .split(',')
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .map(|s| s.parse::<i64>())
            .collect();

        match parsed {
            Ok(mut values) if !values.is_empty() && values.iter().all(|v| *v >= 0) => {
                values.sort_unstable_by(|a, b| b.cmp(a));
                values.dedup();
                Ok(values)
            }
            _ => {
                tracing::warn!("倒计时阈值配置错误，使用默认值: key={}, value={}", key, raw);
                Ok(default)
            }
        }
    }

    // ==========================================
    // 策略加载
    // ==========================================

    /// 加载全量合规策略
    pub fn load_policy(&self) -> Result<CompliancePolicy, Box<dyn Error>> {
        let d = CompliancePolicy::default();
        let mut policy = d.clone();

        policy.lookback_days = self.get_parsed_or(config_keys::LOOKBACK_DAYS, d.lookback_days)?;

        policy.classifier.critical_pct =
            self.get_parsed_or(config_keys::CLASSIFIER_CRITICAL_PCT, d.classifier.critical_pct)?;
        policy.classifier.high_pct =
            self.get_parsed_or(config_keys::CLASSIFIER_HIGH_PCT, d.classifier.high_pct)?;
        if policy.classifier.high_pct > policy.classifier.critical_pct {
            tracing::warn!(
                "分级阈值配置错误(high_pct > critical_pct)，使用默认分级: high={}, critical={}",
                policy.classifier.high_pct,
                policy.classifier.critical_pct
            );
            policy.classifier = d.classifier.clone();
        }

        policy.pattern.window_days =
            self.get_parsed_or(config_keys::PATTERN_WINDOW_DAYS, d.pattern.window_days)?;
        policy.pattern.repeat_threshold =
            self.get_parsed_or(config_keys::PATTERN_REPEAT_THRESHOLD, d.pattern.repeat_threshold)?;
        policy.pattern.repeat_critical_threshold = self.get_parsed_or(
            config_keys::PATTERN_REPEAT_CRITICAL_THRESHOLD,
            d.pattern.repeat_critical_threshold,
        )?;
        policy.pattern.blocked_sale_threshold = self.get_parsed_or(
            config_keys::PATTERN_BLOCKED_SALE_THRESHOLD,
            d.pattern.blocked_sale_threshold,
        )?;
        policy.pattern.cooldown_days =
            self.get_parsed_or(config_keys::PATTERN_COOLDOWN_DAYS, d.pattern.cooldown_days)?;

        policy.countdown.thresholds =
            self.get_thresholds_or(config_keys::COUNTDOWN_THRESHOLDS, d.countdown.thresholds.clone())?;
        policy.countdown.send_delay_ms =
            self.get_parsed_or(config_keys::COUNTDOWN_SEND_DELAY_MS, d.countdown.send_delay_ms)?;

        policy.schedule.countdown_time =
            self.get_time_or(config_keys::SCHEDULER_COUNTDOWN_TIME, d.schedule.countdown_time)?;
        policy.schedule.expiry_time =
            self.get_time_or(config_keys::SCHEDULER_EXPIRY_TIME, d.schedule.expiry_time)?;

        if let Some(recipient) = self.get_config_value(config_keys::REGULATOR_RECIPIENT)? {
            if !recipient.trim().is_empty() {
                policy.regulator_recipient = recipient.trim().to_string();
            }
        }

        Ok(policy)
    }
}

// ==========================================
// 配置键
// ==========================================
pub mod config_keys {
    // 合规状态
    pub const LOOKBACK_DAYS: &str = "compliance.lookback_days";

    // 超标分级
    pub const CLASSIFIER_CRITICAL_PCT: &str = "classifier.critical_pct";
    pub const CLASSIFIER_HIGH_PCT: &str = "classifier.high_pct";

    // 模式检测
    pub const PATTERN_WINDOW_DAYS: &str = "pattern.window_days";
    pub const PATTERN_REPEAT_THRESHOLD: &str = "pattern.repeat_threshold";
    pub const PATTERN_REPEAT_CRITICAL_THRESHOLD: &str = "pattern.repeat_critical_threshold";
    pub const PATTERN_BLOCKED_SALE_THRESHOLD: &str = "pattern.blocked_sale_threshold";
    pub const PATTERN_COOLDOWN_DAYS: &str = "pattern.cooldown_days";

    // 休药倒计时
    pub const COUNTDOWN_THRESHOLDS: &str = "countdown.thresholds";
    pub const COUNTDOWN_SEND_DELAY_MS: &str = "countdown.send_delay_ms";

    // 调度时间 (UTC, HH:MM)
    pub const SCHEDULER_COUNTDOWN_TIME: &str = "scheduler.countdown_time";
    pub const SCHEDULER_EXPIRY_TIME: &str = "scheduler.expiry_time";

    // 通知
    pub const REGULATOR_RECIPIENT: &str = "notification.regulator_recipient";
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> ConfigManager {
        let conn = crate::db::open_in_memory().unwrap();
        ConfigManager::from_connection(Arc::new(Mutex::new(conn))).unwrap()
    }

    #[test]
    fn test_load_policy_defaults() {
        let manager = setup();
        let policy = manager.load_policy().unwrap();
        assert_eq!(policy, CompliancePolicy::default());
    }

    #[test]
    fn test_load_policy_overrides() {
        let manager = setup();
        manager.set_global_config_value(config_keys::PATTERN_REPEAT_THRESHOLD, "4").unwrap();
        manager.set_global_config_value(config_keys::COUNTDOWN_THRESHOLDS, "1, 14,7").unwrap();
        manager.set_global_config_value(config_keys::SCHEDULER_EXPIRY_TIME, "02:30").unwrap();

        let policy = manager.load_policy().unwrap();
        assert_eq!(policy.pattern.repeat_threshold, 4);
        assert_eq!(policy.countdown.thresholds, vec![14, 7, 1]);
        assert_eq!(policy.schedule.expiry_time, NaiveTime::from_hms_opt(2, 30, 0).unwrap());
    }

    #[test]
    fn test_invalid_values_fall_back_to_defaults() {
        let manager = setup();
        manager.set_global_config_value(config_keys::CLASSIFIER_HIGH_PCT, "abc").unwrap();
        manager.set_global_config_value(config_keys::COUNTDOWN_THRESHOLDS, "7,-1").unwrap();
        manager.set_global_config_value(config_keys::CLASSIFIER_CRITICAL_PCT, "30").unwrap();

        let policy = manager.load_policy().unwrap();
        // high(默认50) > critical(30) -> 整体回退
        assert_eq!(policy.classifier.high_pct, 50.0);
        assert_eq!(policy.classifier.critical_pct, 100.0);
        assert_eq!(policy.countdown.thresholds, vec![7, 3, 1, 0]);
    }
}
