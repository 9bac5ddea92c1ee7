// ==========================================
// 畜产品合规引擎 - 休药倒计时通知去重记录
// ==========================================
// 主键: (treatment_id, threshold_day)
// 语义: 先占位后发送，同一阈值至多发送一次
// ==========================================

use crate::repository::error::{RepositoryError, RepositoryResult};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Result as SqliteResult};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CountdownNotificationRecord {
    pub treatment_id: String,
    pub threshold_day: i64,
    pub farmer_id: String,
    pub animal_id: String,
    pub claimed_at: DateTime<Utc>,
    pub email_sent: bool,
    pub failure_reason: Option<String>,
}

pub struct CountdownNotificationRepository {
    conn: Arc<Mutex<Connection>>,
}

impl CountdownNotificationRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 占位 (INSERT OR IGNORE)
    ///
    /// # 返回
    /// - Ok(true): 本次占位成功，可以发送
    /// - Ok(false): 已有记录，跳过
    pub fn try_claim(
        &self,
        treatment_id: &str,
        threshold_day: i64,
        farmer_id: &str,
        animal_id: &str,
        now: DateTime<Utc>,
    ) -> RepositoryResult<bool> {
        let conn = self.get_conn()?;
        let rows = conn.execute(
            r#"INSERT OR IGNORE INTO countdown_notification
               (treatment_id, threshold_day, farmer_id, animal_id, claimed_at, email_sent)
               VALUES (?1, ?2, ?3, ?4, ?5, 0)"#,
            params![treatment_id, threshold_day, farmer_id, animal_id, now],
        )?;
        Ok(rows > 0)
    }

    /// 回写发送结果
    pub fn record_outcome(
        &self,
        treatment_id: &str,
        threshold_day: i64,
        email_sent: bool,
        failure_reason: Option<&str>,
    ) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            r#"UPDATE countdown_notification SET email_sent = ?1, failure_reason = ?2
               WHERE treatment_id = ?3 AND threshold_day = ?4"#,
            params![email_sent as i32, failure_reason, treatment_id, threshold_day],
        )?;
        Ok(())
    }

    pub fn find_by_treatment(
        &self,
        treatment_id: &str,
    ) -> RepositoryResult<Vec<CountdownNotificationRecord>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"SELECT treatment_id, threshold_day, farmer_id, animal_id, claimed_at,
                      email_sent, failure_reason
               FROM countdown_notification
               WHERE treatment_id = ?1
               ORDER BY threshold_day DESC"#,
        )?;
        let rows = stmt
            .query_map(params![treatment_id], |row| {
                Ok(CountdownNotificationRecord {
                    treatment_id: row.get(0)?,
                    threshold_day: row.get(1)?,
                    farmer_id: row.get(2)?,
                    animal_id: row.get(3)?,
                    claimed_at: row.get(4)?,
                    email_sent: row.get::<_, i32>(5)? != 0,
                    failure_reason: row.get(6)?,
                })
            })?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(rows)
    }
}
