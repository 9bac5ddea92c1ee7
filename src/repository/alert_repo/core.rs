use crate::domain::alert::RegulatorAlert;
use crate::domain::types::{AlertStatus, AlertType, RiskLevel, Severity};
use crate::repository::error::{invalid_column, RepositoryError, RepositoryResult};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::sync::{Arc, Mutex, MutexGuard};

pub(super) const ALERT_COLUMNS: &str = r#"
    alert_id, alert_type, severity, risk_level, farmer_id, animal_id, lab_test_id,
    message, violation_details, status, status_notes, acknowledged_by, acknowledged_at,
    resolved_by, resolved_at, resolution_notes, escalated_at, email_sent,
    created_at, updated_at, updated_by, revision
"#;

// ==========================================
// RegulatorAlertRepository - 监管预警仓储
// ==========================================
// 红线: Repository 不做业务逻辑,只做数据映射
pub struct RegulatorAlertRepository {
    conn: Arc<Mutex<Connection>>,
}

impl RegulatorAlertRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    pub(super) fn get_conn(&self) -> RepositoryResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    pub(super) fn map_row(row: &Row<'_>) -> rusqlite::Result<RegulatorAlert> {
        let type_str: String = row.get(1)?;
        let severity_str: String = row.get(2)?;
        let risk_str: String = row.get(3)?;
        let status_str: String = row.get(9)?;
        let details_str: String = row.get(8)?;

        Ok(RegulatorAlert {
            alert_id: row.get(0)?,
            alert_type: AlertType::from_str(&type_str)
                .ok_or_else(|| invalid_column(1, "alert_type", &type_str))?,
            severity: Severity::from_str(&severity_str)
                .ok_or_else(|| invalid_column(2, "severity", &severity_str))?,
            risk_level: RiskLevel::from_str(&risk_str)
                .ok_or_else(|| invalid_column(3, "risk_level", &risk_str))?,
            farmer_id: row.get(4)?,
            animal_id: row.get(5)?,
            lab_test_id: row.get(6)?,
            message: row.get(7)?,
            violation_details: serde_json::from_str(&details_str)
                .map_err(|_| invalid_column(8, "violation_details", &details_str))?,
            status: AlertStatus::from_str(&status_str)
                .ok_or_else(|| invalid_column(9, "status", &status_str))?,
            status_notes: row.get(10)?,
            acknowledged_by: row.get(11)?,
            acknowledged_at: row.get(12)?,
            resolved_by: row.get(13)?,
            resolved_at: row.get(14)?,
            resolution_notes: row.get(15)?,
            escalated_at: row.get(16)?,
            email_sent: row.get::<_, i32>(17)? != 0,
            created_at: row.get(18)?,
            updated_at: row.get(19)?,
            updated_by: row.get(20)?,
            revision: row.get(21)?,
        })
    }

    // ==========================================
    // 写入操作
    // ==========================================

    pub fn insert(&self, alert: &RegulatorAlert) -> RepositoryResult<String> {
        let details = serde_json::to_string(&alert.violation_details)?;
        let conn = self.get_conn()?;
        conn.execute(
            &format!(
                r#"INSERT INTO regulator_alert ({}) VALUES (
                    ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11,
                    ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20, ?21, ?22
                )"#,
                ALERT_COLUMNS
            ),
            params![
                alert.alert_id,
                alert.alert_type.as_str(),
                alert.severity.as_str(),
                alert.risk_level.as_str(),
                alert.farmer_id,
                alert.animal_id,
                alert.lab_test_id,
                alert.message,
                details,
                alert.status.as_str(),
                alert.status_notes,
                alert.acknowledged_by,
                alert.acknowledged_at,
                alert.resolved_by,
                alert.resolved_at,
                alert.resolution_notes,
                alert.escalated_at,
                alert.email_sent as i32,
                alert.created_at,
                alert.updated_at,
                alert.updated_by,
                alert.revision,
            ],
        )?;
        Ok(alert.alert_id.clone())
    }

    /// 更新预警生命周期字段（乐观锁）
    ///
    /// `alert.revision` 为读取时的版本号；成功后库中 revision + 1
    ///
    /// # 错误
    /// - `RepositoryError::OptimisticLockFailure`: revision 不匹配 (其他监管员已更新)
    /// - `RepositoryError::NotFound`: 预警不存在
    pub fn update_lifecycle(&self, alert: &RegulatorAlert) -> RepositoryResult<i32> {
        let conn = self.get_conn()?;
        let rows = conn.execute(
            r#"UPDATE regulator_alert SET
                   severity = ?1, risk_level = ?2, status = ?3, status_notes = ?4,
                   acknowledged_by = ?5, acknowledged_at = ?6,
                   resolved_by = ?7, resolved_at = ?8, resolution_notes = ?9,
                   escalated_at = ?10, updated_at = ?11, updated_by = ?12,
                   revision = revision + 1
               WHERE alert_id = ?13 AND revision = ?14"#,
            params![
                alert.severity.as_str(),
                alert.risk_level.as_str(),
                alert.status.as_str(),
                alert.status_notes,
                alert.acknowledged_by,
                alert.acknowledged_at,
                alert.resolved_by,
                alert.resolved_at,
                alert.resolution_notes,
                alert.escalated_at,
                alert.updated_at,
                alert.updated_by,
                alert.alert_id,
                alert.revision,
            ],
        )?;

        if rows == 0 {
            // 判断是记录不存在还是revision冲突
            let actual: Option<i32> = conn
                .query_row(
                    "SELECT revision FROM regulator_alert WHERE alert_id = ?1",
                    params![alert.alert_id],
                    |row| row.get(0),
                )
                .optional()?;
            return match actual {
                Some(actual) => Err(RepositoryError::OptimisticLockFailure {
                    entity: "RegulatorAlert".to_string(),
                    id: alert.alert_id.clone(),
                    expected: alert.revision,
                    actual,
                }),
                None => Err(RepositoryError::not_found("RegulatorAlert", &alert.alert_id)),
            };
        }

        Ok(alert.revision + 1)
    }

    /// 记录通知投递结果（审计字段，不参与乐观锁）
    pub fn set_email_sent(&self, alert_id: &str, email_sent: bool) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            "UPDATE regulator_alert SET email_sent = ?1 WHERE alert_id = ?2",
            params![email_sent as i32, alert_id],
        )?;
        Ok(())
    }
}
