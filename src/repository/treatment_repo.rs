// ==========================================
// 畜产品合规引擎 - 用药记录数据仓储
// ==========================================
// 红线: Repository 不做业务逻辑,只做数据映射
// linked_lab_test_ids 以 JSON 数组存储
// ==========================================

use crate::domain::treatment::Treatment;
use crate::domain::types::ApprovalStatus;
use crate::repository::error::{invalid_column, RepositoryError, RepositoryResult};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::sync::{Arc, Mutex, MutexGuard};

const TREATMENT_COLUMNS: &str = r#"
    treatment_id, animal_id, farmer_id, drug_name, start_date,
    withdrawal_end_date, approval_status, approved_by, mrl_compliant,
    requires_mrl_test, linked_lab_test_ids, created_at
"#;

pub struct TreatmentRepository {
    conn: Arc<Mutex<Connection>>,
}

impl TreatmentRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    fn map_row(row: &Row<'_>) -> rusqlite::Result<Treatment> {
        let status_str: String = row.get(6)?;
        let approval_status = ApprovalStatus::from_str(&status_str)
            .ok_or_else(|| invalid_column(6, "approval_status", &status_str))?;
        let mrl_compliant: Option<i32> = row.get(8)?;
        let linked_json: String = row.get(10)?;
        let linked_lab_test_ids: Vec<String> = serde_json::from_str(&linked_json)
            .map_err(|_| invalid_column(10, "linked_lab_test_ids", &linked_json))?;

        Ok(Treatment {
            treatment_id: row.get(0)?,
            animal_id: row.get(1)?,
            farmer_id: row.get(2)?,
            drug_name: row.get(3)?,
            start_date: row.get(4)?,
            withdrawal_end_date: row.get(5)?,
            approval_status,
            approved_by: row.get(7)?,
            mrl_compliant: mrl_compliant.map(|v| v != 0),
            requires_mrl_test: row.get::<_, i32>(9)? != 0,
            linked_lab_test_ids,
            created_at: row.get(11)?,
        })
    }

    // ==========================================
    // 写入操作
    // ==========================================

    pub fn insert(&self, treatment: &Treatment) -> RepositoryResult<()> {
        if treatment.withdrawal_end_date < treatment.start_date {
            return Err(RepositoryError::FieldValueError {
                field: "withdrawal_end_date".to_string(),
                message: "休药期结束时间早于用药开始时间".to_string(),
            });
        }

        let linked_json = serde_json::to_string(&treatment.linked_lab_test_ids)?;
        let conn = self.get_conn()?;
        conn.execute(
            &format!(
                "INSERT INTO treatment ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                TREATMENT_COLUMNS
            ),
            params![
                treatment.treatment_id,
                treatment.animal_id,
                treatment.farmer_id,
                treatment.drug_name,
                treatment.start_date,
                treatment.withdrawal_end_date,
                treatment.approval_status.as_str(),
                treatment.approved_by,
                treatment.mrl_compliant.map(|v| v as i32),
                treatment.requires_mrl_test as i32,
                linked_json,
                treatment.created_at,
            ],
        )?;
        Ok(())
    }

    /// 更新审批状态 (仅 PENDING 可变更)
    ///
    /// # 返回
    /// - Ok(false): 记录不处于 PENDING
    pub fn update_approval(
        &self,
        treatment_id: &str,
        status: ApprovalStatus,
        approved_by: &str,
    ) -> RepositoryResult<bool> {
        let conn = self.get_conn()?;
        let rows = conn.execute(
            r#"UPDATE treatment SET approval_status = ?1, approved_by = ?2
               WHERE treatment_id = ?3 AND approval_status = 'PENDING'"#,
            params![status.as_str(), approved_by, treatment_id],
        )?;
        Ok(rows > 0)
    }

    /// 关联检测单并记录合规标注
    pub fn link_lab_test(
        &self,
        treatment_id: &str,
        lab_test_id: &str,
        mrl_compliant: bool,
    ) -> RepositoryResult<()> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;

        let linked_json: String = tx
            .query_row(
                "SELECT linked_lab_test_ids FROM treatment WHERE treatment_id = ?1",
                params![treatment_id],
                |row| row.get(0),
            )
            .optional()?
            .ok_or_else(|| RepositoryError::not_found("Treatment", treatment_id))?;

        let mut linked: Vec<String> = serde_json::from_str(&linked_json)?;
        if !linked.iter().any(|id| id == lab_test_id) {
            linked.push(lab_test_id.to_string());
        }

        tx.execute(
            r#"UPDATE treatment SET linked_lab_test_ids = ?1, mrl_compliant = ?2
               WHERE treatment_id = ?3"#,
            params![serde_json::to_string(&linked)?, mrl_compliant as i32, treatment_id],
        )?;
        tx.commit()?;
        Ok(())
    }

    // ==========================================
    // 查询操作
    // ==========================================

    pub fn find_by_id(&self, treatment_id: &str) -> RepositoryResult<Option<Treatment>> {
        let conn = self.get_conn()?;
        let treatment = conn
            .query_row(
                &format!("SELECT {} FROM treatment WHERE treatment_id = ?1", TREATMENT_COLUMNS),
                params![treatment_id],
                Self::map_row,
            )
            .optional()?;
        Ok(treatment)
    }

    /// 查询某牲畜全部用药记录 (按开始时间倒序)
    pub fn find_by_animal(&self, animal_id: &str) -> RepositoryResult<Vec<Treatment>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM treatment WHERE animal_id = ?1 ORDER BY start_date DESC",
            TREATMENT_COLUMNS
        ))?;
        let rows = stmt
            .query_map(params![animal_id], Self::map_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// 某牲畜某药物最近一条已批准用药
    pub fn find_latest_approved_for_drug(
        &self,
        animal_id: &str,
        drug_name: &str,
    ) -> RepositoryResult<Option<Treatment>> {
        let conn = self.get_conn()?;
        let treatment = conn
            .query_row(
                &format!(
                    r#"SELECT {} FROM treatment
                       WHERE animal_id = ?1 AND drug_name = ?2 AND approval_status = 'APPROVED'
                       ORDER BY start_date DESC LIMIT 1"#,
                    TREATMENT_COLUMNS
                ),
                params![animal_id, drug_name],
                Self::map_row,
            )
            .optional()?;
        Ok(treatment)
    }

    /// 休药期尚未结束的已批准用药 id (倒计时扫描用)
    ///
    /// 只取主键, 由调用方逐条 `find_by_id`, 单条坏数据不影响其余记录
    pub fn find_approved_ids_with_withdrawal_from(
        &self,
        now: DateTime<Utc>,
    ) -> RepositoryResult<Vec<String>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"SELECT treatment_id FROM treatment
               WHERE approval_status = 'APPROVED' AND withdrawal_end_date >= ?1
               ORDER BY withdrawal_end_date ASC, treatment_id ASC"#,
        )?;
        let ids = stmt
            .query_map(params![now], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(ids)
    }
}
