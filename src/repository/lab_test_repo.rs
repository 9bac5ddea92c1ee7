// ==========================================
// 畜产品合规引擎 - 残留检测结果数据仓储
// ==========================================
// 红线: 检测结果创建后仅允许修改复核字段
// ==========================================

use crate::domain::lab_test::LabTestResult;
use crate::domain::types::ReviewStatus;
use crate::repository::error::{invalid_column, RepositoryError, RepositoryResult};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::sync::{Arc, Mutex, MutexGuard};

const LAB_TEST_COLUMNS: &str = r#"
    lab_test_id, animal_id, farmer_id, drug_name, residue_level,
    mrl_threshold, unit, test_date, passed, review_status, violation_resolved
"#;

pub struct LabTestRepository {
    conn: Arc<Mutex<Connection>>,
}

impl LabTestRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    fn map_row(row: &Row<'_>) -> rusqlite::Result<LabTestResult> {
        let review_str: String = row.get(9)?;
        let review_status = ReviewStatus::from_str(&review_str)
            .ok_or_else(|| invalid_column(9, "review_status", &review_str))?;
        Ok(LabTestResult {
            lab_test_id: row.get(0)?,
            animal_id: row.get(1)?,
            farmer_id: row.get(2)?,
            drug_name: row.get(3)?,
            residue_level: row.get(4)?,
            mrl_threshold: row.get(5)?,
            unit: row.get(6)?,
            test_date: row.get(7)?,
            passed: row.get::<_, i32>(8)? != 0,
            review_status,
            violation_resolved: row.get::<_, i32>(10)? != 0,
        })
    }

    pub fn insert(&self, result: &LabTestResult) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            &format!(
                "INSERT INTO lab_test_result ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                LAB_TEST_COLUMNS
            ),
            params![
                result.lab_test_id,
                result.animal_id,
                result.farmer_id,
                result.drug_name,
                result.residue_level,
                result.mrl_threshold,
                result.unit,
                result.test_date,
                result.passed as i32,
                result.review_status.as_str(),
                result.violation_resolved as i32,
            ],
        )?;
        Ok(())
    }

    /// 标记超标已闭环 (允许养殖户复检)
    pub fn mark_violation_resolved(&self, lab_test_id: &str) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        let rows = conn.execute(
            "UPDATE lab_test_result SET violation_resolved = 1 WHERE lab_test_id = ?1",
            params![lab_test_id],
        )?;
        if rows == 0 {
            return Err(RepositoryError::not_found("LabTestResult", lab_test_id));
        }
        Ok(())
    }

    pub fn update_review_status(
        &self,
        lab_test_id: &str,
        review_status: ReviewStatus,
    ) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        let rows = conn.execute(
            "UPDATE lab_test_result SET review_status = ?1 WHERE lab_test_id = ?2",
            params![review_status.as_str(), lab_test_id],
        )?;
        if rows == 0 {
            return Err(RepositoryError::not_found("LabTestResult", lab_test_id));
        }
        Ok(())
    }

    pub fn find_by_id(&self, lab_test_id: &str) -> RepositoryResult<Option<LabTestResult>> {
        let conn = self.get_conn()?;
        let result = conn
            .query_row(
                &format!("SELECT {} FROM lab_test_result WHERE lab_test_id = ?1", LAB_TEST_COLUMNS),
                params![lab_test_id],
                Self::map_row,
            )
            .optional()?;
        Ok(result)
    }

    /// 某牲畜全部检测结果 (按检测时间倒序)
    pub fn find_by_animal(&self, animal_id: &str) -> RepositoryResult<Vec<LabTestResult>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM lab_test_result WHERE animal_id = ?1 ORDER BY test_date DESC",
            LAB_TEST_COLUMNS
        ))?;
        let rows = stmt
            .query_map(params![animal_id], Self::map_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// 某养殖户最近的检测结果
    pub fn find_recent_by_farmer(
        &self,
        farmer_id: &str,
        since: DateTime<Utc>,
        limit: u32,
    ) -> RepositoryResult<Vec<LabTestResult>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(&format!(
            r#"SELECT {} FROM lab_test_result
               WHERE farmer_id = ?1 AND test_date >= ?2
               ORDER BY test_date DESC LIMIT ?3"#,
            LAB_TEST_COLUMNS
        ))?;
        let rows = stmt
            .query_map(params![farmer_id, since, limit], Self::map_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// 某养殖户检测统计 (总数, 超标数)
    pub fn count_by_farmer(
        &self,
        farmer_id: &str,
        since: DateTime<Utc>,
    ) -> RepositoryResult<(u64, u64)> {
        let conn = self.get_conn()?;
        let (total, failed): (i64, i64) = conn.query_row(
            r#"SELECT COUNT(*), COALESCE(SUM(CASE WHEN passed = 0 THEN 1 ELSE 0 END), 0)
               FROM lab_test_result WHERE farmer_id = ?1 AND test_date >= ?2"#,
            params![farmer_id, since],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        Ok((total as u64, failed as u64))
    }
}
