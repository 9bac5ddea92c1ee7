// ==========================================
// 畜产品合规引擎 - 牲畜数据仓储
// ==========================================
// 红线: Repository 不做业务逻辑,只做数据映射
// ==========================================

use crate::domain::animal::Animal;
use crate::repository::error::{RepositoryError, RepositoryResult};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::sync::{Arc, Mutex, MutexGuard};

const ANIMAL_COLUMNS: &str = r#"
    animal_id, tag_id, farmer_id, species, withdrawal_active,
    withdrawal_end_date, requires_mrl_test, updated_at
"#;

pub struct AnimalRepository {
    conn: Arc<Mutex<Connection>>,
}

impl AnimalRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    fn map_row(row: &Row<'_>) -> rusqlite::Result<Animal> {
        Ok(Animal {
            animal_id: row.get(0)?,
            tag_id: row.get(1)?,
            farmer_id: row.get(2)?,
            species: row.get(3)?,
            withdrawal_active: row.get::<_, i32>(4)? != 0,
            withdrawal_end_date: row.get(5)?,
            requires_mrl_test: row.get::<_, i32>(6)? != 0,
            updated_at: row.get(7)?,
        })
    }

    // ==========================================
    // 写入操作
    // ==========================================

    pub fn insert(&self, animal: &Animal) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            &format!(
                "INSERT INTO animal ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                ANIMAL_COLUMNS
            ),
            params![
                animal.animal_id,
                animal.tag_id,
                animal.farmer_id,
                animal.species,
                animal.withdrawal_active as i32,
                animal.withdrawal_end_date,
                animal.requires_mrl_test as i32,
                animal.updated_at,
            ],
        )?;
        Ok(())
    }

    /// 用药审批后开启休药期
    ///
    /// 休药期结束时间取现有值与新值的较大者，同时清除 requires_mrl_test
    pub fn start_withdrawal(
        &self,
        animal_id: &str,
        withdrawal_end_date: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> RepositoryResult<Animal> {
        let conn = self.get_conn()?;
        let current = conn
            .query_row(
                &format!("SELECT {} FROM animal WHERE animal_id = ?1", ANIMAL_COLUMNS),
                params![animal_id],
                Self::map_row,
            )
            .optional()?
            .ok_or_else(|| RepositoryError::not_found("Animal", animal_id))?;

        let end = match current.withdrawal_end_date {
            Some(existing) if current.withdrawal_active && existing > withdrawal_end_date => existing,
            _ => withdrawal_end_date,
        };

        conn.execute(
            r#"UPDATE animal
               SET withdrawal_active = 1, withdrawal_end_date = ?1,
                   requires_mrl_test = 0, updated_at = ?2
               WHERE animal_id = ?3"#,
            params![end, now, animal_id],
        )?;

        Ok(Animal {
            withdrawal_active: true,
            withdrawal_end_date: Some(end),
            requires_mrl_test: false,
            updated_at: now,
            ..current
        })
    }

    /// 休药期到期: withdrawal_active -> false, requires_mrl_test -> true
    ///
    /// 仅当仍处于休药期且已到期时更新，返回是否实际更新
    pub fn mark_withdrawal_expired(
        &self,
        animal_id: &str,
        now: DateTime<Utc>,
    ) -> RepositoryResult<bool> {
        let conn = self.get_conn()?;
        let rows = conn.execute(
            r#"UPDATE animal
               SET withdrawal_active = 0, requires_mrl_test = 1, updated_at = ?1
               WHERE animal_id = ?2 AND withdrawal_active = 1 AND withdrawal_end_date <= ?1"#,
            params![now, animal_id],
        )?;
        Ok(rows > 0)
    }

    /// 合格检测后清除待检标志
    pub fn clear_requires_mrl_test(&self, animal_id: &str, now: DateTime<Utc>) -> RepositoryResult<bool> {
        let conn = self.get_conn()?;
        let rows = conn.execute(
            r#"UPDATE animal SET requires_mrl_test = 0, updated_at = ?1
               WHERE animal_id = ?2 AND requires_mrl_test = 1"#,
            params![now, animal_id],
        )?;
        Ok(rows > 0)
    }

    // ==========================================
    // 查询操作
    // ==========================================

    pub fn find_by_id(&self, animal_id: &str) -> RepositoryResult<Option<Animal>> {
        let conn = self.get_conn()?;
        let animal = conn
            .query_row(
                &format!("SELECT {} FROM animal WHERE animal_id = ?1", ANIMAL_COLUMNS),
                params![animal_id],
                Self::map_row,
            )
            .optional()?;
        Ok(animal)
    }

    /// 休药期已到期但仍标记为休药中的牲畜 id
    ///
    /// 只取主键, 由调用方逐条加载
    pub fn find_expired_withdrawal_ids(&self, now: DateTime<Utc>) -> RepositoryResult<Vec<String>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"SELECT animal_id FROM animal
               WHERE withdrawal_active = 1
                 AND withdrawal_end_date IS NOT NULL
                 AND withdrawal_end_date <= ?1
               ORDER BY farmer_id, tag_id"#,
        )?;
        let ids = stmt
            .query_map(params![now], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(ids)
    }
}
