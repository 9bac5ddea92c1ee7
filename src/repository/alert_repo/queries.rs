use super::core::{RegulatorAlertRepository, ALERT_COLUMNS};
use crate::domain::alert::{AlertFilter, Page, RegulatorAlert};
use crate::domain::types::AlertType;
use crate::repository::error::RepositoryResult;
use chrono::{DateTime, Utc};
use rusqlite::types::ToSql;
use rusqlite::{params, params_from_iter, OptionalExtension, Result as SqliteResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// 默认分页大小
pub const DEFAULT_PAGE_SIZE: u32 = 20;
/// 分页大小上限
pub const MAX_PAGE_SIZE: u32 = 200;

/// 分组计数行
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertCountRow {
    pub alert_type: String,
    pub status: String,
    pub severity: String,
    pub count: u64,
}

/// 预警统计
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AlertStats {
    pub total: u64,
    pub by_type: BTreeMap<String, u64>,
    pub by_status: BTreeMap<String, u64>,
    pub by_severity: BTreeMap<String, u64>,
}

impl AlertStats {
    pub fn from_rows(rows: &[AlertCountRow]) -> Self {
        let mut stats = AlertStats::default();
        for row in rows {
            stats.total += row.count;
            *stats.by_type.entry(row.alert_type.clone()).or_insert(0) += row.count;
            *stats.by_status.entry(row.status.clone()).or_insert(0) += row.count;
            *stats.by_severity.entry(row.severity.clone()).or_insert(0) += row.count;
        }
        stats
    }
}

impl RegulatorAlertRepository {
    // ==========================================
    // 查询操作
    // ==========================================

    pub fn find_by_id(&self, alert_id: &str) -> RepositoryResult<Option<RegulatorAlert>> {
        let conn = self.get_conn()?;
        let alert = conn
            .query_row(
                &format!("SELECT {} FROM regulator_alert WHERE alert_id = ?1", ALERT_COLUMNS),
                params![alert_id],
                Self::map_row,
            )
            .optional()?;
        Ok(alert)
    }

    /// 分页列表: 按创建时间倒序
    pub fn list(&self, filter: &AlertFilter) -> RepositoryResult<Page<RegulatorAlert>> {
        let mut clauses: Vec<&str> = Vec::new();
        let mut values: Vec<Box<dyn ToSql>> = Vec::new();

        if let Some(farmer_id) = &filter.farmer_id {
            clauses.push("farmer_id = ?");
            values.push(Box::new(farmer_id.clone()));
        }
        if let Some(status) = filter.status {
            clauses.push("status = ?");
            values.push(Box::new(status.as_str()));
        }
        if let Some(severity) = filter.severity {
            clauses.push("severity = ?");
            values.push(Box::new(severity.as_str()));
        }
        if let Some(alert_type) = filter.alert_type {
            clauses.push("alert_type = ?");
            values.push(Box::new(alert_type.as_str()));
        }
        if let Some(risk_level) = filter.risk_level {
            clauses.push("risk_level = ?");
            values.push(Box::new(risk_level.as_str()));
        }

        let where_sql = if clauses.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", clauses.join(" AND "))
        };

        let page = filter.page.max(1);
        let page_size = match filter.page_size {
            0 => DEFAULT_PAGE_SIZE,
            n => n.min(MAX_PAGE_SIZE),
        };
        let offset = (page - 1) as i64 * page_size as i64;

        let conn = self.get_conn()?;

        let total: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM regulator_alert {}", where_sql),
            params_from_iter(values.iter()),
            |row| row.get(0),
        )?;

        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM regulator_alert {} ORDER BY created_at DESC, alert_id LIMIT {} OFFSET {}",
            ALERT_COLUMNS, where_sql, page_size, offset
        ))?;
        let items = stmt
            .query_map(params_from_iter(values.iter()), Self::map_row)?
            .collect::<SqliteResult<Vec<_>>>()?;

        Ok(Page {
            items,
            total: total as u64,
            page,
            page_size,
        })
    }

    /// 统计某养殖户在窗口内某类型预警数量
    pub fn count_by_type_since(
        &self,
        farmer_id: &str,
        alert_type: AlertType,
        since: DateTime<Utc>,
    ) -> RepositoryResult<u64> {
        let conn = self.get_conn()?;
        let count: i64 = conn.query_row(
            r#"SELECT COUNT(*) FROM regulator_alert
               WHERE farmer_id = ?1 AND alert_type = ?2 AND created_at >= ?3"#,
            params![farmer_id, alert_type.as_str(), since],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    /// 某养殖户某类型最近一条预警
    pub fn find_latest_by_type(
        &self,
        farmer_id: &str,
        alert_type: AlertType,
    ) -> RepositoryResult<Option<RegulatorAlert>> {
        let conn = self.get_conn()?;
        let alert = conn
            .query_row(
                &format!(
                    r#"SELECT {} FROM regulator_alert
                       WHERE farmer_id = ?1 AND alert_type = ?2
                       ORDER BY created_at DESC LIMIT 1"#,
                    ALERT_COLUMNS
                ),
                params![farmer_id, alert_type.as_str()],
                Self::map_row,
            )
            .optional()?;
        Ok(alert)
    }

    /// 同一养殖户的其他预警
    pub fn find_related(
        &self,
        farmer_id: &str,
        exclude_alert_id: &str,
        limit: u32,
    ) -> RepositoryResult<Vec<RegulatorAlert>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(&format!(
            r#"SELECT {} FROM regulator_alert
               WHERE farmer_id = ?1 AND alert_id <> ?2
               ORDER BY created_at DESC LIMIT ?3"#,
            ALERT_COLUMNS
        ))?;
        let alerts = stmt
            .query_map(params![farmer_id, exclude_alert_id, limit], Self::map_row)?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(alerts)
    }

    /// 按 (类型, 状态, 严重程度) 分组计数
    pub fn count_grouped(&self, farmer_id: Option<&str>) -> RepositoryResult<Vec<AlertCountRow>> {
        let conn = self.get_conn()?;
        let base = "SELECT alert_type, status, severity, COUNT(*) FROM regulator_alert";
        let group = "GROUP BY alert_type, status, severity ORDER BY alert_type, status, severity";

        let map = |row: &rusqlite::Row<'_>| -> SqliteResult<AlertCountRow> {
            Ok(AlertCountRow {
                alert_type: row.get(0)?,
                status: row.get(1)?,
                severity: row.get(2)?,
                count: row.get::<_, i64>(3)? as u64,
            })
        };

        let rows = match farmer_id {
            Some(farmer_id) => {
                let mut stmt = conn.prepare(&format!("{} WHERE farmer_id = ?1 {}", base, group))?;
                let rows = stmt
                    .query_map(params![farmer_id], map)?
                    .collect::<SqliteResult<Vec<_>>>()?;
                rows
            }
            None => {
                let mut stmt = conn.prepare(&format!("{} {}", base, group))?;
                let rows = stmt.query_map([], map)?.collect::<SqliteResult<Vec<_>>>()?;
                rows
            }
        };
        Ok(rows)
    }
}
