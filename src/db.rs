// ==========================================
// 畜产品合规引擎 - SQLite 连接初始化
// ==========================================
// 目标:
// - 统一所有 Connection::open 的 PRAGMA 行为
// - 统一 busy_timeout，减少调度任务与用户写入并发时的偶发 busy 错误
// - 提供建表脚本 (幂等)
// ==========================================

use rusqlite::Connection;
use rusqlite::OptionalExtension;
use std::time::Duration;

/// 默认 busy_timeout（毫秒）
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

/// 当前代码所期望的 schema_version
pub const CURRENT_SCHEMA_VERSION: i64 = 1;

/// 配置 SQLite 连接的统一 PRAGMA
///
/// 说明：
/// - foreign_keys 需要“每个连接”单独开启
/// - busy_timeout 需要“每个连接”单独配置
pub fn configure_sqlite_connection(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.busy_timeout(Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS))?;
    Ok(())
}

/// 打开 SQLite 连接并应用统一配置
pub fn open_sqlite_connection(db_path: &str) -> rusqlite::Result<Connection> {
    let conn = Connection::open(db_path)?;
    configure_sqlite_connection(&conn)?;
    Ok(conn)
}

/// 打开内存库并建表（测试/演示用）
pub fn open_in_memory() -> rusqlite::Result<Connection> {
    let conn = Connection::open_in_memory()?;
    configure_sqlite_connection(&conn)?;
    init_schema(&conn)?;
    Ok(conn)
}

/// 建表（幂等）
///
/// 时间字段统一使用 rusqlite chrono 编码（UTC 文本），可直接按字典序比较。
pub fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS config_kv (
            scope_id TEXT NOT NULL,
            key TEXT NOT NULL,
            value TEXT NOT NULL,
            PRIMARY KEY (scope_id, key)
        );

        CREATE TABLE IF NOT EXISTS animal (
            animal_id TEXT PRIMARY KEY,
            tag_id TEXT NOT NULL,
            farmer_id TEXT NOT NULL,
            species TEXT NOT NULL,
            withdrawal_active INTEGER NOT NULL DEFAULT 0,
            withdrawal_end_date TEXT,
            requires_mrl_test INTEGER NOT NULL DEFAULT 0,
            updated_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_animal_withdrawal
          ON animal(withdrawal_active, withdrawal_end_date);

        CREATE TABLE IF NOT EXISTS treatment (
            treatment_id TEXT PRIMARY KEY,
            animal_id TEXT NOT NULL REFERENCES animal(animal_id),
            farmer_id TEXT NOT NULL,
            drug_name TEXT NOT NULL,
            start_date TEXT NOT NULL,
            withdrawal_end_date TEXT NOT NULL,
            approval_status TEXT NOT NULL DEFAULT 'PENDING',
            approved_by TEXT,
            mrl_compliant INTEGER,
            requires_mrl_test INTEGER NOT NULL DEFAULT 1,
            linked_lab_test_ids TEXT NOT NULL DEFAULT '[]',
            created_at TEXT NOT NULL,
            CHECK (withdrawal_end_date >= start_date)
        );

        CREATE INDEX IF NOT EXISTS idx_treatment_animal
          ON treatment(animal_id, start_date);

        CREATE INDEX IF NOT EXISTS idx_treatment_withdrawal
          ON treatment(approval_status, withdrawal_end_date);

        CREATE TABLE IF NOT EXISTS lab_test_result (
            lab_test_id TEXT PRIMARY KEY,
            animal_id TEXT NOT NULL REFERENCES animal(animal_id),
            farmer_id TEXT NOT NULL,
            drug_name TEXT NOT NULL,
            residue_level REAL NOT NULL,
            mrl_threshold REAL NOT NULL,
            unit TEXT NOT NULL,
            test_date TEXT NOT NULL,
            passed INTEGER NOT NULL,
            review_status TEXT NOT NULL DEFAULT 'PENDING_VERIFICATION',
            violation_resolved INTEGER NOT NULL DEFAULT 0
        );

        CREATE INDEX IF NOT EXISTS idx_lab_test_animal
          ON lab_test_result(animal_id, test_date);

        CREATE INDEX IF NOT EXISTS idx_lab_test_farmer
          ON lab_test_result(farmer_id, test_date);

        CREATE TABLE IF NOT EXISTS regulator_alert (
            alert_id TEXT PRIMARY KEY,
            alert_type TEXT NOT NULL,
            severity TEXT NOT NULL,
            risk_level TEXT NOT NULL,
            farmer_id TEXT NOT NULL,
            animal_id TEXT,
            lab_test_id TEXT,
            message TEXT NOT NULL,
            violation_details TEXT NOT NULL DEFAULT '{}',
            status TEXT NOT NULL DEFAULT 'NEW',
            status_notes TEXT,
            acknowledged_by TEXT,
            acknowledged_at TEXT,
            resolved_by TEXT,
            resolved_at TEXT,
            resolution_notes TEXT,
            escalated_at TEXT,
            email_sent INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            updated_by TEXT,
            revision INTEGER NOT NULL DEFAULT 1
        );

        CREATE INDEX IF NOT EXISTS idx_alert_farmer_type
          ON regulator_alert(farmer_id, alert_type, created_at);

        CREATE INDEX IF NOT EXISTS idx_alert_status
          ON regulator_alert(status, created_at);

        CREATE TABLE IF NOT EXISTS countdown_notification (
            treatment_id TEXT NOT NULL,
            threshold_day INTEGER NOT NULL,
            farmer_id TEXT NOT NULL,
            animal_id TEXT NOT NULL,
            claimed_at TEXT NOT NULL,
            email_sent INTEGER NOT NULL DEFAULT 0,
            failure_reason TEXT,
            PRIMARY KEY (treatment_id, threshold_day)
        );
        "#,
    )?;

    conn.execute(
        "INSERT OR IGNORE INTO schema_version (version) VALUES (?1)",
        [CURRENT_SCHEMA_VERSION],
    )?;
    Ok(())
}

/// 读取 schema_version（若表不存在则返回 None）
pub fn read_schema_version(conn: &Connection) -> rusqlite::Result<Option<i64>> {
    let has_table: bool = conn
        .query_row(
            "SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version' LIMIT 1",
            [],
            |_row| Ok(true),
        )
        .optional()?
        .unwrap_or(false);

    if !has_table {
        return Ok(None);
    }

    let v: Option<i64> = conn.query_row("SELECT MAX(version) FROM schema_version", [], |row| row.get(0))?;
    Ok(v)
}
