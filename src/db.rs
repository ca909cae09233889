use std::path::Path;

use rusqlite::{Connection, OptionalExtension};

use crate::error::{Result, SyncError};
use crate::models::{BillTemplate, BillTemplateItem, LegacyTemplate, LegacyTemplateItem};

pub const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS bill_templates (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    code TEXT NOT NULL UNIQUE,
    name TEXT NOT NULL,
    academic_year TEXT NOT NULL,
    program_id TEXT,
    prodi_id TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS bill_template_items (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    bill_template_id INTEGER NOT NULL,
    name TEXT NOT NULL,
    additional_name TEXT,
    amount INTEGER NOT NULL DEFAULT 0,
    ukt TEXT,
    \"BIPOTNamaID\" TEXT,
    mulai_sesi INTEGER NOT NULL DEFAULT 0,
    kali_sesi INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    UNIQUE (bill_template_id, name),
    FOREIGN KEY (bill_template_id) REFERENCES bill_templates(id)
);

CREATE INDEX IF NOT EXISTS idx_bill_template_items_template
    ON bill_template_items(bill_template_id);

CREATE TABLE IF NOT EXISTS sync_runs (
    id INTEGER PRIMARY KEY,
    started_at TEXT NOT NULL,
    finished_at TEXT NOT NULL,
    year_filter TEXT NOT NULL,
    code_filter TEXT,
    templates_synced INTEGER NOT NULL DEFAULT 0,
    items_synced INTEGER NOT NULL DEFAULT 0,
    skipped INTEGER NOT NULL DEFAULT 0,
    failed INTEGER NOT NULL DEFAULT 0
);
";

/// Tables whose auto-increment cursor the sync keeps aligned.
pub const OWNED_TABLES: &[&str] = &["bill_templates", "bill_template_items"];

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub fn get_connection(db_path: &Path) -> Result<Connection> {
    let conn = Connection::open(db_path)?;
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
    Ok(conn)
}

/// Connection to a billing database that must already exist.
pub fn open_target(db_path: &Path) -> Result<Connection> {
    if !db_path.exists() {
        return Err(SyncError::MissingStore {
            role: "Billing",
            path: db_path.display().to_string(),
        });
    }
    get_connection(db_path)
}

pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(SCHEMA)?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Sequences
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct SequenceRepair {
    pub table: &'static str,
    pub before: Option<i64>,
    pub after: i64,
}

/// Current `sqlite_sequence` value, `None` when SQLite has not created one.
pub fn sequence_cursor(conn: &Connection, table: &str) -> Result<Option<i64>> {
    let seq = conn
        .query_row("SELECT seq FROM sqlite_sequence WHERE name = ?1", [table], |r| r.get(0))
        .optional()?;
    Ok(seq)
}

fn repair_one(conn: &Connection, table: &'static str) -> rusqlite::Result<SequenceRepair> {
    let before: Option<i64> = conn
        .query_row("SELECT seq FROM sqlite_sequence WHERE name = ?1", [table], |r| r.get(0))
        .optional()?;
    // `table` only ever comes from OWNED_TABLES.
    let max_id: i64 = conn.query_row(
        &format!("SELECT COALESCE(MAX(id), 0) FROM {table}"),
        [],
        |r| r.get(0),
    )?;
    let updated = conn.execute(
        "UPDATE sqlite_sequence SET seq = ?2 WHERE name = ?1",
        rusqlite::params![table, max_id],
    )?;
    if updated == 0 {
        conn.execute(
            "INSERT INTO sqlite_sequence (name, seq) VALUES (?1, ?2)",
            rusqlite::params![table, max_id],
        )?;
    }
    Ok(SequenceRepair {
        table,
        before,
        after: max_id,
    })
}

/// Align each owned table's auto-increment cursor with its highest id.
/// Only touches `sqlite_sequence`; row data is left alone.
pub fn repair_sequences(conn: &Connection) -> Result<Vec<SequenceRepair>> {
    OWNED_TABLES
        .iter()
        .map(|&table| repair_one(conn, table).map_err(|source| SyncError::SequenceRepair { table, source }))
        .collect()
}

// ---------------------------------------------------------------------------
// Upserts
// ---------------------------------------------------------------------------

/// Insert or update a template by `code` and hand back its id from the same
/// statement. `None` means the store wrote nothing for this row.
pub fn upsert_template(conn: &Connection, template: &LegacyTemplate, now: &str) -> Result<Option<i64>> {
    let mut stmt = conn.prepare_cached(
        "INSERT INTO bill_templates (code, name, academic_year, program_id, prodi_id, created_at, updated_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6) \
         ON CONFLICT(code) DO UPDATE SET \
            name = excluded.name, \
            academic_year = excluded.academic_year, \
            program_id = excluded.program_id, \
            prodi_id = excluded.prodi_id, \
            updated_at = excluded.updated_at \
         RETURNING id",
    )?;
    let id = stmt
        .query_row(
            rusqlite::params![
                template.code,
                template.name,
                template.year_text,
                template.program_id,
                template.study_program_id,
                now,
            ],
            |r| r.get(0),
        )
        .optional()?;
    Ok(id)
}

/// Insert or update an item by `(bill_template_id, name)`.
pub fn upsert_item(conn: &Connection, template_id: i64, item: &LegacyTemplateItem, now: &str) -> Result<i64> {
    let mut stmt = conn.prepare_cached(
        "INSERT INTO bill_template_items \
            (bill_template_id, name, additional_name, amount, ukt, \"BIPOTNamaID\", mulai_sesi, kali_sesi, created_at, updated_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9) \
         ON CONFLICT(bill_template_id, name) DO UPDATE SET \
            additional_name = excluded.additional_name, \
            amount = excluded.amount, \
            ukt = excluded.ukt, \
            \"BIPOTNamaID\" = excluded.\"BIPOTNamaID\", \
            mulai_sesi = excluded.mulai_sesi, \
            kali_sesi = excluded.kali_sesi, \
            updated_at = excluded.updated_at \
         RETURNING id",
    )?;
    let id = stmt.query_row(
        rusqlite::params![
            template_id,
            item.item_code,
            item.additional_label,
            item.amount,
            item.ukt,
            item.billing_name_ref,
            item.session_start,
            item.session_count,
            now,
        ],
        |r| r.get(0),
    )?;
    Ok(id)
}

// ---------------------------------------------------------------------------
// Run ledger
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct SyncRunRecord {
    pub started_at: String,
    pub finished_at: String,
    pub year_filter: String,
    pub code_filter: Option<String>,
    pub templates_synced: i64,
    pub items_synced: i64,
    pub skipped: i64,
    pub failed: i64,
}

pub fn record_sync_run(conn: &Connection, run: &SyncRunRecord) -> Result<i64> {
    conn.execute(
        "INSERT INTO sync_runs (started_at, finished_at, year_filter, code_filter, templates_synced, items_synced, skipped, failed) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        rusqlite::params![
            run.started_at,
            run.finished_at,
            run.year_filter,
            run.code_filter,
            run.templates_synced,
            run.items_synced,
            run.skipped,
            run.failed,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn last_sync_run(conn: &Connection) -> Result<Option<SyncRunRecord>> {
    let run = conn
        .query_row(
            "SELECT started_at, finished_at, year_filter, code_filter, templates_synced, items_synced, skipped, failed \
             FROM sync_runs ORDER BY id DESC LIMIT 1",
            [],
            |row| {
                Ok(SyncRunRecord {
                    started_at: row.get(0)?,
                    finished_at: row.get(1)?,
                    year_filter: row.get(2)?,
                    code_filter: row.get(3)?,
                    templates_synced: row.get(4)?,
                    items_synced: row.get(5)?,
                    skipped: row.get(6)?,
                    failed: row.get(7)?,
                })
            },
        )
        .optional()?;
    Ok(run)
}

// ---------------------------------------------------------------------------
// Queries
// ---------------------------------------------------------------------------

fn template_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<BillTemplate> {
    Ok(BillTemplate {
        id: row.get(0)?,
        code: row.get(1)?,
        name: row.get(2)?,
        academic_year: row.get(3)?,
        program_id: row.get(4)?,
        study_program_id: row.get(5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

pub fn find_template(conn: &Connection, code: &str) -> Result<Option<BillTemplate>> {
    let template = conn
        .query_row(
            "SELECT id, code, name, academic_year, program_id, prodi_id, created_at, updated_at \
             FROM bill_templates WHERE code = ?1",
            [code],
            template_from_row,
        )
        .optional()?;
    Ok(template)
}

/// Templates with their item counts, optionally for one academic year.
pub fn list_templates(conn: &Connection, academic_year: Option<&str>) -> Result<Vec<(BillTemplate, i64)>> {
    let mut stmt = conn.prepare(
        "SELECT t.id, t.code, t.name, t.academic_year, t.program_id, t.prodi_id, t.created_at, t.updated_at, \
                (SELECT count(*) FROM bill_template_items i WHERE i.bill_template_id = t.id) \
         FROM bill_templates t \
         WHERE ?1 IS NULL OR t.academic_year = ?1 \
         ORDER BY t.academic_year DESC, t.code",
    )?;
    let rows = stmt
        .query_map([academic_year], |row| Ok((template_from_row(row)?, row.get(8)?)))?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn template_items(conn: &Connection, template_id: i64) -> Result<Vec<BillTemplateItem>> {
    let mut stmt = conn.prepare(
        "SELECT id, name, additional_name, amount, ukt, \"BIPOTNamaID\", mulai_sesi, kali_sesi, created_at, updated_at \
         FROM bill_template_items WHERE bill_template_id = ?1 ORDER BY name",
    )?;
    let rows = stmt
        .query_map([template_id], |row| {
            Ok(BillTemplateItem {
                id: row.get(0)?,
                name: row.get(1)?,
                additional_label: row.get(2)?,
                amount: row.get(3)?,
                ukt: row.get(4)?,
                billing_name_ref: row.get(5)?,
                session_start: row.get(6)?,
                session_count: row.get(7)?,
                created_at: row.get(8)?,
                updated_at: row.get(9)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn count_rows(conn: &Connection) -> Result<(i64, i64)> {
    let templates: i64 = conn.query_row("SELECT count(*) FROM bill_templates", [], |r| r.get(0))?;
    let items: i64 = conn.query_row("SELECT count(*) FROM bill_template_items", [], |r| r.get(0))?;
    Ok((templates, items))
}
