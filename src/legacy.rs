use std::path::Path;

use rusqlite::types::ValueRef;
use rusqlite::{Connection, OpenFlags, Row};

use crate::error::{Result, SyncError};
use crate::models::{AcademicYear, LegacyTemplate, LegacyTemplateItem, RecordStatus, YearFilter};

/// SIMAK tables as they appear in the snapshot. Only used to build fixtures
/// and demo snapshots; the job itself never writes to SIMAK.
pub const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS bipot (
    BIPOTID TEXT PRIMARY KEY,
    Nama TEXT,
    Tahun TEXT,
    ProgramID TEXT,
    ProdiID TEXT,
    NA TEXT DEFAULT 'N'
);

CREATE TABLE IF NOT EXISTS bipot2 (
    BIPOT2ID TEXT NOT NULL,
    BIPOTID TEXT NOT NULL,
    TambahanNama TEXT,
    Jumlah NUMERIC DEFAULT 0,
    UKT TEXT,
    BIPOTNamaID TEXT,
    MulaiSesi INTEGER DEFAULT 0,
    KaliSesi INTEGER DEFAULT 0,
    NA TEXT DEFAULT 'N'
);
";

// ---------------------------------------------------------------------------
// Field normalization
// ---------------------------------------------------------------------------

/// Strip every `.` from a SIMAK UKT code ("1.500.000" -> "1500000").
/// Everything else, leading zeros included, is kept as-is.
pub fn normalize_ukt(raw: &str) -> String {
    raw.replace('.', "")
}

/// Opaque SIMAK identifiers arrive as integers or text depending on the table
/// vintage; both are carried over as text.
fn opaque_text(value: ValueRef<'_>) -> Option<String> {
    match value {
        ValueRef::Null => None,
        ValueRef::Integer(i) => Some(i.to_string()),
        ValueRef::Real(f) => Some(f.to_string()),
        ValueRef::Text(t) => Some(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => Some(String::from_utf8_lossy(b).into_owned()),
    }
}

/// Whole rupiah. NULL counts as zero, the billing schema's column default.
fn whole_number(value: ValueRef<'_>) -> Option<i64> {
    match value {
        ValueRef::Null => Some(0),
        ValueRef::Integer(i) => Some(i),
        ValueRef::Real(f) if f.is_finite() => Some(f.round() as i64),
        ValueRef::Text(t) => {
            let s = std::str::from_utf8(t).ok()?.trim();
            if s.is_empty() {
                return Some(0);
            }
            s.parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().filter(|f| f.is_finite()).map(|f| f.round() as i64))
        }
        _ => None,
    }
}

/// A SIMAK row that could not be converted. `key` is the business key as far
/// as it could be read.
#[derive(Debug, Clone, PartialEq)]
pub struct Rejected {
    pub key: String,
    pub reason: String,
}

// ---------------------------------------------------------------------------
// Connection
// ---------------------------------------------------------------------------

/// Open the SIMAK snapshot read-only.
pub fn open_legacy(path: &Path) -> Result<Connection> {
    if !path.exists() {
        return Err(SyncError::MissingStore {
            role: "SIMAK",
            path: path.display().to_string(),
        });
    }
    let conn = Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )?;
    Ok(conn)
}

// ---------------------------------------------------------------------------
// bipot
// ---------------------------------------------------------------------------

fn template_from_row(row: &Row<'_>) -> rusqlite::Result<std::result::Result<LegacyTemplate, Rejected>> {
    let code = opaque_text(row.get_ref(0)?);
    let Some(code) = code.filter(|c| !c.trim().is_empty()) else {
        return Ok(Err(Rejected {
            key: "(blank BIPOTID)".to_string(),
            reason: "template has no code".to_string(),
        }));
    };
    let year_text = opaque_text(row.get_ref(2)?).unwrap_or_default();
    let academic_year = match year_text.parse::<AcademicYear>() {
        Ok(year) => year,
        Err(e) => {
            return Ok(Err(Rejected {
                key: code,
                reason: e.to_string(),
            }))
        }
    };
    let flag = opaque_text(row.get_ref(5)?);
    Ok(Ok(LegacyTemplate {
        code,
        name: opaque_text(row.get_ref(1)?).unwrap_or_default(),
        year_text,
        academic_year,
        program_id: opaque_text(row.get_ref(3)?),
        study_program_id: opaque_text(row.get_ref(4)?),
        status: RecordStatus::from_flag(flag.as_deref()),
    }))
}

/// Headers selected for one run.
#[derive(Debug, Default)]
pub struct TemplateBatch {
    pub templates: Vec<LegacyTemplate>,
    pub rejected: Vec<Rejected>,
}

/// Read the live SIMAK headers that pass `filter`, optionally narrowed to a
/// single code. Rows whose year cannot be read are returned as rejections
/// when the run could have selected them: a `Since` sweep or a `--code` run.
/// An exact-year run never would, so it leaves them out.
pub fn fetch_templates(conn: &Connection, filter: YearFilter, code: Option<&str>) -> Result<TemplateBatch> {
    let mut sql = String::from(
        "SELECT BIPOTID, Nama, Tahun, ProgramID, ProdiID, NA FROM bipot WHERE NA = ?1",
    );
    if code.is_some() {
        sql.push_str(" AND BIPOTID = ?2");
    }
    sql.push_str(" ORDER BY BIPOTID");

    let mut stmt = conn.prepare(&sql)?;
    let rows: Vec<std::result::Result<LegacyTemplate, Rejected>> = match code {
        Some(code) => stmt
            .query_map(rusqlite::params![RecordStatus::ACTIVE_FLAG, code], template_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?,
        None => stmt
            .query_map([RecordStatus::ACTIVE_FLAG], template_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?,
    };

    let mut batch = TemplateBatch::default();
    for row in rows {
        match row {
            Ok(t) if t.status.is_active() && filter.matches(t.academic_year) => batch.templates.push(t),
            Ok(_) => {}
            Err(rejected) if code.is_some() || matches!(filter, YearFilter::Since(_)) => {
                batch.rejected.push(rejected)
            }
            Err(_) => {}
        }
    }
    Ok(batch)
}

// ---------------------------------------------------------------------------
// bipot2
// ---------------------------------------------------------------------------

fn item_from_row(row: &Row<'_>) -> rusqlite::Result<std::result::Result<LegacyTemplateItem, Rejected>> {
    let parent_code: String = opaque_text(row.get_ref(1)?).unwrap_or_default();
    let item_code = opaque_text(row.get_ref(0)?);
    let Some(item_code) = item_code.filter(|c| !c.trim().is_empty()) else {
        return Ok(Err(Rejected {
            key: format!("{parent_code}/(blank BIPOT2ID)"),
            reason: "item has no code".to_string(),
        }));
    };
    let key = format!("{parent_code}/{item_code}");

    let Some(amount) = whole_number(row.get_ref(3)?) else {
        return Ok(Err(Rejected {
            key,
            reason: "Jumlah is not a number".to_string(),
        }));
    };
    let Some(session_start) = whole_number(row.get_ref(6)?) else {
        return Ok(Err(Rejected {
            key,
            reason: "MulaiSesi is not a number".to_string(),
        }));
    };
    let Some(session_count) = whole_number(row.get_ref(7)?) else {
        return Ok(Err(Rejected {
            key,
            reason: "KaliSesi is not a number".to_string(),
        }));
    };

    let flag = opaque_text(row.get_ref(8)?);
    Ok(Ok(LegacyTemplateItem {
        parent_code,
        item_code,
        additional_label: opaque_text(row.get_ref(2)?),
        amount,
        ukt: opaque_text(row.get_ref(4)?).map(|u| normalize_ukt(&u)),
        billing_name_ref: opaque_text(row.get_ref(5)?),
        session_start,
        session_count,
        status: RecordStatus::from_flag(flag.as_deref()),
    }))
}

/// Live line items of one SIMAK header, converted row by row.
pub fn fetch_items(
    conn: &Connection,
    parent_code: &str,
) -> Result<Vec<std::result::Result<LegacyTemplateItem, Rejected>>> {
    let mut stmt = conn.prepare_cached(
        "SELECT BIPOT2ID, BIPOTID, TambahanNama, Jumlah, UKT, BIPOTNamaID, MulaiSesi, KaliSesi, NA \
         FROM bipot2 WHERE BIPOTID = ?1 AND NA = ?2 ORDER BY BIPOT2ID",
    )?;
    let rows = stmt
        .query_map(rusqlite::params![parent_code, RecordStatus::ACTIVE_FLAG], item_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows
        .into_iter()
        .filter(|r| r.as_ref().map_or(true, |item| item.status.is_active()))
        .collect())
}
