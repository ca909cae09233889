use chrono::{DateTime, Utc};
use rusqlite::Connection;
use tracing::{debug, info, warn};

use crate::db::{self, SequenceRepair, SyncRunRecord, TIMESTAMP_FORMAT};
use crate::error::Result;
use crate::legacy::{self, Rejected};
use crate::models::{LegacyTemplate, YearFilter};

/// What happened to one SIMAK row during a run.
#[derive(Debug, Clone, PartialEq)]
pub enum RowOutcome {
    Synced,
    /// The template upsert wrote nothing, so there is no id to attach items to.
    SkippedMissingId,
    /// The SIMAK row could not be converted.
    SkippedInvalid(String),
    /// SIMAK could not be read for this row's dependents.
    SkippedReadError(String),
    SkippedWriteError(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct RowFailure {
    /// `code` for templates, `code/item` for items.
    pub key: String,
    pub outcome: RowOutcome,
}

#[derive(Debug, Default)]
pub struct SyncSummary {
    pub repairs: Vec<SequenceRepair>,
    pub templates_synced: usize,
    pub items_synced: usize,
    pub failures: Vec<RowFailure>,
}

impl SyncSummary {
    /// Rows left alone because of what SIMAK held.
    pub fn skipped(&self) -> usize {
        self.failures
            .iter()
            .filter(|f| matches!(f.outcome, RowOutcome::SkippedMissingId | RowOutcome::SkippedInvalid(_)))
            .count()
    }

    /// Rows that hit a store error.
    pub fn failed(&self) -> usize {
        self.failures.len() - self.skipped()
    }

    fn fail(&mut self, key: String, outcome: RowOutcome) {
        self.failures.push(RowFailure { key, outcome });
    }
}

#[derive(Debug, Clone, Default)]
pub struct SyncRequest {
    pub years: YearFilter,
    /// Restrict the run to one template code.
    pub code: Option<String>,
}

/// Mirror eligible SIMAK billing templates into the billing schema.
///
/// Sequence repair runs first and any error there aborts the run before a
/// single row is written. After that every template and item is handled on
/// its own: a row that cannot be written is recorded in the summary and the
/// run moves on.
///
/// `clock` is read once when the run starts (the stamp written on every row)
/// and once when it finishes.
pub fn run_sync<C>(legacy_conn: &Connection, target: &Connection, request: &SyncRequest, clock: C) -> Result<SyncSummary>
where
    C: Fn() -> DateTime<Utc>,
{
    let stamp = clock().format(TIMESTAMP_FORMAT).to_string();
    let mut summary = SyncSummary {
        repairs: db::repair_sequences(target)?,
        ..SyncSummary::default()
    };
    for repair in &summary.repairs {
        debug!(table = repair.table, before = ?repair.before, after = repair.after, "sequence aligned");
    }

    let batch = legacy::fetch_templates(legacy_conn, request.years, request.code.as_deref())?;
    info!(
        templates = batch.templates.len(),
        filter = %request.years.describe(),
        "starting bipot -> bill_templates sync"
    );

    for Rejected { key, reason } in batch.rejected {
        warn!(code = %key, %reason, "skipping unreadable SIMAK template");
        summary.fail(key, RowOutcome::SkippedInvalid(reason));
    }

    for template in &batch.templates {
        let outcome = sync_template(legacy_conn, target, template, &stamp, &mut summary);
        if outcome != RowOutcome::Synced {
            summary.fail(template.code.clone(), outcome);
        }
    }

    info!(
        templates = summary.templates_synced,
        items = summary.items_synced,
        skipped = summary.skipped(),
        failed = summary.failed(),
        "sync finished"
    );

    let run = SyncRunRecord {
        started_at: stamp,
        finished_at: clock().format(TIMESTAMP_FORMAT).to_string(),
        year_filter: request.years.describe(),
        code_filter: request.code.clone(),
        templates_synced: summary.templates_synced as i64,
        items_synced: summary.items_synced as i64,
        skipped: summary.skipped() as i64,
        failed: summary.failed() as i64,
    };
    if let Err(e) = db::record_sync_run(target, &run) {
        warn!(error = %e, "could not record sync run");
    }

    Ok(summary)
}

/// Upsert one template and mirror its items. Item problems go straight into
/// `summary`; the returned outcome is the template's own.
fn sync_template(
    legacy_conn: &Connection,
    target: &Connection,
    template: &LegacyTemplate,
    stamp: &str,
    summary: &mut SyncSummary,
) -> RowOutcome {
    let code = template.code.as_str();
    let template_id = match db::upsert_template(target, template, stamp) {
        Ok(Some(id)) => id,
        Ok(None) => {
            warn!(code, "could not resolve bill_template id; skipping its items");
            return RowOutcome::SkippedMissingId;
        }
        Err(e) => {
            warn!(code, error = %e, "template upsert failed; skipping its items");
            return RowOutcome::SkippedWriteError(e.to_string());
        }
    };
    summary.templates_synced += 1;
    info!(code, name = %template.name, id = template_id, "template synced");

    let items = match legacy::fetch_items(legacy_conn, code) {
        Ok(items) => items,
        Err(e) => {
            warn!(code, error = %e, "could not read bipot2 rows");
            return RowOutcome::SkippedReadError(e.to_string());
        }
    };

    let mut mirrored = 0usize;
    for item in items {
        let item = match item {
            Ok(item) => item,
            Err(Rejected { key, reason }) => {
                warn!(item = %key, %reason, "skipping unreadable SIMAK item");
                summary.fail(key, RowOutcome::SkippedInvalid(reason));
                continue;
            }
        };
        match db::upsert_item(target, template_id, &item, stamp) {
            Ok(id) => {
                debug!(code, item = %item.item_code, id, "item synced");
                mirrored += 1;
            }
            Err(e) => {
                let key = format!("{}/{}", item.parent_code, item.item_code);
                warn!(item = %key, error = %e, "item upsert failed");
                summary.fail(key, RowOutcome::SkippedWriteError(e.to_string()));
            }
        }
    }
    summary.items_synced += mirrored;
    info!(code, items = mirrored, "items synced");
    RowOutcome::Synced
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::db::fixtures::target_db;
    use crate::db::{count_rows, find_template, last_sync_run, template_items};
    use crate::error::SyncError;
    use crate::legacy::fixtures::{add_bipot, add_bipot2, legacy_db};
    use crate::models::AcademicYear;

    fn at(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, day, 8, 0, 0).unwrap()
    }

    fn fixed(day: u32) -> impl Fn() -> DateTime<Utc> {
        move || at(day)
    }

    fn all_years() -> SyncRequest {
        SyncRequest::default()
    }

    #[test]
    fn test_end_to_end_single_template() {
        let (_l, legacy) = legacy_db();
        let (_t, target) = target_db();
        add_bipot(&legacy, "T1", "SPP Ganjil", "2023", "N");
        add_bipot2(&legacy, "T1", "I1", "2.000.000", 2000000, "N");

        let summary = run_sync(&legacy, &target, &all_years(), fixed(1)).unwrap();
        assert_eq!(summary.templates_synced, 1);
        assert_eq!(summary.items_synced, 1);
        assert!(summary.failures.is_empty());

        let template = find_template(&target, "T1").unwrap().unwrap();
        assert_eq!(template.name, "SPP Ganjil");
        assert_eq!(template.academic_year, "2023");
        assert_eq!(template.program_id.as_deref(), Some("REG"));
        assert_eq!(template.study_program_id.as_deref(), Some("55201"));

        let items = template_items(&target, template.id).unwrap();
        assert_eq!(items.len(), 1);
        let parent: i64 = target
            .query_row("SELECT bill_template_id FROM bill_template_items WHERE id = ?1", [items[0].id], |r| r.get(0))
            .unwrap();
        assert_eq!(parent, template.id);
        assert_eq!(items[0].name, "I1");
        assert_eq!(items[0].ukt.as_deref(), Some("2000000"));
        assert_eq!(items[0].additional_label.as_deref(), Some(""));
        assert_eq!(items[0].session_start, 1);
        assert_eq!(items[0].session_count, 6);
    }

    #[test]
    fn test_rerun_is_idempotent() {
        let (_l, legacy) = legacy_db();
        let (_t, target) = target_db();
        add_bipot(&legacy, "T1", "SPP Ganjil", "2023", "N");
        add_bipot(&legacy, "T2", "SPP Genap", "2023", "N");
        add_bipot2(&legacy, "T1", "I1", "1.000.000", 1000000, "N");
        add_bipot2(&legacy, "T1", "I2", "2.000.000", 2000000, "N");
        add_bipot2(&legacy, "T2", "I1", "1.000.000", 1000000, "N");

        run_sync(&legacy, &target, &all_years(), fixed(1)).unwrap();
        let first = find_template(&target, "T1").unwrap().unwrap();
        let counts = count_rows(&target).unwrap();

        run_sync(&legacy, &target, &all_years(), fixed(2)).unwrap();
        let second = find_template(&target, "T1").unwrap().unwrap();

        assert_eq!(count_rows(&target).unwrap(), counts);
        assert_eq!(counts, (2, 3));
        assert_eq!(first.id, second.id);
        assert_eq!(second.created_at, first.created_at);
        assert_ne!(second.updated_at, first.updated_at);
        assert_eq!(second.updated_at, "2025-01-02 08:00:00");
    }

    #[test]
    fn test_rerun_picks_up_legacy_changes() {
        let (_l, legacy) = legacy_db();
        let (_t, target) = target_db();
        add_bipot(&legacy, "T1", "SPP", "2023", "N");
        add_bipot2(&legacy, "T1", "I1", "1.000.000", 1000000, "N");
        run_sync(&legacy, &target, &all_years(), fixed(1)).unwrap();

        legacy.execute("UPDATE bipot SET Nama = 'SPP Revisi' WHERE BIPOTID = 'T1'", []).unwrap();
        legacy.execute("UPDATE bipot2 SET Jumlah = 1250000, UKT = '1.250.000' WHERE BIPOT2ID = 'I1'", []).unwrap();
        run_sync(&legacy, &target, &all_years(), fixed(2)).unwrap();

        let template = find_template(&target, "T1").unwrap().unwrap();
        assert_eq!(template.name, "SPP Revisi");
        let items = template_items(&target, template.id).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].amount, 1250000);
        assert_eq!(items[0].ukt.as_deref(), Some("1250000"));
    }

    #[test]
    fn test_archived_rows_are_not_synced() {
        let (_l, legacy) = legacy_db();
        let (_t, target) = target_db();
        add_bipot(&legacy, "T1", "Live", "2023", "N");
        add_bipot(&legacy, "T2", "Archived", "2023", "Y");
        add_bipot2(&legacy, "T1", "I1", "1", 1, "N");
        add_bipot2(&legacy, "T1", "I2", "2", 2, "Y");
        add_bipot2(&legacy, "T2", "I1", "1", 1, "N");

        let summary = run_sync(&legacy, &target, &all_years(), fixed(1)).unwrap();
        assert_eq!(summary.templates_synced, 1);
        assert_eq!(summary.items_synced, 1);
        assert!(find_template(&target, "T2").unwrap().is_none());
    }

    #[test]
    fn test_default_year_range() {
        let (_l, legacy) = legacy_db();
        let (_t, target) = target_db();
        add_bipot(&legacy, "Y2017", "Old", "2017", "N");
        add_bipot(&legacy, "Y2018", "Floor", "2018", "N");
        add_bipot(&legacy, "Y2024", "New", "2024", "N");

        run_sync(&legacy, &target, &all_years(), fixed(1)).unwrap();
        assert!(find_template(&target, "Y2017").unwrap().is_none());
        assert!(find_template(&target, "Y2018").unwrap().is_some());
        assert!(find_template(&target, "Y2024").unwrap().is_some());
    }

    #[test]
    fn test_exact_year_filter() {
        let (_l, legacy) = legacy_db();
        let (_t, target) = target_db();
        add_bipot(&legacy, "Y2021", "Older", "2021", "N");
        add_bipot(&legacy, "Y2022", "Wanted", "2022", "N");

        let request = SyncRequest {
            years: YearFilter::Exact(AcademicYear::new(2022)),
            code: None,
        };
        let summary = run_sync(&legacy, &target, &request, fixed(1)).unwrap();
        assert_eq!(summary.templates_synced, 1);
        assert!(find_template(&target, "Y2021").unwrap().is_none());
        assert!(find_template(&target, "Y2022").unwrap().is_some());
    }

    #[test]
    fn test_single_code_rerun() {
        let (_l, legacy) = legacy_db();
        let (_t, target) = target_db();
        add_bipot(&legacy, "T1", "One", "2023", "N");
        add_bipot(&legacy, "T2", "Two", "2023", "N");

        let request = SyncRequest {
            code: Some("T2".to_string()),
            ..SyncRequest::default()
        };
        let summary = run_sync(&legacy, &target, &request, fixed(1)).unwrap();
        assert_eq!(summary.templates_synced, 1);
        assert!(find_template(&target, "T1").unwrap().is_none());
        assert!(find_template(&target, "T2").unwrap().is_some());
        assert_eq!(last_sync_run(&target).unwrap().unwrap().code_filter.as_deref(), Some("T2"));
    }

    #[test]
    fn test_unresolved_id_skips_items_and_continues() {
        let (_l, legacy) = legacy_db();
        let (_t, target) = target_db();
        // Swallow the insert for one code so the upsert hands back no id.
        target
            .execute_batch(
                "CREATE TRIGGER drop_ghost BEFORE INSERT ON bill_templates \
                 WHEN NEW.code = 'GHOST' BEGIN SELECT RAISE(IGNORE); END;",
            )
            .unwrap();
        add_bipot(&legacy, "GHOST", "Vanishing", "2023", "N");
        add_bipot(&legacy, "T1", "Real", "2023", "N");
        add_bipot2(&legacy, "GHOST", "I1", "1.000", 1000, "N");
        add_bipot2(&legacy, "GHOST", "I2", "2.000", 2000, "N");
        add_bipot2(&legacy, "T1", "I1", "1.000", 1000, "N");

        let summary = run_sync(&legacy, &target, &all_years(), fixed(1)).unwrap();
        assert_eq!(summary.templates_synced, 1);
        assert_eq!(summary.items_synced, 1);
        assert_eq!(
            summary.failures,
            vec![RowFailure {
                key: "GHOST".to_string(),
                outcome: RowOutcome::SkippedMissingId,
            }]
        );
        assert_eq!(summary.skipped(), 1);
        assert_eq!(count_rows(&target).unwrap(), (1, 1));
    }

    #[test]
    fn test_item_write_error_does_not_stop_siblings() {
        let (_l, legacy) = legacy_db();
        let (_t, target) = target_db();
        target
            .execute_batch(
                "CREATE TRIGGER reject_bad BEFORE INSERT ON bill_template_items \
                 WHEN NEW.name = 'BAD' BEGIN SELECT RAISE(ABORT, 'rejected'); END;",
            )
            .unwrap();
        add_bipot(&legacy, "T1", "One", "2023", "N");
        add_bipot(&legacy, "T2", "Two", "2023", "N");
        add_bipot2(&legacy, "T1", "A", "1", 1, "N");
        add_bipot2(&legacy, "T1", "BAD", "2", 2, "N");
        add_bipot2(&legacy, "T1", "C", "3", 3, "N");
        add_bipot2(&legacy, "T2", "A", "1", 1, "N");

        let summary = run_sync(&legacy, &target, &all_years(), fixed(1)).unwrap();
        assert_eq!(summary.templates_synced, 2);
        assert_eq!(summary.items_synced, 3);
        assert_eq!(summary.failures.len(), 1);
        assert_eq!(summary.failures[0].key, "T1/BAD");
        assert!(matches!(summary.failures[0].outcome, RowOutcome::SkippedWriteError(_)));
        assert_eq!(summary.failed(), 1);
    }

    #[test]
    fn test_padded_code_keeps_its_items() {
        let (_l, legacy) = legacy_db();
        let (_t, target) = target_db();
        add_bipot(&legacy, "T1 ", "Padded", "2023", "N");
        add_bipot2(&legacy, "T1 ", "I1", "1.000", 1000, "N");

        let summary = run_sync(&legacy, &target, &all_years(), fixed(1)).unwrap();
        assert_eq!(summary.templates_synced, 1);
        assert_eq!(summary.items_synced, 1);
        assert!(summary.failures.is_empty());

        assert!(find_template(&target, "T1").unwrap().is_none());
        let template = find_template(&target, "T1 ").unwrap().unwrap();
        assert_eq!(template_items(&target, template.id).unwrap().len(), 1);
    }

    #[test]
    fn test_padded_and_plain_codes_stay_apart() {
        let (_l, legacy) = legacy_db();
        let (_t, target) = target_db();
        add_bipot(&legacy, "T1", "Plain", "2023", "N");
        add_bipot(&legacy, "T1 ", "Padded", "2023", "N");
        add_bipot2(&legacy, "T1", "I1", "1.000", 1000, "N");

        let summary = run_sync(&legacy, &target, &all_years(), fixed(1)).unwrap();
        assert_eq!(summary.templates_synced, 2);
        assert_eq!(summary.items_synced, 1);
        assert_eq!(count_rows(&target).unwrap(), (2, 1));

        let plain = find_template(&target, "T1").unwrap().unwrap();
        assert_eq!(plain.name, "Plain");
        assert_eq!(template_items(&target, plain.id).unwrap().len(), 1);
        let padded = find_template(&target, "T1 ").unwrap().unwrap();
        assert_eq!(padded.name, "Padded");
        assert!(template_items(&target, padded.id).unwrap().is_empty());
    }

    #[test]
    fn test_template_write_error_skips_its_items() {
        let (_l, legacy) = legacy_db();
        let (_t, target) = target_db();
        target
            .execute_batch(
                "CREATE TRIGGER reject_bad_template BEFORE INSERT ON bill_templates \
                 WHEN NEW.code = 'BAD' BEGIN SELECT RAISE(ABORT, 'rejected'); END;",
            )
            .unwrap();
        add_bipot(&legacy, "BAD", "Rejected", "2023", "N");
        add_bipot(&legacy, "T1", "Fine", "2023", "N");
        add_bipot2(&legacy, "BAD", "I1", "1", 1, "N");
        add_bipot2(&legacy, "T1", "I1", "1", 1, "N");

        let summary = run_sync(&legacy, &target, &all_years(), fixed(1)).unwrap();
        assert_eq!(summary.templates_synced, 1);
        assert_eq!(summary.items_synced, 1);
        assert_eq!(summary.failures.len(), 1);
        assert_eq!(summary.failures[0].key, "BAD");
        assert!(matches!(summary.failures[0].outcome, RowOutcome::SkippedWriteError(_)));
        assert_eq!(summary.failed(), 1);
        assert_eq!(count_rows(&target).unwrap(), (1, 1));
    }

    #[test]
    fn test_item_read_error_is_reported_per_template() {
        let (_l, legacy) = legacy_db();
        let (_t, target) = target_db();
        add_bipot(&legacy, "T1", "One", "2023", "N");
        add_bipot(&legacy, "T2", "Two", "2023", "N");
        legacy.execute_batch("DROP TABLE bipot2;").unwrap();

        let summary = run_sync(&legacy, &target, &all_years(), fixed(1)).unwrap();
        // the headers themselves are written before their items are read
        assert_eq!(summary.templates_synced, 2);
        assert_eq!(summary.items_synced, 0);
        let keys: Vec<&str> = summary.failures.iter().map(|f| f.key.as_str()).collect();
        assert_eq!(keys, vec!["T1", "T2"]);
        assert!(summary
            .failures
            .iter()
            .all(|f| matches!(f.outcome, RowOutcome::SkippedReadError(_))));
        assert_eq!(summary.failed(), 2);
    }

    #[test]
    fn test_unreadable_rows_are_reported() {
        let (_l, legacy) = legacy_db();
        let (_t, target) = target_db();
        add_bipot(&legacy, "T1", "One", "2023", "N");
        add_bipot(&legacy, "T9", "Broken", "dua ribu", "N");
        legacy
            .execute(
                "INSERT INTO bipot2 (BIPOT2ID, BIPOTID, Jumlah, UKT, NA) VALUES ('X', 'T1', 'banyak', '1', 'N')",
                [],
            )
            .unwrap();
        add_bipot2(&legacy, "T1", "I1", "1", 1, "N");

        let summary = run_sync(&legacy, &target, &all_years(), fixed(1)).unwrap();
        assert_eq!(summary.templates_synced, 1);
        assert_eq!(summary.items_synced, 1);
        let keys: Vec<&str> = summary.failures.iter().map(|f| f.key.as_str()).collect();
        assert_eq!(keys, vec!["T9", "T1/X"]);
        assert_eq!(summary.skipped(), 2);
        assert_eq!(summary.failed(), 0);
    }

    #[test]
    fn test_sequence_repaired_before_inserts() {
        let (_l, legacy) = legacy_db();
        let (_t, target) = target_db();
        target
            .execute(
                "INSERT INTO bill_templates (id, code, name, academic_year, created_at, updated_at) \
                 VALUES (100, 'MANUAL', 'Manual', '2020', 'x', 'x')",
                [],
            )
            .unwrap();
        target.execute("UPDATE sqlite_sequence SET seq = 5 WHERE name = 'bill_templates'", []).unwrap();
        add_bipot(&legacy, "T1", "New", "2023", "N");

        let summary = run_sync(&legacy, &target, &all_years(), fixed(1)).unwrap();
        assert_eq!(summary.repairs[0].after, 100);
        let template = find_template(&target, "T1").unwrap().unwrap();
        assert!(template.id > 100, "expected id > 100, got {}", template.id);
    }

    #[test]
    fn test_repair_failure_aborts_run() {
        let (_l, legacy) = legacy_db();
        let (_t, target) = target_db();
        add_bipot(&legacy, "T1", "One", "2023", "N");
        target.execute_batch("PRAGMA query_only = ON;").unwrap();

        let err = run_sync(&legacy, &target, &all_years(), fixed(1)).unwrap_err();
        assert!(matches!(err, SyncError::SequenceRepair { .. }));

        target.execute_batch("PRAGMA query_only = OFF;").unwrap();
        assert_eq!(count_rows(&target).unwrap(), (0, 0));
        assert!(last_sync_run(&target).unwrap().is_none());
    }

    #[test]
    fn test_run_is_recorded() {
        let (_l, legacy) = legacy_db();
        let (_t, target) = target_db();
        add_bipot(&legacy, "T1", "One", "2023", "N");
        add_bipot2(&legacy, "T1", "I1", "1", 1, "N");
        let ticks = std::cell::Cell::new(0);
        let clock = || {
            ticks.set(ticks.get() + 1);
            at(1) + chrono::Duration::seconds(5 * (ticks.get() - 1))
        };
        run_sync(&legacy, &target, &all_years(), clock).unwrap();

        let run = last_sync_run(&target).unwrap().unwrap();
        assert_eq!(run.started_at, "2025-01-01 08:00:00");
        assert_eq!(run.finished_at, "2025-01-01 08:00:05");
        assert_eq!(run.year_filter, ">=2018");
        assert_eq!(run.templates_synced, 1);
        assert_eq!(run.items_synced, 1);
        assert_eq!(run.skipped, 0);
    }
}
