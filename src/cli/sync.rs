use colored::Colorize;
use comfy_table::{Cell, Table};

use crate::db::open_target;
use crate::error::Result;
use crate::legacy::open_legacy;
use crate::models::{AcademicYear, YearFilter};
use crate::settings::Settings;
use crate::sync::{run_sync, RowOutcome, SyncRequest, SyncSummary};

pub(crate) fn year_filter(settings: &Settings, tahun: Option<&str>) -> Result<YearFilter> {
    match tahun {
        Some(raw) => Ok(YearFilter::Exact(raw.parse::<AcademicYear>()?)),
        None => Ok(YearFilter::Since(settings.year_floor())),
    }
}

pub fn run(settings: &Settings, tahun: Option<&str>, code: Option<String>) -> Result<()> {
    let years = year_filter(settings, tahun)?;
    match years {
        YearFilter::Exact(year) => println!("Year filter: {year}"),
        YearFilter::Since(floor) => println!(
            "{}",
            format!("No year filter, syncing every year from {floor}.").yellow()
        ),
    }

    let legacy = open_legacy(&settings.legacy_path())?;
    let target = open_target(&settings.target_path())?;

    let request = SyncRequest { years, code };
    let summary = run_sync(&legacy, &target, &request, chrono::Utc::now)?;

    print_summary(&summary);
    Ok(())
}

fn outcome_label(outcome: &RowOutcome) -> (String, String) {
    match outcome {
        RowOutcome::Synced => ("synced".to_string(), String::new()),
        RowOutcome::SkippedMissingId => ("no id".yellow().to_string(), "template id could not be resolved".to_string()),
        RowOutcome::SkippedInvalid(reason) => ("invalid".yellow().to_string(), reason.clone()),
        RowOutcome::SkippedReadError(reason) => ("read error".red().to_string(), reason.clone()),
        RowOutcome::SkippedWriteError(reason) => ("write error".red().to_string(), reason.clone()),
    }
}

fn print_summary(summary: &SyncSummary) {
    if !summary.failures.is_empty() {
        let mut table = Table::new();
        table.set_header(vec!["Key", "Outcome", "Reason"]);
        for failure in &summary.failures {
            let (label, reason) = outcome_label(&failure.outcome);
            table.add_row(vec![Cell::new(&failure.key), Cell::new(label), Cell::new(reason)]);
        }
        println!("Rows not synced\n{table}");
    }

    let line = format!(
        "Sync finished: {} template(s), {} item(s) synced, {} skipped, {} failed.",
        summary.templates_synced,
        summary.items_synced,
        summary.skipped(),
        summary.failed()
    );
    if summary.failures.is_empty() {
        println!("{}", line.green());
    } else {
        println!("{}", line.yellow());
    }
}
