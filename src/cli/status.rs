use crate::db::{count_rows, get_connection, last_sync_run, sequence_cursor, OWNED_TABLES};
use crate::error::Result;
use crate::settings::Settings;

pub fn run(settings: &Settings) -> Result<()> {
    let legacy_path = settings.legacy_path();
    let target_path = settings.target_path();

    println!("SIMAK:        {}{}", legacy_path.display(), if legacy_path.exists() { "" } else { " (missing)" });
    println!("Billing DB:   {}", target_path.display());
    println!("Year floor:   {}", settings.year_floor());

    if !target_path.exists() {
        println!();
        println!("Billing database not found. Run `simak-sync init` to set up.");
        return Ok(());
    }

    let conn = get_connection(&target_path)?;
    let (templates, items) = count_rows(&conn)?;
    println!();
    println!("Templates:    {templates}");
    println!("Items:        {items}");
    for table in OWNED_TABLES {
        let cursor = sequence_cursor(&conn, table)?;
        println!(
            "Sequence {table}: {}",
            cursor.map(|c| c.to_string()).unwrap_or_else(|| "(unset)".to_string())
        );
    }

    println!();
    match last_sync_run(&conn)? {
        Some(run) => {
            let scope = match &run.code_filter {
                Some(code) => format!("{} (code {code})", run.year_filter),
                None => run.year_filter.clone(),
            };
            println!("Last sync:    {} .. {}  [{scope}]", run.started_at, run.finished_at);
            println!(
                "              {} template(s), {} item(s), {} skipped, {} failed",
                run.templates_synced, run.items_synced, run.skipped, run.failed
            );
        }
        None => println!("Last sync:    never"),
    }
    Ok(())
}
