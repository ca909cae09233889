use comfy_table::{Cell, Table};

use crate::db::{open_target, repair_sequences};
use crate::error::Result;
use crate::settings::Settings;

pub fn run(settings: &Settings) -> Result<()> {
    let conn = open_target(&settings.target_path())?;
    let repairs = repair_sequences(&conn)?;

    let mut table = Table::new();
    table.set_header(vec!["Table", "Before", "After"]);
    for repair in repairs {
        table.add_row(vec![
            Cell::new(repair.table),
            Cell::new(repair.before.map(|s| s.to_string()).unwrap_or_else(|| "-".to_string())),
            Cell::new(repair.after),
        ]);
    }
    println!("Sequences\n{table}");
    Ok(())
}
