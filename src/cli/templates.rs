use comfy_table::{Cell, CellAlignment, Table};

use crate::db::{find_template, list_templates, open_target, template_items};
use crate::error::{Result, SyncError};
use crate::fmt::rupiah;
use crate::settings::Settings;

pub fn list(settings: &Settings, year: Option<&str>) -> Result<()> {
    let conn = open_target(&settings.target_path())?;
    let rows = list_templates(&conn, year)?;

    let mut table = Table::new();
    table.set_header(vec!["ID", "Code", "Name", "Year", "Program", "Prodi", "Items", "Updated"]);
    for (t, items) in rows {
        table.add_row(vec![
            Cell::new(t.id),
            Cell::new(t.code),
            Cell::new(t.name),
            Cell::new(t.academic_year),
            Cell::new(t.program_id.unwrap_or_default()),
            Cell::new(t.study_program_id.unwrap_or_default()),
            Cell::new(items),
            Cell::new(t.updated_at),
        ]);
    }
    println!("Bill templates\n{table}");
    Ok(())
}

pub fn show(settings: &Settings, code: &str) -> Result<()> {
    let conn = open_target(&settings.target_path())?;
    let template = find_template(&conn, code)?.ok_or_else(|| SyncError::UnknownTemplate(code.to_string()))?;

    println!("[{}] {} ({})", template.code, template.name, template.academic_year);
    println!(
        "Program {} / Prodi {}",
        template.program_id.as_deref().unwrap_or("-"),
        template.study_program_id.as_deref().unwrap_or("-")
    );
    println!("Created {}, last synced {}", template.created_at, template.updated_at);

    let mut table = Table::new();
    table.set_header(vec!["ID", "Item", "Label", "UKT", "Amount", "BIPOTNamaID", "Sessions", "Created", "Updated"]);
    for item in template_items(&conn, template.id)? {
        let sessions = if item.session_count > 0 {
            format!("{}..{}", item.session_start, item.session_start + item.session_count - 1)
        } else {
            format!("{}+", item.session_start)
        };
        table.add_row(vec![
            Cell::new(item.id),
            Cell::new(item.name),
            Cell::new(item.additional_label.unwrap_or_default()),
            Cell::new(item.ukt.unwrap_or_default()),
            Cell::new(rupiah(item.amount)).set_alignment(CellAlignment::Right),
            Cell::new(item.billing_name_ref.unwrap_or_default()),
            Cell::new(sessions),
            Cell::new(item.created_at),
            Cell::new(item.updated_at),
        ]);
    }
    println!("{table}");
    Ok(())
}
