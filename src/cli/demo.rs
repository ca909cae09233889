use std::path::PathBuf;

use rusqlite::Connection;

use crate::error::{Result, SyncError};
use crate::legacy::SCHEMA;
use crate::settings::{expand_path, Settings};

struct DemoBipot {
    code: &'static str,
    name: &'static str,
    year: &'static str,
    program: &'static str,
    prodi: &'static str,
    na: &'static str,
}

/// Headers across the year floor, plus one archived template.
const BIPOT: &[DemoBipot] = &[
    DemoBipot { code: "S1REG17", name: "SPP Reguler 2017", year: "2017", program: "REG", prodi: "55201", na: "N" },
    DemoBipot { code: "S1REG22", name: "SPP Reguler 2022", year: "2022", program: "REG", prodi: "55201", na: "N" },
    DemoBipot { code: "S1REG23", name: "SPP Ganjil 2023", year: "2023", program: "REG", prodi: "55201", na: "N" },
    DemoBipot { code: "S1KAR23", name: "SPP Karyawan 2023", year: "2023", program: "KAR", prodi: "61201", na: "N" },
    DemoBipot { code: "S2REG24", name: "SPP Pascasarjana 2024", year: "2024", program: "REG", prodi: "61101", na: "N" },
    DemoBipot { code: "S1OLD23", name: "SPP Lama (arsip)", year: "2023", program: "REG", prodi: "55201", na: "Y" },
];

struct DemoBipot2 {
    item: &'static str,
    parent: &'static str,
    label: &'static str,
    amount: i64,
    ukt: &'static str,
    name_ref: &'static str,
    start: i64,
    count: i64,
    na: &'static str,
}

/// UKT bands use SIMAK's dotted notation; one item per template is archived.
const BIPOT2: &[DemoBipot2] = &[
    DemoBipot2 { item: "UKT1", parent: "S1REG22", label: "", amount: 500000, ukt: "500.000", name_ref: "0", start: 1, count: 8, na: "N" },
    DemoBipot2 { item: "UKT2", parent: "S1REG22", label: "", amount: 1000000, ukt: "1.000.000", name_ref: "0", start: 1, count: 8, na: "N" },
    DemoBipot2 { item: "UKT1", parent: "S1REG23", label: "", amount: 1500000, ukt: "1.500.000", name_ref: "0", start: 1, count: 6, na: "N" },
    DemoBipot2 { item: "UKT2", parent: "S1REG23", label: "", amount: 2000000, ukt: "2.000.000", name_ref: "0", start: 1, count: 6, na: "N" },
    DemoBipot2 { item: "UKT3", parent: "S1REG23", label: "", amount: 2500000, ukt: "2.500.000", name_ref: "0", start: 1, count: 6, na: "N" },
    DemoBipot2 { item: "PRAK", parent: "S1REG23", label: "Praktikum", amount: 350000, ukt: "1.500.000", name_ref: "12", start: 3, count: 2, na: "N" },
    DemoBipot2 { item: "WISUDA", parent: "S1REG23", label: "Wisuda", amount: 750000, ukt: "1.500.000", name_ref: "14", start: 8, count: 0, na: "Y" },
    DemoBipot2 { item: "UKT1", parent: "S1KAR23", label: "", amount: 3000000, ukt: "3.000.000", name_ref: "0", start: 1, count: 8, na: "N" },
    DemoBipot2 { item: "SPP", parent: "S2REG24", label: "Semester", amount: 7500000, ukt: "7.500.000", name_ref: "0", start: 1, count: 4, na: "N" },
    DemoBipot2 { item: "TESIS", parent: "S2REG24", label: "Bimbingan tesis", amount: 2000000, ukt: "7.500.000", name_ref: "9", start: 3, count: 0, na: "N" },
    DemoBipot2 { item: "UKT1", parent: "S1OLD23", label: "", amount: 1000000, ukt: "1.000.000", name_ref: "0", start: 1, count: 8, na: "N" },
];

pub(crate) fn write_snapshot(conn: &Connection) -> Result<()> {
    conn.execute_batch(SCHEMA)?;
    for b in BIPOT {
        conn.execute(
            "INSERT INTO bipot (BIPOTID, Nama, Tahun, ProgramID, ProdiID, NA) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            rusqlite::params![b.code, b.name, b.year, b.program, b.prodi, b.na],
        )?;
    }
    for i in BIPOT2 {
        conn.execute(
            "INSERT INTO bipot2 (BIPOT2ID, BIPOTID, TambahanNama, Jumlah, UKT, BIPOTNamaID, MulaiSesi, KaliSesi, NA) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            rusqlite::params![i.item, i.parent, i.label, i.amount, i.ukt, i.name_ref, i.start, i.count, i.na],
        )?;
    }
    Ok(())
}

pub fn run(settings: &Settings, output: Option<String>) -> Result<()> {
    let path = match output {
        Some(p) => PathBuf::from(expand_path(&p)),
        None => settings.legacy_path(),
    };
    if path.exists() {
        return Err(SyncError::Other(format!(
            "{} already exists; pass --output to write the sample elsewhere",
            path.display()
        )));
    }
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }

    let conn = Connection::open(&path)?;
    write_snapshot(&conn)?;

    println!(
        "Wrote sample SIMAK snapshot to {} ({} templates, {} items)",
        path.display(),
        BIPOT.len(),
        BIPOT2.len()
    );
    println!("Next: simak-sync --legacy-db {} sync", path.display());
    Ok(())
}
