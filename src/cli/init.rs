use crate::db::{get_connection, init_db};
use crate::error::Result;
use crate::settings::Settings;

pub fn run(settings: Settings) -> Result<()> {
    settings.save()?;

    let target = settings.target_path();
    if let Some(parent) = target.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let conn = get_connection(&target)?;
    init_db(&conn)?;

    println!("SIMAK snapshot: {}", settings.legacy_db);
    if !settings.legacy_path().exists() {
        println!("  (not found yet; run `simak-sync demo` for a sample)");
    }
    println!("Initialized billing database at {}", target.display());
    Ok(())
}
