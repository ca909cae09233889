pub mod demo;
pub mod init;
pub mod repair;
pub mod status;
pub mod sync;
pub mod templates;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "simak-sync",
    about = "Sync SIMAK billing templates (bipot/bipot2) into the billing database."
)]
pub struct Cli {
    /// SIMAK snapshot to read from (overrides settings)
    #[arg(long = "legacy-db", global = true)]
    pub legacy_db: Option<String>,
    /// Billing database to write to (overrides settings)
    #[arg(long = "target-db", global = true)]
    pub target_db: Option<String>,
    /// Log every item as it is synced
    #[arg(short, long, global = true)]
    pub verbose: bool,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Save database paths and create the billing schema.
    Init,
    /// Sync bipot -> bill_templates and bipot2 -> bill_template_items.
    Sync {
        /// Only sync this academic year (default: every year from 2018)
        #[arg(long, visible_alias = "year")]
        tahun: Option<String>,
        /// Only sync the template with this BIPOTID
        #[arg(long)]
        code: Option<String>,
    },
    /// Realign the billing tables' id sequences with their highest id.
    RepairSequences,
    /// Show database paths, row counts and the last sync run.
    Status,
    /// Inspect synced bill templates.
    Templates {
        #[command(subcommand)]
        command: TemplatesCommands,
    },
    /// Write a sample SIMAK snapshot to try the sync against.
    Demo {
        /// Output path (default: the configured SIMAK path)
        #[arg(long)]
        output: Option<String>,
    },
}

#[derive(Subcommand)]
pub enum TemplatesCommands {
    /// List synced templates with their item counts.
    List {
        /// Academic year, e.g. 2024
        #[arg(long)]
        year: Option<String>,
    },
    /// Show one template and its items.
    Show {
        /// Template code (SIMAK BIPOTID)
        code: String,
    },
}
