mod cli;
mod db;
mod error;
mod fmt;
mod legacy;
mod models;
mod settings;
mod sync;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use cli::{Cli, Commands, TemplatesCommands};
use settings::Settings;

fn init_tracing(verbose: bool) {
    let default = if verbose { "simak_sync=debug" } else { "simak_sync=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let log_json = std::env::var("SIMAK_SYNC_LOG_JSON")
        .map(|v| matches!(v.as_str(), "1" | "true" | "yes"))
        .unwrap_or(false);
    if log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_target(false).with_writer(std::io::stderr))
            .init();
    }
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let settings = Settings::load().with_overrides(cli.legacy_db.as_deref(), cli.target_db.as_deref());

    let result = match cli.command {
        Commands::Init => cli::init::run(settings),
        Commands::Sync { tahun, code } => cli::sync::run(&settings, tahun.as_deref(), code),
        Commands::RepairSequences => cli::repair::run(&settings),
        Commands::Status => cli::status::run(&settings),
        Commands::Templates { command } => match command {
            TemplatesCommands::List { year } => cli::templates::list(&settings, year.as_deref()),
            TemplatesCommands::Show { code } => cli::templates::show(&settings, &code),
        },
        Commands::Demo { output } => cli::demo::run(&settings, output),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
