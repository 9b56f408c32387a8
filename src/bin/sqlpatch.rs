use clap::{Parser, Subcommand};
use sqlpatch::SqlpatchConfig;
use tracing::Level;

mod commands;

use commands::backup::BackupArgs;
use commands::config::ConfigArgs;
use commands::migrate::MigrateArgs;
use commands::restore::RestoreArgs;
use commands::status::StatusArgs;
use commands::OutputFormat;

#[derive(Parser)]
#[clap(author, version, about, long_about = None)]
#[clap(propagate_version = true)]
struct Cli {
    /// configuration file path, by default $HOME/.sqlpatch/sqlpatch.toml is used
    #[clap(short, long)]
    config: Option<String>,

    /// Print debug information
    #[clap(long)]
    debug: bool,

    /// Output format
    #[clap(short, long, global = true, value_enum, default_value_t = OutputFormat::Table)]
    format: OutputFormat,

    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the schema version and patch history of a database
    Status(StatusArgs),

    /// Apply pending patches from a patch file
    Migrate(MigrateArgs),

    /// Snapshot a database file into the backup directory
    Backup(BackupArgs),

    /// Copy a snapshot back over a database file
    Restore(RestoreArgs),

    /// Show configuration and list existing snapshots
    Config(ConfigArgs),
}

fn main() {
    let cli = Cli::parse();

    if cli.debug {
        tracing_subscriber::fmt()
            // engine progress is reported at INFO
            .with_max_level(Level::INFO)
            .init();
    }

    let config = match SqlpatchConfig::new(&cli.config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("ERROR: {}", e);
            std::process::exit(1);
        }
    };

    let output_format = cli.format;

    match cli.command {
        Commands::Status(args) => commands::status::run(&config, args, output_format),
        Commands::Migrate(args) => commands::migrate::run(&config, args, output_format),
        Commands::Backup(args) => commands::backup::run(&config, args, output_format),
        Commands::Restore(args) => commands::restore::run(args, output_format),
        Commands::Config(args) => commands::config::run(&config, args, output_format),
    }
}
