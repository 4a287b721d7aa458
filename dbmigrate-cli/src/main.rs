//! Command-line front end for dbmigrate.
//!
//! `dbmigrate migrate <create|up|rollback|force|status>` manages schema versions and
//! `dbmigrate root` seeds the root record.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use dbmigrate::{run_reported, scaffold, Command, Config, Migrate};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "dbmigrate", version, about = "Database schema migrations")]
struct Cli {
    /// Config file (yml, yaml, toml or json). Defaults to ./config.yml when present
    #[arg(long, global = true, env = "DBMIGRATE_CONFIG")]
    config: Option<PathBuf>,

    /// Connection string, overriding mysql.dsn from the config
    #[arg(long, global = true, env = "DATABASE_URL")]
    dsn: Option<String>,

    /// Migrations directory, overriding `migrations` from the config
    #[arg(long, global = true, env = "DBMIGRATE_MIGRATIONS")]
    migrations: Option<PathBuf>,

    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create, apply and revert schema migrations
    #[command(subcommand)]
    Migrate(MigrateCommand),
    /// Insert or update the root record from the `root` config section
    Root,
}

#[derive(Subcommand, Debug)]
enum MigrateCommand {
    /// Create an empty up/down migration pair stamped with the current time
    #[command(arg_required_else_help = true)]
    Create { name: String },
    /// Apply all pending migrations
    Up,
    /// Apply or revert migrations until the given version (0 reverts everything)
    #[command(arg_required_else_help = true)]
    Rollback { version: u64 },
    /// Record a version without running any script (-1 clears it)
    #[command(arg_required_else_help = true)]
    Force {
        #[arg(allow_negative_numbers = true)]
        version: i64,
    },
    /// Show the recorded version and pending migrations
    Status,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    ExitCode::from(exit_status(run(cli)))
}

/// 0 on success. Failures are logged and map to 1.
fn exit_status(result: anyhow::Result<()>) -> u8 {
    match result {
        Ok(()) => 0,
        Err(e) => {
            let error = format!("{e:#}");
            tracing::error!(error = %error, "command failed");
            1
        }
    }
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

fn load_config(cli: &Cli) -> anyhow::Result<Config> {
    let config = Config::load(cli.config.as_deref()).context("loading configuration")?;
    Ok(config
        .with_dsn(cli.dsn.clone())
        .with_migrations(cli.migrations.clone()))
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let config = load_config(&cli)?;

    match cli.command {
        Commands::Migrate(MigrateCommand::Create { name }) => {
            scaffold::create_now(&config.migrations, &name)
                .with_context(|| format!("creating migration '{name}'"))?;
        }
        Commands::Migrate(MigrateCommand::Up) => {
            let mut migrate = open(&config)?;
            run_reported(&mut migrate, Command::Up, Migrate::up)?;
        }
        Commands::Migrate(MigrateCommand::Rollback { version }) => {
            let mut migrate = open(&config)?;
            run_reported(&mut migrate, Command::Rollback, |m| m.migrate(version))?;
        }
        Commands::Migrate(MigrateCommand::Force { version }) => {
            let mut migrate = open(&config)?;
            run_reported(&mut migrate, Command::Force, |m| m.force(version))?;
        }
        Commands::Migrate(MigrateCommand::Status) => {
            let mut migrate = open(&config)?;
            print_status(&mut migrate)?;
        }
        Commands::Root => {
            let table = config.root()?.table.clone();
            dbmigrate::root::upsert_from_config(&config)
                .with_context(|| format!("upserting root record into '{table}'"))?;
        }
    }
    Ok(())
}

fn open(config: &Config) -> anyhow::Result<Migrate> {
    Migrate::from_config(config)
        .with_context(|| format!("opening migrations in {}", config.migrations.display()))
}

fn print_status(migrate: &mut Migrate) -> anyhow::Result<()> {
    let state = migrate.current_version()?;
    let pending = migrate.pending()?;

    match state.version {
        Some(version) => println!("Current version: {version}"),
        None => println!("Current version: none"),
    }
    if state.dirty {
        println!("State: dirty (fix the database, then run `migrate force <version>`)");
    }
    if pending.is_empty() {
        println!("No pending migrations.");
    } else {
        println!("Pending migrations ({}):", pending.len());
        for migration in &pending {
            println!("  {}: {}", migration.version, migration.name);
        }
    }
    Ok(())
}
