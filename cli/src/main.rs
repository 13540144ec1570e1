use std::collections::BTreeMap;
use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand};
use serverdb::{ConnectionParameters, DbError, ServerDatabase};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Parser)]
#[command(name = "serverdb", version)]
#[command(about = "Inspect and administer the virtual server database")]
struct Cli {
    #[command(flatten)]
    target: TargetArgs,
    /// Prefix of the table names.
    #[arg(long, global = true, default_value = "")]
    prefix: String,
    /// Log more (repeat for more detail). `RUST_LOG` takes precedence.
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,
    #[command(subcommand)]
    command: Command,
}

/// Where the database lives.
#[derive(Debug, Args)]
#[group(required = true, multiple = false)]
struct TargetArgs {
    /// Connection parameter file (YAML or JSON).
    #[arg(long)]
    config: Option<PathBuf>,
    /// SQLite database file, created if missing.
    #[arg(long)]
    sqlite: Option<PathBuf>,
}

impl TargetArgs {
    fn parameters(&self) -> Result<ConnectionParameters, DbError> {
        match (&self.config, &self.sqlite) {
            (Some(file), _) => ConnectionParameters::load(file),
            (None, Some(path)) => Ok(ConnectionParameters::sqlite(path)),
            (None, None) => Err(DbError::config("either --config or --sqlite is required")),
        }
    }
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Create missing tables and register the default server.
    Init,
    /// Manage the server registry.
    Server {
        #[command(subcommand)]
        action: ServerAction,
    },
    /// Write and read server logs.
    Log {
        #[command(subcommand)]
        action: LogAction,
    },
    /// Read and change per-server configuration.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Debug, Subcommand)]
enum ServerAction {
    /// List registered server IDs.
    List,
    /// Register a server.
    Add { id: u32 },
    /// Remove a server with its logs and configuration.
    Remove { id: u32 },
    /// Print whether a server is registered.
    Exists { id: u32 },
    /// Print the smallest unused server ID.
    NextFree,
}

#[derive(Debug, Subcommand)]
enum LogAction {
    /// Append a message to a server's log.
    Write { id: u32, message: String },
    /// Print a server's log, oldest first.
    Show(LogShowArgs),
}

#[derive(Debug, Args)]
struct LogShowArgs {
    id: u32,
    /// Maximum number of entries.
    #[arg(long)]
    limit: Option<u32>,
    /// Entries to skip.
    #[arg(long, default_value_t = 0)]
    offset: u32,
    /// Print JSON instead of text.
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Subcommand)]
enum ConfigAction {
    /// Print a value.
    Get(ConfigGetArgs),
    /// Set a value.
    Set { id: u32, key: String, value: String },
    /// Remove a key.
    Clear { id: u32, key: String },
    /// Print every key and value of a server.
    List {
        id: u32,
        /// Print JSON instead of text.
        #[arg(long)]
        json: bool,
    },
    /// Remove every key of a server.
    ClearAll { id: u32 },
}

#[derive(Debug, Args)]
struct ConfigGetArgs {
    id: u32,
    key: String,
    /// Printed when the key is not set.
    #[arg(long, default_value = "")]
    default: String,
}

#[derive(Debug, Error)]
enum CliError {
    #[error(transparent)]
    Database(#[from] DbError),
    #[error("failed to render JSON output: {0}")]
    Json(#[from] serde_json::Error),
}

impl CliError {
    /// Every message of the cause chain, one indented line each.
    fn report(&self) -> String {
        match self {
            CliError::Database(err) => err.report(),
            CliError::Json(err) => format!("  {self}\n  {err}"),
        }
    }
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(err) = run(cli) {
        eprintln!("error:\n{}", err.report());
        std::process::exit(1);
    }
}

fn init_tracing(verbose: u8) {
    use tracing_subscriber::EnvFilter;

    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .compact()
        .try_init();
}

fn run(cli: Cli) -> Result<(), CliError> {
    let params = cli.target.parameters()?;
    debug!(backend = %params.backend(), prefix = %cli.prefix, "opening database");
    let mut db = ServerDatabase::open_with_prefix(&params, &cli.prefix)?;

    let result = match cli.command {
        Command::Init => run_init(&db),
        Command::Server { action } => run_server(&db, action),
        Command::Log { action } => run_log(&db, action),
        Command::Config { action } => run_config(&db, action),
    };
    let closed = db.close();
    result?;
    closed?;
    Ok(())
}

fn run_init(db: &ServerDatabase) -> Result<(), CliError> {
    let names = db.table_names();
    let servers = db.server_table()?.get_all_server_ids()?;
    println!(
        "{} database ready: tables {}, {}, {}; {} server(s) registered",
        db.backend(),
        names.servers(),
        names.logs(),
        names.configs(),
        servers.len()
    );
    Ok(())
}

fn run_server(db: &ServerDatabase, action: ServerAction) -> Result<(), CliError> {
    let servers = db.server_table()?;
    match action {
        ServerAction::List => {
            for id in servers.get_all_server_ids()? {
                println!("{id}");
            }
        }
        ServerAction::Add { id } => {
            servers.add_server(id)?;
            println!("added server {id}");
        }
        ServerAction::Remove { id } => {
            servers.remove_server(id)?;
            println!("removed server {id}");
        }
        ServerAction::Exists { id } => println!("{}", servers.server_exists(id)?),
        ServerAction::NextFree => println!("{}", servers.get_free_server_id()?),
    }
    Ok(())
}

fn run_log(db: &ServerDatabase, action: LogAction) -> Result<(), CliError> {
    let logs = db.log_table()?;
    match action {
        LogAction::Write { id, message } => logs.log_message(id, &message)?,
        LogAction::Show(args) => {
            let entries = logs.get_logs(args.id, args.limit, args.offset)?;
            if args.json {
                println!("{}", serde_json::to_string_pretty(&entries)?);
            } else {
                for entry in entries {
                    println!(
                        "{}  {}",
                        entry.timestamp.format("%Y-%m-%d %H:%M:%S%.3f"),
                        entry.message
                    );
                }
            }
        }
    }
    Ok(())
}

fn run_config(db: &ServerDatabase, action: ConfigAction) -> Result<(), CliError> {
    let config = db.config_table()?;
    match action {
        ConfigAction::Get(args) => {
            println!("{}", config.get_config(args.id, &args.key, &args.default)?);
        }
        ConfigAction::Set { id, key, value } => config.set_config(id, &key, &value)?,
        ConfigAction::Clear { id, key } => config.clear_config(id, &key)?,
        ConfigAction::List { id, json } => {
            let entries: BTreeMap<_, _> = config.get_all_configs(id)?.into_iter().collect();
            if json {
                println!("{}", serde_json::to_string_pretty(&entries)?);
            } else {
                for (key, value) in entries {
                    println!("{key} = {value}");
                }
            }
        }
        ConfigAction::ClearAll { id } => config.clear_all_configs(id)?,
    }
    Ok(())
}
