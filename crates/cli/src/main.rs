mod commands;

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand, ValueEnum};

/// Output format for CLI responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub(crate) enum OutputFormat {
    Text,
    Json,
}

/// kwdsl keyword test language toolchain.
#[derive(Parser)]
#[command(name = "kwdsl", version, about = "kwdsl keyword test language toolchain")]
struct Cli {
    /// Output format (text or json)
    #[arg(long, global = true, default_value = "text", value_enum)]
    output: OutputFormat,

    /// Suppress non-essential output
    #[arg(long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run .dsl files, or every .dsl file in the given directories
    Run {
        /// Files or directories to run
        #[arg(required = true)]
        paths: Vec<PathBuf>,
        /// TOML or JSON file with configuration variables (repeatable; later files win)
        #[arg(long = "vars")]
        vars: Vec<PathBuf>,
        /// Keep local variables after each run
        #[arg(long)]
        keep_variables: bool,
        /// Session id shared by parallel workers for once-per-directory setup
        #[arg(long)]
        session: Option<String>,
    },

    /// Report every syntax error in .dsl files
    Check {
        /// Files to check
        #[arg(required = true)]
        files: Vec<PathBuf>,
        /// Print the parsed AST as JSON
        #[arg(long)]
        ast: bool,
    },

    /// Serve the built-in keywords over the remote keyword protocol
    Serve {
        /// Address to bind
        #[arg(long, default_value = "127.0.0.1")]
        host: String,
        /// Port to listen on
        #[arg(long, default_value_t = kwdsl_remote::DEFAULT_PORT)]
        port: u16,
        /// Shared API key (falls back to $KWDSL_API_KEY; unset means open access)
        #[arg(long)]
        api_key: Option<String>,
    },

    /// Print documentation for every registered keyword
    Keywords,

    /// Inspect and edit the global variable store
    Globals {
        #[command(subcommand)]
        command: GlobalsCommands,
    },
}

#[derive(Subcommand)]
pub(crate) enum GlobalsCommands {
    /// Print every global variable
    List,
    /// Print one global variable
    Get { name: String },
    /// Set a global variable (VALUE is parsed as JSON, else kept as a string)
    Set { name: String, value: String },
    /// Delete a global variable
    Delete { name: String },
    /// Delete every global variable
    Clear,
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.quiet);

    match cli.command {
        Commands::Run {
            paths,
            vars,
            keep_variables,
            session,
        } => {
            commands::run::cmd_run(commands::run::RunOptions {
                paths: &paths,
                vars: &vars,
                keep_variables,
                session: session.as_deref(),
                output: cli.output,
                quiet: cli.quiet,
            });
        }
        Commands::Check { files, ast } => {
            commands::check::cmd_check(&files, ast, cli.output, cli.quiet);
        }
        Commands::Serve {
            host,
            port,
            api_key,
        } => {
            commands::serve::cmd_serve(&host, port, api_key, cli.output, cli.quiet);
        }
        Commands::Keywords => {
            commands::keywords::cmd_keywords(cli.output);
        }
        Commands::Globals { command } => {
            commands::globals::cmd_globals(command, cli.output, cli.quiet);
        }
    }
}

/// Logs go to stderr; `RUST_LOG` overrides the default level.
fn init_tracing(quiet: bool) {
    let default = if quiet { "warn" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default.into()),
        )
        .with_writer(std::io::stderr)
        .init();
}

pub(crate) fn report_error(msg: &str, output: OutputFormat, quiet: bool) {
    if quiet {
        return;
    }
    match output {
        OutputFormat::Text => eprintln!("{}", msg),
        OutputFormat::Json => {
            eprintln!("{}", serde_json::json!({ "error": msg }));
        }
    }
}

/// Report and exit with status 1.
pub(crate) fn fail(msg: &str, output: OutputFormat, quiet: bool) -> ! {
    report_error(msg, output, quiet);
    process::exit(1);
}
