//! logkeep - structured log ingestion and query service
//!
//! Records arrive over HTTP, are appended to a line-oriented file by an
//! asynchronous file sink, and are queried by scanning that file.
//!
//! ## Usage
//!
//! ### Server Mode (default)
//! ```bash
//! logkeep serve --port 8080 --log-file /var/lib/logkeep/records.log
//! # or just
//! logkeep
//! ```
//!
//! ### Query Mode
//! ```bash
//! logkeep query /var/lib/logkeep/records.log --service auth --level error
//! ```
//!
//! ### Tail Mode
//! ```bash
//! logkeep tail /var/lib/logkeep/records.log -n 20
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use logkeep::config::ServerConfig;
use logkeep::server::{AppState, Server};
use logkeep::{FileSource, LogLevel, QueryParams, Querier};
use std::io::{self, Write};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "logkeep")]
#[command(about = "logkeep - structured log ingestion and query service", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the HTTP ingestion and query server (default)
    Serve {
        /// Configuration file path
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Listen port (overrides config)
        #[arg(short, long)]
        port: Option<u16>,
        /// Record file to write and query (overrides config)
        #[arg(short, long)]
        log_file: Option<PathBuf>,
        /// Also print every ingested record to stdout
        #[arg(long)]
        console: bool,
    },
    /// Query record files and print matches as JSON lines
    Query {
        /// Record files, queried in the order given
        #[arg(required = true)]
        files: Vec<PathBuf>,
        /// Only records with this level
        #[arg(long)]
        level: Option<LogLevel>,
        /// Only records from this service
        #[arg(long)]
        service: Option<String>,
        /// Inclusive lower timestamp bound
        #[arg(long)]
        from: Option<i64>,
        /// Inclusive upper timestamp bound
        #[arg(long)]
        to: Option<i64>,
    },
    /// Print the most recent records of a file
    Tail {
        file: PathBuf,
        /// Number of records to show
        #[arg(short = 'n', long, default_value_t = 50)]
        lines: usize,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Diagnostics go to stderr; stdout carries records
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    match cli.command {
        Some(Commands::Query {
            files,
            level,
            service,
            from,
            to,
        }) => run_query(
            files,
            QueryParams {
                level,
                service,
                from,
                to,
            },
        ),
        Some(Commands::Tail { file, lines }) => run_tail(file, lines),
        Some(Commands::Serve {
            config,
            port,
            log_file,
            console,
        }) => {
            let config = load_config(config, port, log_file, console)?;
            tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()?
                .block_on(run_server(config))
        }
        None => tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()?
            .block_on(run_server(ServerConfig::from_env())),
    }
}

fn load_config(
    config_path: Option<PathBuf>,
    port: Option<u16>,
    log_file: Option<PathBuf>,
    console: bool,
) -> Result<ServerConfig> {
    let mut config = if let Some(path) = config_path {
        let mut config = ServerConfig::from_file(path)?;
        config.apply_env();
        config
    } else {
        ServerConfig::from_env()
    };

    if let Some(p) = port {
        config.listen_port = p;
    }
    if let Some(file) = log_file {
        config.storage.log_file = file;
    }
    if console {
        config.storage.console = true;
    }

    Ok(config)
}

async fn run_server(config: ServerConfig) -> Result<()> {
    tracing::info!("Starting logkeep server");

    let (file_sink, state) = AppState::from_config(&config).map_err(|e| {
        tracing::error!("Failed to set up storage: {:?}", e);
        e
    })?;
    let state = Arc::new(state);
    tracing::info!(path = %file_sink.path().display(), "Writing records");

    let addr = SocketAddr::new(config.listen_addr, config.listen_port);
    let server = Server::bind(addr, state.clone()).await?;

    server
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for shutdown signal: {}", e);
                std::future::pending::<()>().await;
            }
        })
        .await?;

    // Flushing and joining the sink worker both block
    tokio::task::spawn_blocking(move || {
        let flushed = state.logger.flush();
        file_sink.shutdown();
        flushed
    })
    .await
    .context("Shutdown task failed")?
    .context("Failed to flush records")?;

    tracing::info!("All records flushed, exiting");
    Ok(())
}

fn run_query(files: Vec<PathBuf>, params: QueryParams) -> Result<()> {
    if params.is_inverted() {
        anyhow::bail!("--from must not be greater than --to");
    }

    let mut sources = files.iter().map(|path| {
        FileSource::new(path).with_context(|| format!("Failed to open {}", path.display()))
    });
    // clap guarantees at least one file
    let first = sources.next().context("No record file given")??;
    let mut querier = Querier::new(Arc::new(first));
    for source in sources {
        querier.add_source(Arc::new(source?));
    }

    let records = querier.query(&params).context("Failed to query records")?;
    print_json_lines(&records)
}

fn run_tail(file: PathBuf, lines: usize) -> Result<()> {
    let source =
        FileSource::new(&file).with_context(|| format!("Failed to open {}", file.display()))?;
    let records = source.tail(lines).context("Failed to read records")?;
    print_json_lines(&records)
}

fn print_json_lines(records: &[logkeep::LogRecord]) -> Result<()> {
    let stdout = io::stdout();
    let mut out = io::BufWriter::new(stdout.lock());
    for record in records {
        serde_json::to_writer(&mut out, record)?;
        writeln!(out)?;
    }
    out.flush()?;
    Ok(())
}
