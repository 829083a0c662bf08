use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};

use salesbridge::config::Config;
use salesbridge::logging;
use salesbridge::pipeline;
use salesbridge::rest::{self, dto::RunRequest, dto::RunResponse, ApiState};

#[derive(Parser)]
#[command(name = "salesbridge")]
#[command(about = "Sales document sync pipeline: accounting backend to CRM")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Config file path
    #[arg(short, long)]
    config: Option<String>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Keep progress state in memory instead of the remote store
    /// (development only; state resets on restart)
    #[arg(long)]
    local_state: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the REST trigger server (default)
    Serve {
        /// Port to listen on (default: 7031)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Run the pipeline once and print the result as JSON
    Run {
        /// Process exactly this document id
        #[arg(long)]
        doc_id: Option<u64>,

        /// Case-insensitive substring matched against reference or comment
        #[arg(long)]
        doc_title: Option<String>,

        /// Exact document date (YYYY-MM-DD)
        #[arg(long)]
        date: Option<chrono::NaiveDate>,

        /// Inclusive lower bound of a document date range
        #[arg(long)]
        date_from: Option<chrono::NaiveDate>,

        /// Inclusive upper bound of a document date range
        #[arg(long)]
        date_to: Option<chrono::NaiveDate>,

        /// Cap on candidates inspected during a filter scan
        #[arg(long)]
        scan_limit: Option<usize>,

        /// Allow durable state mutation even with overrides present
        #[arg(long)]
        update_state: bool,

        /// Start processing from exactly this document id
        #[arg(long)]
        start_document_id: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::load(cli.config.as_deref())?;

    let _logging_handle = logging::init_logging(&config, cli.debug)?;

    match cli.command {
        Some(Commands::Run {
            doc_id,
            doc_title,
            date,
            date_from,
            date_to,
            scan_limit,
            update_state,
            start_document_id,
        }) => {
            let request = RunRequest {
                doc_id,
                doc_title,
                date,
                date_from,
                date_to,
                scan_limit,
                update_state: if update_state { Some(true) } else { None },
                start_document_id,
                last_processed_id: None,
            };
            cmd_run(&config, request, cli.local_state).await?;
        }
        Some(Commands::Serve { port }) => {
            cmd_serve(config, port, cli.local_state).await?;
        }
        None => {
            cmd_serve(config, None, cli.local_state).await?;
        }
    }

    Ok(())
}

fn build_runner(config: &Config, local_state: bool) -> Result<pipeline::Runner> {
    if local_state {
        tracing::warn!("using in-memory state store; progress will not persist");
        pipeline::build_local_state(config)
    } else {
        pipeline::build_default(config)
    }
}

/// One pipeline invocation from the command line
async fn cmd_run(config: &Config, request: RunRequest, local_state: bool) -> Result<()> {
    let runner = build_runner(config, local_state)?;
    let mut ctx = request.into_context();

    tracing::info!(invocation = %ctx.invocation_id, mutate_state = ctx.mutate_state, "cli run");

    runner.run_all(&mut ctx).await;

    let response = RunResponse::from(&ctx);
    println!("{}", serde_json::to_string_pretty(&response)?);

    if response.status == "error" {
        std::process::exit(1);
    }
    Ok(())
}

/// Start the trigger server
async fn cmd_serve(config: Config, port: Option<u16>, local_state: bool) -> Result<()> {
    let port = port.unwrap_or(config.server.port);
    let runner = build_runner(&config, local_state)?;
    let state = ApiState::new(config, Arc::new(runner));
    rest::serve(state, port).await
}
