//! accordo-ai - performance assessment and student import
//!
//! `analyze` uploads a performance recording and prints the four-quadrant
//! assessment; `import` loads a student data file into the keyed store.
//! Ctrl-C cancels whichever is running.

use accordo_ai::db::{init_database_pool, MemoryStore, SqliteStore};
use accordo_ai::import::{load_source_file, ImportOrchestrator};
use accordo_ai::models::ImportSummary;
use accordo_ai::services::{GeminiClient, JobPoller, RetryPolicy};
use accordo_ai::types::ModelConfig;
use accordo_ai::workflow::{persist_assessment, MediaAnalysisPipeline};
use accordo_common::config::{self, TomlConfig};
use accordo_common::CANONICAL_SCALE;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Debug, Parser)]
#[command(name = "accordo-ai", version, about = "Music performance assessment and student import")]
struct Cli {
    /// Config file (default: $ACCORDO_CONFIG, then the user config dir)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Assess a recorded performance
    Analyze {
        /// Audio or video file
        file: PathBuf,

        /// Store the assessment under this student
        #[arg(long)]
        student_id: Option<String>,

        /// Gemini API key (overrides env and config)
        #[arg(long)]
        api_key: Option<String>,

        /// Instrument named in the analysis prompt
        #[arg(long, default_value = "piano")]
        instrument: String,

        /// Database used with --student-id
        #[arg(long)]
        database: Option<PathBuf>,
    },

    /// Import a student data file (top-level `students` array)
    Import {
        file: PathBuf,

        /// Normalize and validate without persisting
        #[arg(long)]
        dry_run: bool,

        #[arg(long)]
        database: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_path = config::resolve_config_path(cli.config.as_deref());
    let toml_config = config::load_toml_config(config_path.as_deref())?;
    accordo_common::logging::init_tracing(&toml_config.logging);

    info!("Starting accordo-ai {}", env!("CARGO_PKG_VERSION"));

    let cancel_token = CancellationToken::new();
    let ctrl_c_token = cancel_token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, cancelling");
            ctrl_c_token.cancel();
        }
    });

    match cli.command {
        Command::Analyze {
            file,
            student_id,
            api_key,
            instrument,
            database,
        } => {
            let request = AnalyzeRequest {
                file: &file,
                student_id: student_id.as_deref(),
                api_key: api_key.as_deref(),
                instrument: &instrument,
                database,
            };
            analyze(&toml_config, request, &cancel_token).await
        }
        Command::Import {
            file,
            dry_run,
            database,
        } => {
            let summary = import(&toml_config, &file, dry_run, database, cancel_token).await?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
            if !summary.is_clean() {
                std::process::exit(1);
            }
            Ok(())
        }
    }
}

fn database_path(toml_config: &TomlConfig, cli_arg: Option<PathBuf>) -> PathBuf {
    cli_arg
        .or_else(|| toml_config.database_path.clone())
        .unwrap_or_else(config::default_database_path)
}

struct AnalyzeRequest<'a> {
    file: &'a Path,
    student_id: Option<&'a str>,
    api_key: Option<&'a str>,
    instrument: &'a str,
    database: Option<PathBuf>,
}

async fn analyze(
    toml_config: &TomlConfig,
    request: AnalyzeRequest<'_>,
    cancel_token: &CancellationToken,
) -> Result<()> {
    let AnalyzeRequest {
        file,
        student_id,
        api_key,
        instrument,
        database,
    } = request;
    let api_key = config::resolve_api_key(api_key, toml_config)?;
    let client = Arc::new(GeminiClient::new(api_key, toml_config.analysis.model.clone())?);
    let retry = RetryPolicy::from_config(&toml_config.retry);

    let pipeline = MediaAnalysisPipeline::new(client.clone(), client.clone(), client, CANONICAL_SCALE)
        .with_poller(JobPoller::from_config(&toml_config.polling))
        .with_retry(retry)
        .with_model_config(ModelConfig::from(&toml_config.analysis))
        .with_instrument(instrument);

    let analysis = pipeline
        .run(file, cancel_token)
        .await
        .with_context(|| format!("analysis of {} failed", file.display()))?;

    println!("{}", analysis.report_text);

    if let Some(student_id) = student_id {
        let db_path = database_path(toml_config, database);
        let store = SqliteStore::new(init_database_pool(&db_path).await?);
        let row = persist_assessment(&store, &retry, student_id, file, &analysis).await?;
        info!(
            recording_id = %row.recording_id,
            database = %db_path.display(),
            "Assessment saved"
        );
    }
    Ok(())
}

async fn import(
    toml_config: &TomlConfig,
    file: &Path,
    dry_run: bool,
    database: Option<PathBuf>,
    cancel_token: CancellationToken,
) -> Result<ImportSummary> {
    let records = load_source_file(file)
        .with_context(|| format!("cannot read source file {}", file.display()))?;
    info!(records = records.len(), file = %file.display(), "Source file loaded");

    let orchestrator = ImportOrchestrator::from_config(toml_config).with_cancel_token(cancel_token);

    let summary = if dry_run {
        let store = MemoryStore::new();
        orchestrator.import_all(records, &store, &store).await
    } else {
        let db_path = database_path(toml_config, database);
        let store = SqliteStore::new(init_database_pool(&db_path).await?);
        info!(database = %db_path.display(), "Writing to database");
        orchestrator.import_all(records, &store, &store).await
    };
    Ok(summary)
}
