use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use cli::{build_progress_bar, render_build_report, render_result, render_status};
use console::style;
use core_types::Metric;
use core_types::config::{AppConfig, load_config};
use embedding_client::EmbeddingClient;
use person_index::{BuildOptions, PersonStore};
use service::{
    BuildInputs, BuildProgress, PipelineError, QueryRequest, build_index, init_tracing_with_config,
    run_query, store_status,
};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Semantic search over person biographies.
#[derive(Parser, Debug)]
#[command(name = "person-search", version = cli::VERSION, about = "Build and query a person embedding store")]
struct Cli {
    /// Config file (defaults to ./person-search.toml when present).
    #[arg(long, global = true, env = "PERSON_SEARCH_CONFIG")]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Build the store from the people and embeddings files, replacing any previous store.
    Build {
        /// People JSON file.
        #[arg(long)]
        people: Option<PathBuf>,
        /// Embeddings JSON file.
        #[arg(long)]
        embeddings: Option<PathBuf>,
        /// Store directory.
        #[arg(long)]
        index: Option<PathBuf>,
        /// Metric recorded as the store default.
        #[arg(long)]
        metric: Option<Metric>,
    },
    /// Embed TEXT, rank stored people by similarity and write the results file.
    Query {
        /// Query text; falls back to the configured default query.
        text: Option<String>,
        /// Number of results.
        #[arg(short = 'n', long)]
        top: Option<usize>,
        /// Overrides the configured metric and the store default.
        #[arg(long)]
        metric: Option<Metric>,
        #[arg(long)]
        index: Option<PathBuf>,
        /// Directory receiving search_results_<millis>.json.
        #[arg(long)]
        output_dir: Option<PathBuf>,
        /// Embedding provider URL.
        #[arg(long)]
        endpoint: Option<String>,
        /// Attempts before giving up on the embedding provider.
        #[arg(long)]
        retries: Option<u32>,
    },
    /// Show document count, dimension and metric of a committed store.
    Stats {
        #[arg(long)]
        index: Option<PathBuf>,
        /// Print as JSON.
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            if err
                .downcast_ref::<PipelineError>()
                .is_some_and(PipelineError::is_cancelled)
            {
                eprintln!("{}", style("cancelled").yellow());
                return ExitCode::from(130);
            }
            eprintln!("{} {err:#}", style("error:").red().bold());
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let cfg = load_config(cli.config.as_deref())?;
    let _guard = init_tracing_with_config(&cfg.logging)?;

    let cancel = CancellationToken::new();
    spawn_ctrl_c(cancel.clone());

    match cli.command {
        Commands::Build {
            people,
            embeddings,
            index,
            metric,
        } => {
            let inputs = BuildInputs {
                people: people.unwrap_or_else(|| cfg.paths.people.clone()),
                embeddings: embeddings.unwrap_or_else(|| cfg.paths.embeddings.clone()),
                index_dir: index.unwrap_or_else(|| cfg.paths.index_dir.clone()),
            };
            let options = BuildOptions {
                metric: cfg.search.build_metric(metric),
                ..BuildOptions::default()
            };
            run_build(inputs, options, cancel).await
        }
        Commands::Query {
            text,
            top,
            metric,
            index,
            output_dir,
            endpoint,
            retries,
        } => {
            let mut cfg = cfg;
            if let Some(endpoint) = endpoint {
                cfg.embedding.endpoint = endpoint;
            }
            if let Some(retries) = retries {
                cfg.embedding.retries = retries;
            }
            if let Some(dir) = index {
                cfg.paths.index_dir = dir;
            }
            if let Some(dir) = output_dir {
                cfg.paths.output_dir = dir;
            }
            let text = text.unwrap_or_else(|| cfg.search.default_query.clone());
            let top_n = top.unwrap_or(cfg.search.top_n);
            let metric = cfg.search.query_metric(metric);
            run_search(&cfg, &text, top_n, metric, &cancel).await
        }
        Commands::Stats { index, json } => {
            let path = index.unwrap_or_else(|| cfg.paths.index_dir.clone());
            let status = store_status(&path)
                .with_context(|| format!("cannot open person store at {}", path.display()))?;
            if json {
                println!("{}", serde_json::to_string_pretty(&status)?);
            } else {
                println!("{}", render_status(&status));
            }
            Ok(())
        }
    }
}

async fn run_build(inputs: BuildInputs, options: BuildOptions, cancel: CancellationToken) -> Result<()> {
    let bar = build_progress_bar();
    let bar_for_build = bar.clone();

    let report = tokio::task::spawn_blocking(move || {
        build_index(&inputs, options, Some(&cancel), |event| match event {
            BuildProgress::Started { total } => {
                bar_for_build.set_length(total as u64);
                bar_for_build.set_message("indexing");
            }
            BuildProgress::Indexed { done, .. } => bar_for_build.set_position(done as u64),
            BuildProgress::Committing => bar_for_build.set_message("committing"),
        })
    })
    .await
    .context("build task panicked")?;

    bar.finish_and_clear();
    let report = report?;
    println!("{}", render_build_report(&report));
    Ok(())
}

async fn run_search(
    cfg: &AppConfig,
    text: &str,
    top_n: usize,
    metric: Option<Metric>,
    cancel: &CancellationToken,
) -> Result<()> {
    let store = PersonStore::open(&cfg.paths.index_dir).with_context(|| {
        format!(
            "cannot open person store at {}; run `person-search build` first",
            cfg.paths.index_dir.display()
        )
    })?;
    info!(documents = store.document_count(), "store ready");
    println!(
        "{} {} documents in {}",
        style("store:").bold(),
        store.document_count(),
        store.path().display()
    );

    let embedder = EmbeddingClient::from_config(&cfg.embedding)?;
    let request = QueryRequest {
        text,
        top_n,
        metric,
        output_dir: &cfg.paths.output_dir,
    };
    let outcome = run_query(&store, &embedder, &request, Some(cancel)).await?;

    if outcome.results.is_empty() {
        println!("{}", style("no results").yellow());
        return Ok(());
    }
    println!(
        "{} top {} for {:?}\n",
        style("results:").bold(),
        outcome.results.len(),
        text
    );
    for r in &outcome.results {
        println!("{}\n", render_result(r));
    }
    if let Some(path) = &outcome.artifact {
        println!("{} {}", style("saved:").green(), path.display());
    }
    Ok(())
}

fn spawn_ctrl_c(token: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received; cancelling");
            token.cancel();
        }
    });
}
