//! paper-research-pipeline - academic research pipeline CLI/server.
//!
//! ## Usage
//!
//! ### CLI mode
//! ```bash
//! paper-research-pipeline research "coffee consumption and diabetes risk" --num-papers 10
//! ```
//!
//! ### HTTP server mode
//! ```bash
//! paper-research-pipeline serve --port 3000
//! ```

use anyhow::{Context, Result};
use axum::{extract::State, routing::{get, post}, Json, Router};
use chrono::Local;
use clap::{Parser, Subcommand};
use paper_research_pipeline::adapters::arxiv::ArxivAdapter;
use paper_research_pipeline::adapters::core::CoreAdapter;
use paper_research_pipeline::adapters::openalex::OpenAlexAdapter;
use paper_research_pipeline::adapters::scopus::ScopusAdapter;
use paper_research_pipeline::adapters::semantic_scholar::SemanticScholarAdapter;
use paper_research_pipeline::adapters::AdapterRegistry;
use paper_research_pipeline::citation::CrossrefCitationResolver;
use paper_research_pipeline::config::PipelineConfig;
use paper_research_pipeline::fulltext::HttpFullTextFetcher;
use paper_research_pipeline::llm::{LlmConfig, OpenAiCompatibleLlm};
use paper_research_pipeline::model::{PipelineParameters, QueryInput};
use paper_research_pipeline::schema::FieldDef;
use paper_research_pipeline::{AnalysisReport, AnalyzeRequest, Pipeline};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, Level};
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "paper-research-pipeline")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    /// Path to an optional TOML config file (backend concurrency/retry knobs)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one end-to-end research request and write a JSON report
    Research {
        /// Natural-language research query
        query: String,

        /// Free-text guidance steering how candidates are ranked
        #[arg(long, default_value = "")]
        ranking_guidance: String,

        /// Number of query variants formulated per backend
        #[arg(long, default_value_t = 2)]
        num_queries: usize,

        /// Papers requested per formulated query, per backend
        #[arg(long, default_value_t = 10)]
        papers_per_query: usize,

        /// Number of ranked papers to return
        #[arg(long, default_value_t = 10)]
        num_papers: usize,

        /// Comma-separated backend list (default: all five)
        #[arg(long)]
        platforms: Option<String>,

        /// Year filter: results from this year onwards
        #[arg(long)]
        min_year: Option<i32>,

        /// Year filter: results up to this year
        #[arg(long)]
        max_year: Option<i32>,

        /// Output directory for the JSON report
        #[arg(short, long, default_value = "./output")]
        output: PathBuf,
    },

    /// Run as an HTTP server
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value_t = 3000)]
        port: u16,

        /// Host to bind to
        #[arg(long, default_value = "127.0.0.1")]
        host: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.debug { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level.to_string()));
    fmt().with_env_filter(filter).with_target(true).with_thread_ids(false).init();

    let config = PipelineConfig::load(cli.config.as_deref()).context("failed to load configuration")?;

    match cli.command {
        Commands::Research {
            query,
            ranking_guidance,
            num_queries,
            papers_per_query,
            num_papers,
            platforms,
            min_year,
            max_year,
            output,
        } => {
            run_research(
                config,
                query,
                ranking_guidance,
                num_queries,
                papers_per_query,
                num_papers,
                platforms,
                min_year,
                max_year,
                output,
            )
            .await
        }
        Commands::Serve { port, host } => run_server(config, host, port).await,
    }
}

fn build_pipeline(config: &PipelineConfig) -> Result<Pipeline> {
    let llm_config = LlmConfig {
        base_url: config.llm_base_url.clone(),
        api_key: config.llm_api_key.clone(),
        model: config.llm_model.clone(),
        temperature: 0.1,
        max_tokens: 20000,
    };
    let llm = Arc::new(OpenAiCompatibleLlm::new(llm_config)?);
    let fulltext = Arc::new(HttpFullTextFetcher::default());
    let citations = Arc::new(CrossrefCitationResolver::new(config.backends.crossref.concurrency));

    let mut registry = AdapterRegistry::new();
    registry.register(Arc::new(OpenAlexAdapter::new(config.backends.openalex.clone())));
    registry.register(Arc::new(ScopusAdapter::new(config.scopus_api_key.clone(), config.backends.scopus.clone())));
    registry.register(Arc::new(CoreAdapter::new(config.core_api_key.clone(), config.backends.core.clone())));
    registry.register(Arc::new(ArxivAdapter::new(config.backends.arxiv.clone())));
    registry.register(Arc::new(SemanticScholarAdapter::new(
        config.semantic_scholar_api_key.clone(),
        config.backends.semantic_scholar.clone(),
    )));

    Ok(Pipeline::new(
        llm,
        fulltext,
        citations,
        registry,
        config.adjudication_concurrency,
        config.ranking_group_concurrency,
    ))
}

#[allow(clippy::too_many_arguments)]
async fn run_research(
    config: PipelineConfig,
    query: String,
    ranking_guidance: String,
    num_queries: usize,
    papers_per_query: usize,
    num_papers: usize,
    platforms: Option<String>,
    min_year: Option<i32>,
    max_year: Option<i32>,
    output_dir: PathBuf,
) -> Result<()> {
    let pipeline = build_pipeline(&config)?;

    let mut parameters = PipelineParameters {
        num_queries,
        papers_per_query,
        num_papers_to_return: num_papers,
        min_year,
        max_year,
        ..Default::default()
    };
    if let Some(platforms) = platforms {
        parameters.enabled_platforms = platforms.split(',').map(|s| s.trim().to_string()).collect();
    }

    let request = AnalyzeRequest {
        query: QueryInput::Single(query.clone()),
        ranking_guidance,
        parameters,
        exclusion_schema: IndexMap::<String, FieldDef>::new(),
        data_extraction_schema: IndexMap::<String, FieldDef>::new(),
    };

    let timestamp = Local::now().to_rfc3339();
    info!(query = %query, "starting research pipeline run");
    let analysis = pipeline.analyze_request(request, timestamp.clone()).await;

    let safe_query: String =
        query.chars().filter(|c| c.is_alphanumeric() || *c == ' ').collect::<String>().trim().replace(' ', "_");
    let folder = output_dir.join(format!("{}_{}", Local::now().format("%Y%m%d_%H%M%S"), safe_query));
    std::fs::create_dir_all(&folder).context("failed to create output directory")?;

    let report = AnalysisReport::from(&analysis);
    let report_path = folder.join("report.json");
    std::fs::write(&report_path, serde_json::to_string_pretty(&report)?).context("failed to write report")?;

    println!("Ranked {} papers; report written to {}", analysis.ranked_papers.len(), report_path.display());
    Ok(())
}

async fn run_server(config: PipelineConfig, host: String, port: u16) -> Result<()> {
    let pipeline = Arc::new(build_pipeline(&config)?);

    let app = Router::new()
        .route("/health", get(health_handler))
        .route("/analyze", post(analyze_handler))
        .with_state(pipeline);

    let addr: SocketAddr = format!("{}:{}", host, port).parse().context("invalid host:port")?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "listening");
    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}

async fn health_handler() -> &'static str {
    "OK"
}

#[derive(Debug, Deserialize)]
struct AnalyzeHttpRequest {
    query: QueryInput,
    #[serde(default)]
    ranking_guidance: String,
    #[serde(default)]
    parameters: PipelineParameters,
    #[serde(default)]
    exclusion_schema: IndexMap<String, FieldDef>,
    #[serde(default)]
    data_extraction_schema: IndexMap<String, FieldDef>,
}

#[derive(Debug, Serialize)]
struct AnalyzeHttpResponse {
    status: String,
    ranked_count: usize,
}

async fn analyze_handler(
    State(pipeline): State<Arc<Pipeline>>,
    Json(req): Json<AnalyzeHttpRequest>,
) -> Json<serde_json::Value> {
    let request = AnalyzeRequest {
        query: req.query,
        ranking_guidance: req.ranking_guidance,
        parameters: req.parameters,
        exclusion_schema: req.exclusion_schema,
        data_extraction_schema: req.data_extraction_schema,
    };

    let timestamp = Local::now().to_rfc3339();
    let analysis = pipeline.analyze_request(request, timestamp).await;
    let ranked_count = analysis.ranked_papers.len();

    match serde_json::to_value(AnalysisReport::from(&analysis)) {
        Ok(value) => Json(value),
        Err(e) => {
            error!(error = %e, "failed to serialize analysis report");
            Json(serde_json::to_value(AnalyzeHttpResponse { status: "error".to_string(), ranked_count }).unwrap_or_default())
        }
    }
}
