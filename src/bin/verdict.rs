#![forbid(unsafe_code)]

use std::path::PathBuf;

use async_trait::async_trait;
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

use verdict_harness::analysis::{AssistantLabels, ComparisonEngine};
use verdict_harness::client::{
    auto_score_pending, human_message, AssistantClient, JudgeClient,
};
use verdict_harness::config::{EvalConfig, DEFAULT_CONFIG_FILE};
use verdict_harness::report::render_markdown;
use verdict_harness::runner::{
    BatchEvent, BatchObserver, BatchRunHandle, BatchRunner, ItemOutcome, ObserverError,
};
use verdict_harness::sampling::StratifiedSampler;
use verdict_harness::store::JsonStore;
use verdict_harness::tracker::ProgressTracker;
use verdict_harness::types::{Assistant, ResponseRecord, ScoreSet, ScoreSource, Stage};

#[derive(Parser)]
#[command(name = "verdict", version, about = "Paired AI-assistant evaluation harness")]
struct Cli {
    /// Data directory holding the three campaign datasets
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Path to config.json
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum AssistantArg {
    A,
    B,
}

impl From<AssistantArg> for Assistant {
    fn from(value: AssistantArg) -> Self {
        match value {
            AssistantArg::A => Assistant::A,
            AssistantArg::B => Assistant::B,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum StageArg {
    AssistantA,
    AssistantB,
    Scoring,
}

impl From<StageArg> for Stage {
    fn from(value: StageArg) -> Self {
        match value {
            StageArg::AssistantA => Stage::AssistantA,
            StageArg::AssistantB => Stage::AssistantB,
            StageArg::Scoring => Stage::Scoring,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Show completion statistics
    Status,
    /// List queries still needing a stage
    Queue {
        #[arg(long, value_enum)]
        stage: StageArg,
        #[arg(long)]
        size: Option<usize>,
    },
    /// Run a response-collection batch against an assistant's API
    Batch {
        #[arg(long, value_enum, default_value = "a")]
        assistant: AssistantArg,
        /// Batch size; defaults to the configured batch_size
        #[arg(long)]
        size: Option<usize>,
    },
    /// Save an externally collected response for one query
    ImportResponse {
        #[arg(long, value_enum, default_value = "b")]
        assistant: AssistantArg,
        #[arg(long)]
        query_id: u64,
        /// File holding the raw response text
        #[arg(long)]
        file: PathBuf,
        #[arg(long)]
        response_time_ms: Option<f64>,
    },
    /// Draw the stratified manual-scoring sample
    Sample {
        #[arg(long)]
        size: Option<usize>,
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Save manual scores for one query from a JSON file
    Score {
        #[arg(long)]
        query_id: u64,
        /// JSON file with assistant_a / assistant_b score blocks
        #[arg(long)]
        file: PathBuf,
    },
    /// Score all remaining unscored queries with the LLM judge
    AutoScore {
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Run the full statistical analysis, as JSON
    Analyze {
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Render the markdown comparison report
    Report {
        #[arg(long)]
        out: PathBuf,
    },
    /// Show one query with its stored responses and scores
    Query {
        id: u64,
    },
    /// Re-derive the progress cache from the results dataset
    RebuildProgress,
    /// Back up and clear the progress cache
    ResetProgress,
    /// Estimate API cost for a number of queries
    EstimateCost {
        #[arg(long)]
        queries: usize,
    },
}

/// Persists each successful result as the batch produces it, so a crash
/// mid-batch loses at most the in-flight item.
struct StoreObserver {
    store: JsonStore,
    assistant: Assistant,
}

#[async_trait]
impl BatchObserver for StoreObserver {
    async fn on_item(&self, event: BatchEvent) -> Result<(), ObserverError> {
        eprintln!(
            "[batch] {}/{} query {}",
            event.processed, event.total, event.query_id
        );
        if let Some(record) = event.result {
            self.store
                .save_result(event.query_id, self.assistant, record)
                .map_err(|e| ObserverError::Message(e.to_string()))?;
        }
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let config = EvalConfig::load(
        cli.config
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE)),
    )?;
    let store = JsonStore::new(cli.data_dir.clone().unwrap_or_else(JsonStore::default_dir))?;
    let tracker = ProgressTracker::new(store.clone());
    let labels = AssistantLabels {
        a: config.assistant_a_label.clone(),
        b: config.assistant_b_label.clone(),
    };

    match cli.command {
        Commands::Status => {
            let stats = tracker.completion_stats()?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }

        Commands::Queue { stage, size } => {
            let queries = tracker.queries_needing(stage.into(), size)?;
            println!("{} queries outstanding", queries.len());
            for q in queries {
                println!("  {:>4}  [{}] {}", q.id, q.category, q.text);
            }
        }

        Commands::Batch { assistant, size } => {
            let assistant: Assistant = assistant.into();
            let stage = match assistant {
                Assistant::A => Stage::AssistantA,
                Assistant::B => Stage::AssistantB,
            };
            let queries = tracker.queries_needing(stage, Some(size.unwrap_or(config.batch_size)))?;
            if queries.is_empty() {
                println!("No queries need {} responses", stage.as_str());
                return Ok(());
            }

            let model = match assistant {
                Assistant::A => config.assistant_a_model.clone(),
                Assistant::B => config.assistant_b_model.clone().ok_or(
                    "no API model configured for assistant B; collect responses manually and use import-response",
                )?,
            };
            let client = AssistantClient::from_env(model, config.temperature, config.max_tokens)?;

            let runner = BatchRunner::new(config.runner_config(), BatchRunHandle::new());
            let observer = StoreObserver {
                store: store.clone(),
                assistant,
            };
            let summary = runner.run(&queries, &client, Some(&observer)).await?;

            println!("{}", summary.completion_message());
            for report in summary.reports.iter().filter(|r| !r.is_success()) {
                if let ItemOutcome::Exhausted { error, .. } = &report.outcome {
                    println!("  query {}: {}", report.query_id, human_message(error));
                }
            }
        }

        Commands::ImportResponse {
            assistant,
            query_id,
            file,
            response_time_ms,
        } => {
            let text = std::fs::read_to_string(&file)?;
            if text.trim().is_empty() {
                return Err("response file is empty".into());
            }
            let record = ResponseRecord {
                text,
                timestamp: chrono::Utc::now(),
                response_time_ms,
                token_usage: None,
                web_search_used: false,
                citation_count: 0,
                model: None,
                finish_reason: None,
            };
            store.save_result(query_id, assistant.into(), record)?;
            println!("Saved response for query {query_id}");
        }

        Commands::Sample { size, seed } => {
            let size = size.unwrap_or(config.sample_size);
            let stats = tracker.completion_stats()?;
            let min = config.min_responses_for_sample;
            if stats.assistant_a_responses < min || stats.assistant_b_responses < min {
                return Err(format!(
                    "need at least {min} responses per assistant before sampling (have {} / {})",
                    stats.assistant_a_responses, stats.assistant_b_responses
                )
                .into());
            }
            let candidates = tracker.queries_needing(Stage::Scoring, None)?;
            if candidates.len() < size {
                return Err(format!(
                    "need at least {size} queries with both responses; have {}",
                    candidates.len()
                )
                .into());
            }

            let sampler = StratifiedSampler::new(seed.unwrap_or(config.sampler_seed));
            let sample = sampler.select(&candidates, size);
            let distribution = StratifiedSampler::distribution(&sample);
            println!("{}", serde_json::to_string_pretty(&distribution)?);
            println!(
                "ids: {:?}",
                sample.iter().map(|q| q.id).collect::<Vec<_>>()
            );
        }

        Commands::Score { query_id, file } => {
            #[derive(serde::Deserialize)]
            struct ManualScoresFile {
                assistant_a: verdict_harness::types::AssistantScores,
                assistant_b: verdict_harness::types::AssistantScores,
                #[serde(default)]
                notes: Option<String>,
            }
            let raw = std::fs::read_to_string(&file)?;
            let manual: ManualScoresFile = serde_json::from_str(&raw)?;
            let scores = ScoreSet {
                assistant_a: manual.assistant_a,
                assistant_b: manual.assistant_b,
                source: ScoreSource::Manual,
                notes: manual.notes,
                timestamp: chrono::Utc::now(),
            };
            store.save_scores(query_id, scores)?;
            println!("Saved manual scores for query {query_id}");
        }

        Commands::AutoScore { limit } => {
            let judge = JudgeClient::from_env(config.judge_model.clone())?;
            let summary = auto_score_pending(&store, &judge, limit).await?;
            println!(
                "Auto-scored {} queries ({} skipped)",
                summary.scored, summary.skipped
            );
            for error in &summary.errors {
                println!("  {}", human_message(error));
            }
        }

        Commands::Analyze { out } => {
            let engine = ComparisonEngine::from_store(&store, labels.clone())?;
            let analysis = engine.full_analysis()?;
            let insights = engine.generate_insights(&analysis);

            let mut doc = serde_json::to_value(&analysis)?;
            doc["insights"] = serde_json::to_value(&insights)?;
            let rendered = serde_json::to_string_pretty(&doc)?;
            match out {
                Some(path) => {
                    std::fs::write(&path, rendered)?;
                    eprintln!("analysis written to {}", path.display());
                }
                None => println!("{rendered}"),
            }
        }

        Commands::Report { out } => {
            let engine = ComparisonEngine::from_store(&store, labels.clone())?;
            let analysis = engine.full_analysis()?;
            let insights = engine.generate_insights(&analysis);
            std::fs::write(&out, render_markdown(&analysis, &insights, &labels))?;
            eprintln!("report written to {}", out.display());
        }

        Commands::Query { id } => {
            let query = store
                .load_queries()?
                .into_iter()
                .find(|q| q.id == id)
                .ok_or_else(|| format!("query {id} not found"))?;
            println!("{}", serde_json::to_string_pretty(&query)?);
            if let Some(entry) = store.load_results()?.get(&id) {
                println!("{}", serde_json::to_string_pretty(entry)?);
            } else {
                println!("no results recorded yet");
            }
        }

        Commands::RebuildProgress => {
            let progress = tracker.rebuild_cache()?;
            println!("Progress cache rebuilt for {} queries", progress.len());
        }

        Commands::ResetProgress => {
            store.reset_progress()?;
            println!("Progress cache backed up and cleared");
        }

        Commands::EstimateCost { queries } => {
            let assistant =
                AssistantClient::new("unused", config.assistant_a_model.clone())?;
            let judge = JudgeClient::new("unused", config.judge_model.clone())?;
            println!(
                "{}",
                serde_json::to_string_pretty(&assistant.estimate_cost(queries, 500))?
            );
            println!("{}", serde_json::to_string_pretty(&judge.estimate_cost(queries))?);
        }
    }

    Ok(())
}
