#![forbid(unsafe_code)]

//! # verdict-harness
//!
//! Paired evaluation harness for comparing two AI assistants on a fixed
//! query set.
//!
//! A campaign moves each query through response collection (one response per
//! assistant, driven by a retrying batch runner) and scoring (manual on a
//! stratified validation sample, LLM-judged for the rest), all persisted in
//! backup-on-write JSON datasets. Fully-scored queries feed a paired
//! statistical comparison: descriptive summaries, paired t-tests with effect
//! sizes, categorical breakdowns, and automated insights.

pub mod analysis;
pub mod client;
pub mod config;
pub mod report;
pub mod runner;
pub mod sampling;
pub mod store;
pub mod tracker;
pub mod types;

pub use analysis::{AssistantLabels, ComparisonEngine, FullAnalysis, PairedTest};
pub use client::{AssistantClient, ClientError, JudgeClient, ResponseJudge};
pub use config::EvalConfig;
pub use runner::{BatchObserver, BatchRunHandle, BatchRunner, QueryInvoker, RunnerConfig};
pub use sampling::{SampleHandle, StratifiedSampler};
pub use store::{JsonStore, StoreError};
pub use tracker::{CompletionStats, ProgressTracker};
pub use types::{Assistant, Metric, Query, ResponseRecord, ScoreSet, ScoreSource, Stage};
