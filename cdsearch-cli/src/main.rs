use cdsearch::pipeline::{
    AggregatorConfig, Buckets, CoordinatorConfig, JobMonitor, JobOutcome, MaskSpec,
    MonitorConfig, ResultAggregator, SearchCoordinator, SearchJob, WorkQueue, WorkerConfig,
    WorkerPool,
};
use cdsearch::results::{keys, JSON_MIME_TYPE};
use cdsearch::store::{
    BlobStore, FsBlobStore, JobMetadataStore, JobStatus, MemoryJobStore, MemoryTaskStore,
};
use cdsearch::{BatchWorker, ImageFormat, SearchParams};
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

const SCHEMA_JSON: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/config.schema.json"));
const EXAMPLE_JSON: &str =
    include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/config.example.json"));

#[derive(Parser, Debug)]
#[command(author, version, about = "Color depth MIP search CLI (JSON config driven)")]
struct Cli {
    /// Path to the JSON configuration file.
    #[arg(short, long, value_name = "FILE", default_value = "config.json")]
    config: PathBuf,
    /// Print the JSON schema and exit.
    #[arg(long)]
    print_schema: bool,
    /// Print an example config and exit.
    #[arg(long)]
    print_example: bool,
    /// Enable tracing output for performance profiling.
    #[arg(long)]
    trace: bool,
}

#[derive(Debug, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct Config {
    /// Directory holding one sub-directory per bucket.
    store_root: PathBuf,
    buckets: Buckets,
    masks: Vec<MaskSpec>,
    /// Library keys to search; when empty every image under `library_prefix`.
    target_keys: Vec<String>,
    library_prefix: String,
    params: SearchParams,
    batch_size: usize,
    max_parallelism: usize,
    /// Worker threads; 0 uses every available core.
    threads: usize,
    timeout_secs: u64,
    keep_intermediate: bool,
    write_intermediate: bool,
    output_path: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        let coordinator = CoordinatorConfig::default();
        Self {
            store_root: PathBuf::from("."),
            buckets: Buckets::default(),
            masks: Vec::new(),
            target_keys: Vec::new(),
            library_prefix: String::new(),
            params: SearchParams::default(),
            batch_size: coordinator.batch_size,
            max_parallelism: coordinator.max_parallelism,
            threads: 0,
            timeout_secs: MonitorConfig::default().timeout.as_secs(),
            keep_intermediate: false,
            write_intermediate: false,
            output_path: None,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Output {
    job_id: String,
    status: JobStatus,
    total_matches: usize,
    targets: usize,
    partitions: usize,
    failed_batches: Vec<usize>,
    missing_batches: Vec<usize>,
    result_keys: Vec<String>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if cli.trace {
        tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env().add_directive("cdsearch=info".parse()?))
            .with_target(false)
            .init();
    }

    if cli.print_schema {
        println!("{SCHEMA_JSON}");
        return Ok(());
    }
    if cli.print_example {
        println!("{EXAMPLE_JSON}");
        return Ok(());
    }

    let config_text = fs::read_to_string(&cli.config)?;
    let config: Config = serde_json::from_str(&config_text)?;
    if config.masks.is_empty() {
        return Err("masks must list at least one mask".into());
    }
    if config.batch_size == 0 {
        return Err("batchSize must be at least 1".into());
    }

    let blobs = Arc::new(FsBlobStore::new(&config.store_root));
    let target_keys = if config.target_keys.is_empty() {
        blobs
            .list_keys(&config.buckets.library, &config.library_prefix)?
            .into_iter()
            .filter(|key| ImageFormat::from_key(key).is_ok())
            .collect()
    } else {
        config.target_keys.clone()
    };
    let targets = target_keys.len();

    let tasks = Arc::new(MemoryTaskStore::new());
    let jobs = Arc::new(MemoryJobStore::new());
    let queue = Arc::new(WorkQueue::new());

    let coordinator = SearchCoordinator::new(
        jobs.clone(),
        queue.clone(),
        CoordinatorConfig {
            batch_size: config.batch_size,
            max_parallelism: config.max_parallelism,
        },
    );
    let dispatch = coordinator.submit(SearchJob {
        job_id: None,
        masks: config.masks.clone(),
        target_keys,
        params: config.params.clone(),
        buckets: config.buckets.clone(),
    })?;
    queue.close();

    let threads = if config.threads == 0 {
        std::thread::available_parallelism().map_or(1, |n| n.get())
    } else {
        config.threads
    };
    let worker = BatchWorker::new(
        blobs.clone(),
        tasks.clone(),
        WorkerConfig {
            write_intermediate: config.write_intermediate,
            ..WorkerConfig::default()
        },
    );
    let pool = WorkerPool::new(worker, threads).run(&queue);
    for (batch_id, err) in &pool.failed {
        tracing::warn!(batch_id, error = %err, "batch failed");
    }

    let outcome = if pool.failed.is_empty() {
        JobMonitor::new(
            jobs.clone(),
            tasks.clone(),
            MonitorConfig {
                timeout: Duration::from_secs(config.timeout_secs),
                ..MonitorConfig::default()
            },
        )
        .wait(&dispatch.job_id)?
    } else {
        JobOutcome {
            completed: false,
            with_errors: true,
            ..JobOutcome::default()
        }
    };

    let aggregator = ResultAggregator::new(
        blobs.clone(),
        tasks,
        jobs.clone(),
        AggregatorConfig {
            keep_intermediate: config.keep_intermediate,
        },
    );
    let aggregated = aggregator.aggregate(&dispatch.job_id, &outcome);

    // The job record is kept next to the first mask, whatever the outcome.
    let meta = jobs.get(&dispatch.job_id)?;
    blobs.put(
        &config.buckets.results,
        &keys::search_metadata_key(&config.masks[0].key),
        serde_json::to_vec_pretty(&meta)?,
        JSON_MIME_TYPE,
    )?;
    let report = aggregated?;
    tracing::info!(
        job_id = report.job_id.as_str(),
        total_matches = report.total_matches,
        "search finished"
    );

    let mut failed_batches: Vec<usize> = dispatch
        .failures
        .iter()
        .filter_map(|err| match err {
            cdsearch::CdsError::BatchDispatch { batch_id, .. } => Some(*batch_id),
            _ => None,
        })
        .chain(pool.failed.iter().map(|(batch_id, _)| *batch_id))
        .collect();
    failed_batches.sort_unstable();

    let output = Output {
        job_id: report.job_id,
        status: report.status,
        total_matches: report.total_matches,
        targets,
        partitions: dispatch.partitions,
        failed_batches,
        missing_batches: report.missing_batches,
        result_keys: report.result_keys,
    };
    let json = serde_json::to_string_pretty(&output)?;

    match config.output_path {
        Some(path) => fs::write(path, json)?,
        None => println!("{json}"),
    }

    Ok(())
}
