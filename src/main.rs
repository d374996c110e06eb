//! flow-insight - process entry point
//!
//! Acquires the scoped resources once (model, metrics store), wires the
//! pipeline, and runs the window loop until the source ends or the window
//! budget is spent.

use std::env;
use std::sync::Arc;

use anyhow::Context;

use flow_insight::aggregate::{AccuracyAccumulator, DestinationAggregator};
use flow_insight::config::Config;
use flow_insight::ingest::window::{WindowBatcher, WindowPolicy};
use flow_insight::ingest::{FlowSource, JsonlSource, StdinSource};
use flow_insight::model::OnnxClassifier;
use flow_insight::pipeline::Pipeline;
use flow_insight::store::{RetryPolicy, SqliteMetricsWriter};

fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = Config::from_env();
    log::info!(
        "starting flow-insight: topic '{}', group '{}', brokers {:?}",
        config.topic,
        config.group_id,
        config.broker_addrs
    );
    log::info!(
        "window size {}, {} expected destinations, top-{} accuracy classes",
        config.window_size,
        config.expected_destinations.len(),
        config.top_classes
    );
    if config.expected_destinations.is_empty() {
        log::warn!("EXPECTED_DESTINATIONS is empty: every rate aggregate will be dropped");
    }

    // Scoped resources, acquired once and shared read-only / pooled
    let classifier = Arc::new(
        OnnxClassifier::load(&config.model_artifact, config.model_checksum.as_deref())
            .context("classifier startup")?,
    );
    let writer = Arc::new(
        SqliteMetricsWriter::open(
            &config.metrics_db,
            &config.expected_destinations,
            config.top_classes,
            RetryPolicy::default(),
        )
        .context("metrics store startup")?,
    );

    let mut pipeline = Pipeline::new(
        WindowBatcher::new(WindowPolicy::Count(config.window_size), config.poll_timeout),
        classifier,
        DestinationAggregator::new(config.expected_destinations.clone()),
        Arc::new(AccuracyAccumulator::new(config.top_classes)),
        writer,
        config.max_windows,
    );

    // The broker client lives outside this process: either replay a JSONL
    // capture, or pipe a console consumer into stdin.
    let mut source: Box<dyn FlowSource> = match env::var("FLOW_REPLAY") {
        Ok(path) => {
            log::info!("replaying flow records from {}", path);
            Box::new(JsonlSource::open(path.as_ref()).context("open replay file")?)
        }
        Err(_) => {
            log::info!("consuming flow records from stdin");
            Box::new(StdinSource::new())
        }
    };

    let stats = pipeline.run(source.as_mut())?;
    log::info!(
        "pipeline finished: {} windows, {} records, {} rejects, {} dropped aggregates, {} lost writes",
        stats.windows,
        stats.records,
        stats.rejects,
        stats.aggregates_dropped,
        stats.write_failures
    );

    Ok(())
}
