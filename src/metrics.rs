use metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::time::Duration;
use tracing::info;

/// Installs the Prometheus recorder and registers every metric this crate
/// emits. The HTTP surface that would normally scrape these is out of
/// scope here; a consumer links this crate's `execute()` entry points
/// directly and can wire up its own scrape endpoint against the same
/// global recorder.
pub fn init_metrics() -> anyhow::Result<()> {
    PrometheusBuilder::new()
        .idle_timeout(
            metrics_util::MetricKindMask::COUNTER | metrics_util::MetricKindMask::HISTOGRAM,
            Some(Duration::from_secs(30)),
        )
        .install()?;

    describe_counter!("chatlake_ingest_conversations_total", "Conversations ingested, by outcome");
    describe_counter!("chatlake_ingest_messages_total", "Messages ingested");
    describe_counter!("chatlake_parsing_failures_total", "Conversations that failed to parse");
    describe_counter!("chatlake_segments_written_total", "Segments written by the segmenter");
    describe_counter!("chatlake_suggestions_written_total", "Project suggestions written");

    describe_histogram!("chatlake_cluster_duration_seconds", "Wall time of a clustering run");
    describe_histogram!("chatlake_similarity_duration_seconds", "Wall time of a similarity run");
    describe_histogram!("chatlake_topics_duration_seconds", "Wall time of a topics run");
    describe_histogram!("chatlake_drift_duration_seconds", "Wall time of a drift run");

    info!("metrics system initialized");
    Ok(())
}

pub fn track_ingest(conversations_new: usize, conversations_remapped: usize, messages: usize, failures: usize) {
    counter!("chatlake_ingest_conversations_total", "outcome" => "new").increment(conversations_new as u64);
    counter!("chatlake_ingest_conversations_total", "outcome" => "remapped").increment(conversations_remapped as u64);
    counter!("chatlake_ingest_messages_total").increment(messages as u64);
    counter!("chatlake_parsing_failures_total").increment(failures as u64);
}

pub fn track_pipeline(name: &'static str, duration: Duration, items_written: usize) {
    histogram!(format!("chatlake_{name}_duration_seconds")).record(duration.as_secs_f64());
    match name {
        "segment" => counter!("chatlake_segments_written_total").increment(items_written as u64),
        "cluster" => counter!("chatlake_suggestions_written_total").increment(items_written as u64),
        _ => {}
    }
}
