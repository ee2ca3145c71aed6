//! Prometheus metrics for dm-service.

use prometheus::{Encoder, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder};
use std::sync::OnceLock;

/// The registry and the collectors registered in it, set together.
struct Metrics {
    registry: Registry,
    chat_requests_total: IntCounterVec,
    llm_latency_seconds: HistogramVec,
    llm_errors_total: IntCounterVec,
    passages_retrieved_total: IntCounterVec,
    vector_store_errors_total: IntCounterVec,
}

static METRICS: OnceLock<Metrics> = OnceLock::new();

/// Initialize all metrics. Later calls are no-ops.
pub fn init_metrics() -> Result<(), prometheus::Error> {
    if METRICS.get().is_some() {
        return Ok(());
    }
    let registry = Registry::new();

    // mode: stream, complete
    let chat_requests = IntCounterVec::new(
        Opts::new("dm_chat_requests_total", "Total chat requests handled"),
        &["action", "mode", "status"],
    )?;

    let llm_latency = HistogramVec::new(
        HistogramOpts::new("dm_llm_latency_seconds", "LLM backend latency in seconds")
            .buckets(vec![0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0]),
        &["provider", "call"],
    )?;

    let llm_errors = IntCounterVec::new(
        Opts::new("dm_llm_errors_total", "Total LLM backend errors"),
        &["provider", "error_type"],
    )?;

    let passages_retrieved = IntCounterVec::new(
        Opts::new("dm_passages_retrieved_total", "Passages retrieved per index"),
        &["index"],
    )?;

    let store_errors = IntCounterVec::new(
        Opts::new("dm_vector_store_errors_total", "Total vector store errors"),
        &["index", "operation"],
    )?;

    registry.register(Box::new(chat_requests.clone()))?;
    registry.register(Box::new(llm_latency.clone()))?;
    registry.register(Box::new(llm_errors.clone()))?;
    registry.register(Box::new(passages_retrieved.clone()))?;
    registry.register(Box::new(store_errors.clone()))?;

    // A concurrent caller may have won the race; its set is kept whole.
    if METRICS
        .set(Metrics {
            registry,
            chat_requests_total: chat_requests,
            llm_latency_seconds: llm_latency,
            llm_errors_total: llm_errors,
            passages_retrieved_total: passages_retrieved,
            vector_store_errors_total: store_errors,
        })
        .is_ok()
    {
        tracing::info!("Prometheus metrics initialized");
    }
    Ok(())
}

/// Get metrics in Prometheus text format.
pub fn get_metrics() -> String {
    let Some(metrics) = METRICS.get() else {
        tracing::error!("Metrics registry not initialized");
        return "# Metrics registry not initialized\n".to_string();
    };

    let mut buffer = Vec::new();
    if let Err(e) = TextEncoder::new().encode(&metrics.registry.gather(), &mut buffer) {
        tracing::error!(error = %e, "Failed to encode metrics");
        return format!("# Failed to encode metrics: {}\n", e);
    }

    String::from_utf8(buffer).unwrap_or_else(|e| {
        tracing::error!(error = %e, "Failed to convert metrics to UTF-8");
        format!("# Failed to convert metrics to UTF-8: {}\n", e)
    })
}

// Helper functions for recording metrics

pub fn record_chat_request(action: &str, mode: &str, status: &str) {
    if let Some(metrics) = METRICS.get() {
        metrics.chat_requests_total.with_label_values(&[action, mode, status]).inc();
    }
}

/// Record LLM latency. `call` is `reply` or `summary`.
pub fn record_llm_latency(provider: &str, call: &str, duration_secs: f64) {
    if let Some(metrics) = METRICS.get() {
        metrics
            .llm_latency_seconds
            .with_label_values(&[provider, call])
            .observe(duration_secs);
    }
}

pub fn record_llm_error(provider: &str, error_type: &str) {
    if let Some(metrics) = METRICS.get() {
        metrics.llm_errors_total.with_label_values(&[provider, error_type]).inc();
    }
}

pub fn record_passages(index: &str, count: usize) {
    if let Some(metrics) = METRICS.get() {
        metrics
            .passages_retrieved_total
            .with_label_values(&[index])
            .inc_by(count as u64);
    }
}

pub fn record_vector_store_error(index: &str, operation: &str) {
    if let Some(metrics) = METRICS.get() {
        metrics.vector_store_errors_total.with_label_values(&[index, operation]).inc();
    }
}
