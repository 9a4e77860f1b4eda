//! Prometheus metrics for the schema enforcement and chat pipelines.
//!
//! All metrics register to a single process-wide registry so `/metrics` in
//! `advisor-server` can export everything through one encoder call.

use std::sync::OnceLock;

use prometheus::{Encoder, Histogram, HistogramOpts, IntCounterVec, Opts, Registry, TextEncoder};

struct AdvisorMetrics {
    registry: Registry,
    json_pass_total: IntCounterVec,
    json_retry_pass_total: IntCounterVec,
    json_fail_total: IntCounterVec,
    json_fallback_total: IntCounterVec,
    json_enforce_ms: Histogram,
    chat_requests_total: IntCounterVec,
    chat_first_token_ms: Histogram,
    context_provider_ms: Histogram,
    cache_invalidations_total: IntCounterVec,
}

static METRICS: OnceLock<AdvisorMetrics> = OnceLock::new();

#[allow(clippy::expect_used)]
fn get_or_init() -> &'static AdvisorMetrics {
    METRICS.get_or_init(|| {
        let registry = Registry::new();

        let json_pass_total = IntCounterVec::new(
            Opts::new("advisor_json_pass_total", "Schema-valid completions on first try"),
            &["endpoint"],
        )
        .expect("valid json_pass_total opts");

        let json_retry_pass_total = IntCounterVec::new(
            Opts::new(
                "advisor_json_retry_pass_total",
                "Schema-valid completions after a re-ask",
            ),
            &["endpoint"],
        )
        .expect("valid json_retry_pass_total opts");

        let json_fail_total = IntCounterVec::new(
            Opts::new(
                "advisor_json_fail_total",
                "Completions that fell through to the regex fallback",
            ),
            &["endpoint"],
        )
        .expect("valid json_fail_total opts");

        let json_fallback_total = IntCounterVec::new(
            Opts::new(
                "advisor_json_fallback_total",
                "Times the regex fallback extractor produced the final payload",
            ),
            &["endpoint"],
        )
        .expect("valid json_fallback_total opts");

        let json_enforce_ms = Histogram::with_opts(
            HistogramOpts::new(
                "advisor_json_enforce_duration_ms",
                "Time spent in extract/repair/validate/sanitize",
            )
            .buckets(vec![1.0, 2.0, 5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0]),
        )
        .expect("valid json_enforce_ms opts");

        let chat_requests_total = IntCounterVec::new(
            Opts::new("advisor_chat_requests_total", "Chat requests by outcome"),
            &["outcome"],
        )
        .expect("valid chat_requests_total opts");

        let chat_first_token_ms = Histogram::with_opts(
            HistogramOpts::new(
                "advisor_chat_first_token_ms",
                "Latency to the first streamed token",
            )
            .buckets(vec![50.0, 100.0, 250.0, 500.0, 1000.0, 2000.0, 4000.0]),
        )
        .expect("valid chat_first_token_ms opts");

        let context_provider_ms = Histogram::with_opts(
            HistogramOpts::new(
                "advisor_context_provider_duration_ms",
                "Per-provider fetch latency",
            )
            .buckets(vec![5.0, 10.0, 25.0, 50.0, 100.0, 150.0, 250.0]),
        )
        .expect("valid context_provider_ms opts");

        let cache_invalidations_total = IntCounterVec::new(
            Opts::new("advisor_cache_invalidations_total", "Tag cache invalidations by tag"),
            &["tag"],
        )
        .expect("valid cache_invalidations_total opts");

        for (collector, name): (Box<dyn prometheus::core::Collector>, &str) in [
            (Box::new(json_pass_total.clone()) as _, "advisor_json_pass_total"),
            (Box::new(json_retry_pass_total.clone()) as _, "advisor_json_retry_pass_total"),
            (Box::new(json_fail_total.clone()) as _, "advisor_json_fail_total"),
            (Box::new(json_fallback_total.clone()) as _, "advisor_json_fallback_total"),
            (Box::new(json_enforce_ms.clone()) as _, "advisor_json_enforce_duration_ms"),
            (Box::new(chat_requests_total.clone()) as _, "advisor_chat_requests_total"),
            (Box::new(chat_first_token_ms.clone()) as _, "advisor_chat_first_token_ms"),
            (Box::new(context_provider_ms.clone()) as _, "advisor_context_provider_duration_ms"),
            (Box::new(cache_invalidations_total.clone()) as _, "advisor_cache_invalidations_total"),
        ] {
            if let Err(err) = registry.register(collector) {
                if !matches!(err, prometheus::Error::AlreadyReg) {
                    tracing::warn!(metric_name = name, error = %err, "failed to register metric");
                }
            }
        }

        AdvisorMetrics {
            registry,
            json_pass_total,
            json_retry_pass_total,
            json_fail_total,
            json_fallback_total,
            json_enforce_ms,
            chat_requests_total,
            chat_first_token_ms,
            context_provider_ms,
            cache_invalidations_total,
        }
    })
}

pub fn record_json_pass(endpoint: &str) {
    get_or_init().json_pass_total.with_label_values(&[endpoint]).inc();
}

pub fn record_json_retry_pass(endpoint: &str) {
    get_or_init()
        .json_retry_pass_total
        .with_label_values(&[endpoint])
        .inc();
}

pub fn record_json_fail(endpoint: &str) {
    get_or_init().json_fail_total.with_label_values(&[endpoint]).inc();
}

pub fn record_json_fallback(endpoint: &str) {
    get_or_init()
        .json_fallback_total
        .with_label_values(&[endpoint])
        .inc();
}

pub fn observe_json_enforce_ms(duration_ms: f64) {
    get_or_init().json_enforce_ms.observe(duration_ms);
}

pub fn record_chat_request(outcome: &str) {
    get_or_init().chat_requests_total.with_label_values(&[outcome]).inc();
}

pub fn observe_chat_first_token_ms(duration_ms: f64) {
    get_or_init().chat_first_token_ms.observe(duration_ms);
}

pub fn observe_context_provider_ms(duration_ms: f64) {
    get_or_init().context_provider_ms.observe(duration_ms);
}

pub fn record_cache_invalidation(tag: &str) {
    get_or_init()
        .cache_invalidations_total
        .with_label_values(&[tag])
        .inc();
}

/// Render every registered metric in Prometheus text exposition format.
pub fn render() -> Result<String, String> {
    let metrics = get_or_init();
    let encoder = TextEncoder::new();
    let families = metrics.registry.gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&families, &mut buffer)
        .map_err(|e| format!("failed to encode metrics: {e}"))?;
    String::from_utf8(buffer).map_err(|e| format!("metrics buffer was not utf8: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_includes_registered_metric_families() {
        record_json_pass("chat");
        record_chat_request("success");
        observe_json_enforce_ms(12.5);

        let rendered = render().unwrap();
        assert!(rendered.contains("advisor_json_pass_total"));
        assert!(rendered.contains("advisor_chat_requests_total"));
        assert!(rendered.contains("advisor_json_enforce_duration_ms"));
    }
}
