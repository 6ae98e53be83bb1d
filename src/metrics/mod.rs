//! Metrics collection for observability
//!
//! A `Metrics` value owns its own registry and is passed by `Arc` to the
//! components that record into it.

use prometheus::{
    register_counter_vec_with_registry, register_counter_with_registry,
    register_histogram_vec_with_registry, register_histogram_with_registry, Counter, CounterVec,
    Encoder, Histogram, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder,
};

/// Metrics collector
pub struct Metrics {
    registry: Registry,

    // Selection metrics
    pub selections_total: CounterVec,
    pub selection_cache: CounterVec,
    pub selection_fallbacks: Counter,

    // Execution metrics
    pub tool_executions: CounterVec,
    pub tool_duration: HistogramVec,

    // Context metrics
    pub context_tokens: Histogram,
    pub context_files: Histogram,
}

impl Metrics {
    /// Create a new metrics collector
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let selections_total = register_counter_vec_with_registry!(
            Opts::new("selections_total", "Total selections by strategy"),
            &["strategy"],
            registry
        )?;

        let selection_cache = register_counter_vec_with_registry!(
            Opts::new("selection_cache_lookups_total", "Selection cache lookups"),
            &["result"],
            registry
        )?;

        let selection_fallbacks = register_counter_with_registry!(
            Opts::new(
                "selection_fallbacks_total",
                "Selections that degraded to the fallback result"
            ),
            registry
        )?;

        let tool_executions = register_counter_vec_with_registry!(
            Opts::new("tool_executions_total", "Tool executions by outcome"),
            &["status"],
            registry
        )?;

        let tool_duration = register_histogram_vec_with_registry!(
            "tool_duration_seconds",
            "Tool execution duration in seconds",
            &["tool"],
            registry
        )?;

        let context_tokens = register_histogram_with_registry!(
            HistogramOpts::new("context_tokens", "Estimated tokens per optimized context")
                .buckets(vec![100.0, 500.0, 1000.0, 2000.0, 4000.0, 8000.0, 16000.0]),
            registry
        )?;

        let context_files = register_histogram_with_registry!(
            HistogramOpts::new("context_files", "Files included per optimized context")
                .buckets(vec![1.0, 5.0, 10.0, 20.0, 50.0]),
            registry
        )?;

        Ok(Self {
            registry,
            selections_total,
            selection_cache,
            selection_fallbacks,
            tool_executions,
            tool_duration,
            context_tokens,
            context_files,
        })
    }

    pub fn record_selection(&self, strategy: &str) {
        self.selections_total.with_label_values(&[strategy]).inc();
    }

    pub fn record_cache_lookup(&self, hit: bool) {
        let label = if hit { "hit" } else { "miss" };
        self.selection_cache.with_label_values(&[label]).inc();
    }

    pub fn record_tool(&self, tool: &str, success: bool, seconds: f64) {
        let status = if success { "success" } else { "error" };
        self.tool_executions.with_label_values(&[status]).inc();
        self.tool_duration.with_label_values(&[tool]).observe(seconds);
    }

    pub fn record_context(&self, tokens: usize, files: usize) {
        self.context_tokens.observe(tokens as f64);
        self.context_files.observe(files as f64);
    }

    /// Render all metrics in the Prometheus text format
    pub fn render(&self) -> String {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        if encoder.encode(&metric_families, &mut buffer).is_err() {
            return String::new();
        }
        String::from_utf8(buffer).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_creation() {
        assert!(Metrics::new().is_ok());
    }

    #[test]
    fn test_independent_registries() {
        // no global state: two collectors never conflict
        let a = Metrics::new().unwrap();
        let b = Metrics::new().unwrap();
        a.record_selection("hybrid");
        assert_eq!(a.selections_total.with_label_values(&["hybrid"]).get(), 1.0);
        assert_eq!(b.selections_total.with_label_values(&["hybrid"]).get(), 0.0);
    }

    #[test]
    fn test_render_contains_recorded_series() {
        let metrics = Metrics::new().unwrap();
        metrics.record_cache_lookup(true);
        metrics.record_tool("code_search", false, 0.25);
        metrics.record_context(1200, 4);

        let text = metrics.render();
        assert!(text.contains("selection_cache_lookups_total"));
        assert!(text.contains("tool_executions_total"));
        assert!(text.contains("context_tokens"));
    }
}
