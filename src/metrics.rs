//! Observability (C8): token-savings counters/gauges for `find_tool`, and
//! per-tool call latency tracking for `call_tool`.
//!
//! Metric emission never fails the request: the `metrics` crate's macros
//! are no-ops when no recorder has been installed, so a missing exporter
//! degrades silently rather than erroring.

use std::collections::VecDeque;
use std::net::SocketAddr;

use dashmap::DashMap;
use metrics::{counter, gauge};
use metrics_exporter_prometheus::PrometheusBuilder;

use crate::error::{OptimizerError, OptimizerResult};
use crate::store::Tool;

const LATENCY_WINDOW: usize = 100;

/// Install a process-wide Prometheus recorder with an HTTP scrape listener
/// at `listen_address`. Must run inside a Tokio runtime; call at most once
/// per process, from the host binary's startup path, not per-session.
pub fn install_prometheus_recorder(listen_address: SocketAddr) -> OptimizerResult<()> {
    PrometheusBuilder::new()
        .with_http_listener(listen_address)
        .install()
        .map_err(|e| OptimizerError::Config(format!("failed to install prometheus recorder: {e}")))
}

/// Bounded recent-window latency tracker for one `(backend_id, tool_name)`
/// pair, mirroring a hand-rolled inventory's per-tool latency stats but
/// feeding the real `metrics` crate instead of an ad-hoc atomic snapshot.
#[derive(Default)]
struct LatencyStats {
    window: VecDeque<u64>,
    calls: u64,
    failures: u64,
}

impl LatencyStats {
    fn record(&mut self, duration_ms: u64, success: bool) {
        self.calls += 1;
        if !success {
            self.failures += 1;
        }
        self.window.push_back(duration_ms);
        if self.window.len() > LATENCY_WINDOW {
            self.window.pop_front();
        }
    }

    fn snapshot(&self) -> LatencySnapshot {
        let min = self.window.iter().min().copied().unwrap_or(0);
        let max = self.window.iter().max().copied().unwrap_or(0);
        let avg = if self.window.is_empty() {
            0.0
        } else {
            self.window.iter().sum::<u64>() as f64 / self.window.len() as f64
        };
        LatencySnapshot {
            calls: self.calls,
            failures: self.failures,
            min_ms: min,
            max_ms: max,
            avg_ms: avg,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LatencySnapshot {
    pub calls: u64,
    pub failures: u64,
    pub min_ms: u64,
    pub max_ms: u64,
    pub avg_ms: f64,
}

/// Emits the optimizer's token-savings and call-latency metrics.
#[derive(Default)]
pub struct Observability {
    tool_latencies: DashMap<String, LatencyStats>,
}

impl Observability {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the outcome of one `find_tool` invocation.
    pub fn record_find_tool(&self, baseline_tokens: u64, returned_tokens: u64, tokens_saved: u64) {
        counter!("vmcp_optimizer_baseline_tokens", "operation" => "find_tool")
            .increment(baseline_tokens);
        counter!("vmcp_optimizer_returned_tokens", "operation" => "find_tool")
            .increment(returned_tokens);
        counter!("vmcp_optimizer_tokens_saved", "operation" => "find_tool")
            .increment(tokens_saved);
        let savings_percent = if baseline_tokens == 0 {
            0.0
        } else {
            (tokens_saved as f64 / baseline_tokens as f64) * 100.0
        };
        gauge!("vmcp_optimizer_savings_percent", "operation" => "find_tool").set(savings_percent);
    }

    /// Record the outcome of one `call_tool` invocation.
    pub fn record_call(&self, backend_id: &str, tool_name: &str, success: bool, duration_ms: u64) {
        let result = if success { "success" } else { "failure" };
        counter!(
            "vmcp_optimizer_calls_total",
            "operation" => "call_tool",
            "backend_id" => backend_id.to_string(),
            "result" => result
        )
        .increment(1);

        let key = format!("{backend_id}:{tool_name}");
        self.tool_latencies
            .entry(key)
            .or_default()
            .record(duration_ms, success);
    }

    pub fn tool_latency(&self, backend_id: &str, tool_name: &str) -> Option<LatencySnapshot> {
        self.tool_latencies
            .get(&format!("{backend_id}:{tool_name}"))
            .map(|stats| stats.snapshot())
    }
}

/// Compute the token metrics triple returned alongside `find_tool` results.
pub fn token_metrics(baseline_tokens: u64, matches: &[Tool]) -> (u64, u64, f64) {
    let returned_tokens: u64 = matches.iter().map(|t| t.token_count as u64).sum();
    let tokens_saved = baseline_tokens.saturating_sub(returned_tokens);
    let savings_percent = if baseline_tokens == 0 {
        0.0
    } else {
        (tokens_saved as f64 / baseline_tokens as f64) * 100.0
    };
    (returned_tokens, tokens_saved, savings_percent)
}
