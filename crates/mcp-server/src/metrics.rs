//! Process-scoped metrics: per-tool samples plus recovery-queue
//! gauges, with a JSON summary and Prometheus text rendering.

use std::collections::BTreeMap;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;

const MAX_TOOL_SAMPLES: usize = 1000;
const MAX_QUEUE_GAUGES: usize = 100;

/// One completed tool invocation.
#[derive(Debug, Clone, Serialize)]
pub struct ToolSample {
    pub tool: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub duration_ms: u64,
    pub success: bool,
    pub error_code: Option<String>,
}

/// Snapshot of the recovery queue.
#[derive(Debug, Clone, Serialize)]
pub struct QueueGauge {
    pub queue_size: usize,
    pub processing_count: usize,
    pub success_count: u64,
    pub failure_count: u64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ToolSummary {
    pub count: usize,
    pub success_count: usize,
    pub failure_count: usize,
    pub avg_duration_ms: f64,
    pub p50_ms: u64,
    pub p95_ms: u64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct QueueSummary {
    pub current_size: usize,
    pub processed: u64,
    pub success: u64,
    pub failure: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricsSummary {
    pub uptime_ms: u64,
    pub tools: BTreeMap<String, ToolSummary>,
    pub queue: QueueSummary,
}

#[derive(Default)]
struct Inner {
    samples: VecDeque<ToolSample>,
    gauges: VecDeque<QueueGauge>,
}

pub struct MetricsCollector {
    inner: Mutex<Inner>,
    started: Instant,
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            started: Instant::now(),
        }
    }

    /// Record a completed tool invocation. The oldest sample is
    /// dropped past 1000 entries.
    pub fn record_tool(
        &self,
        tool: &str,
        duration: Duration,
        success: bool,
        error_code: Option<&str>,
    ) {
        let end_time = Utc::now();
        let sample = ToolSample {
            tool: tool.to_string(),
            start_time: end_time - chrono::Duration::milliseconds(duration.as_millis() as i64),
            end_time,
            duration_ms: duration.as_millis() as u64,
            success,
            error_code: error_code.map(str::to_string),
        };

        let mut inner = self.lock();
        inner.samples.push_back(sample);
        while inner.samples.len() > MAX_TOOL_SAMPLES {
            inner.samples.pop_front();
        }
    }

    /// Record a recovery-queue snapshot. The oldest gauge is dropped
    /// past 100 entries.
    pub fn record_queue(&self, gauge: QueueGauge) {
        let mut inner = self.lock();
        inner.gauges.push_back(gauge);
        while inner.gauges.len() > MAX_QUEUE_GAUGES {
            inner.gauges.pop_front();
        }
    }

    /// Derive the summary from a copy of the sample buffer.
    pub fn summary(&self) -> MetricsSummary {
        let (samples, last_gauge) = {
            let inner = self.lock();
            (
                inner.samples.iter().cloned().collect::<Vec<_>>(),
                inner.gauges.back().cloned(),
            )
        };

        let mut tools: BTreeMap<String, Vec<&ToolSample>> = BTreeMap::new();
        for sample in &samples {
            tools.entry(sample.tool.clone()).or_default().push(sample);
        }

        let tools = tools
            .into_iter()
            .map(|(tool, samples)| {
                let mut durations: Vec<u64> = samples.iter().map(|s| s.duration_ms).collect();
                durations.sort_unstable();
                let success_count = samples.iter().filter(|s| s.success).count();
                let total: u64 = durations.iter().sum();
                let summary = ToolSummary {
                    count: samples.len(),
                    success_count,
                    failure_count: samples.len() - success_count,
                    avg_duration_ms: total as f64 / samples.len() as f64,
                    p50_ms: percentile(&durations, 0.50),
                    p95_ms: percentile(&durations, 0.95),
                };
                (tool, summary)
            })
            .collect();

        let queue = last_gauge
            .map(|g| QueueSummary {
                current_size: g.queue_size,
                processed: g.success_count + g.failure_count,
                success: g.success_count,
                failure: g.failure_count,
            })
            .unwrap_or_default();

        MetricsSummary {
            uptime_ms: self.started.elapsed().as_millis() as u64,
            tools,
            queue,
        }
    }

    /// Render the summary in Prometheus text exposition format.
    pub fn to_prometheus_format(&self) -> String {
        let summary = self.summary();
        let mut out = String::new();

        out.push_str("# HELP mcp_tool_requests_total Total tool invocations\n");
        out.push_str("# TYPE mcp_tool_requests_total counter\n");
        for (tool, stats) in &summary.tools {
            out.push_str(&format!(
                "mcp_tool_requests_total{{tool=\"{tool}\"}} {}\n",
                stats.count
            ));
        }

        out.push_str("# HELP mcp_tool_success_total Successful tool invocations\n");
        out.push_str("# TYPE mcp_tool_success_total counter\n");
        for (tool, stats) in &summary.tools {
            out.push_str(&format!(
                "mcp_tool_success_total{{tool=\"{tool}\"}} {}\n",
                stats.success_count
            ));
        }

        out.push_str("# HELP mcp_tool_failure_total Failed tool invocations\n");
        out.push_str("# TYPE mcp_tool_failure_total counter\n");
        for (tool, stats) in &summary.tools {
            out.push_str(&format!(
                "mcp_tool_failure_total{{tool=\"{tool}\"}} {}\n",
                stats.failure_count
            ));
        }

        out.push_str("# HELP mcp_tool_duration_p50_ms Median tool latency\n");
        out.push_str("# TYPE mcp_tool_duration_p50_ms gauge\n");
        for (tool, stats) in &summary.tools {
            out.push_str(&format!(
                "mcp_tool_duration_p50_ms{{tool=\"{tool}\"}} {}\n",
                stats.p50_ms
            ));
        }

        out.push_str("# HELP mcp_tool_duration_p95_ms 95th percentile tool latency\n");
        out.push_str("# TYPE mcp_tool_duration_p95_ms gauge\n");
        for (tool, stats) in &summary.tools {
            out.push_str(&format!(
                "mcp_tool_duration_p95_ms{{tool=\"{tool}\"}} {}\n",
                stats.p95_ms
            ));
        }

        out.push_str("# HELP mcp_tool_success_rate Fraction of successful invocations\n");
        out.push_str("# TYPE mcp_tool_success_rate gauge\n");
        for (tool, stats) in &summary.tools {
            let rate = if stats.count == 0 {
                0.0
            } else {
                stats.success_count as f64 / stats.count as f64
            };
            out.push_str(&format!(
                "mcp_tool_success_rate{{tool=\"{tool}\"}} {rate}\n"
            ));
        }

        out.push_str("# HELP mcp_index_queue_size Entries waiting in the index recovery queue\n");
        out.push_str("# TYPE mcp_index_queue_size gauge\n");
        out.push_str(&format!(
            "mcp_index_queue_size {}\n",
            summary.queue.current_size
        ));

        out
    }

    /// Drop all samples and gauges; uptime keeps running.
    pub fn reset(&self) {
        let mut inner = self.lock();
        inner.samples.clear();
        inner.gauges.clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// Nearest-rank percentile of an ascending-sorted slice.
fn percentile(sorted: &[u64], q: f64) -> u64 {
    if sorted.is_empty() {
        return 0;
    }
    let rank = ((sorted.len() as f64) * q).ceil() as usize;
    sorted[rank.clamp(1, sorted.len()) - 1]
}
