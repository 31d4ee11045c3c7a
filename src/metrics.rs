//! Client-side metrics in Prometheus text format (RED: Rate, Errors, Duration).

use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Upper bucket bounds in seconds. +Inf is reported from count.
const DURATION_BUCKETS: [f64; 11] = [
    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
];

/// Histogram for one operation: buckets + count + sum (microseconds).
#[derive(Debug, Default)]
struct DurationHistogram {
    buckets: [AtomicU64; 11],
    count: AtomicU64,
    sum_micros: AtomicU64,
}

impl DurationHistogram {
    fn observe(&self, duration: Duration) {
        let micros = duration.as_micros().min(u64::MAX as u128) as u64;
        let secs = duration.as_secs_f64();
        // Only the first matching bucket is incremented; render() accumulates.
        if let Some(i) = DURATION_BUCKETS.iter().position(|&le| secs <= le) {
            self.buckets[i].fetch_add(1, Ordering::Relaxed);
        }
        self.count.fetch_add(1, Ordering::Relaxed);
        self.sum_micros.fetch_add(micros, Ordering::Relaxed);
    }
}

#[derive(Debug, Default)]
struct OpStats {
    requests: AtomicU64,
    errors: AtomicU64,
    duration: DurationHistogram,
}

/// Counters shared by a connection's handle, dispatcher and reader.
#[derive(Debug, Default)]
pub struct Metrics {
    pub connections_total: AtomicU64,
    /// Responses that arrived for a message id nobody was waiting on.
    pub dropped_frames: AtomicU64,
    pub decode_errors: AtomicU64,
    pub timeouts: AtomicU64,
    pub abandons: AtomicU64,
    ops: DashMap<&'static str, OpStats>,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn inc_connections(&self) {
        self.connections_total.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn inc_dropped_frame(&self) {
        self.dropped_frames.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn inc_decode_error(&self) {
        self.decode_errors.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn inc_timeout(&self) {
        self.timeouts.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn inc_abandon(&self) {
        self.abandons.fetch_add(1, Ordering::Relaxed);
    }

    /// Record one completed operation.
    pub fn record(&self, op: &'static str, duration: Duration, ok: bool) {
        let stats = self.ops.entry(op).or_default();
        stats.requests.fetch_add(1, Ordering::Relaxed);
        if !ok {
            stats.errors.fetch_add(1, Ordering::Relaxed);
        }
        stats.duration.observe(duration);
    }

    pub fn requests(&self, op: &str) -> u64 {
        self.ops
            .get(op)
            .map(|s| s.requests.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    pub fn errors(&self, op: &str) -> u64 {
        self.ops
            .get(op)
            .map(|s| s.errors.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    /// Render in Prometheus exposition format.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for (name, help, value) in [
            (
                "ldap_client_connections_total",
                "Total number of connections opened.",
                &self.connections_total,
            ),
            (
                "ldap_client_dropped_frames_total",
                "Responses received for message ids with no pending request.",
                &self.dropped_frames,
            ),
            (
                "ldap_client_decode_errors_total",
                "Frames that could not be decoded.",
                &self.decode_errors,
            ),
            (
                "ldap_client_timeouts_total",
                "Requests that timed out waiting for a response.",
                &self.timeouts,
            ),
            (
                "ldap_client_abandons_total",
                "Abandon requests sent.",
                &self.abandons,
            ),
        ] {
            out.push_str(&format!("# HELP {} {}\n", name, help));
            out.push_str(&format!("# TYPE {} counter\n", name));
            out.push_str(&format!("{} {}\n", name, value.load(Ordering::Relaxed)));
        }

        let mut ops: Vec<&'static str> = self.ops.iter().map(|e| *e.key()).collect();
        ops.sort_unstable();

        out.push_str("# HELP ldap_client_requests_total Total LDAP operations by type.\n");
        out.push_str("# TYPE ldap_client_requests_total counter\n");
        for op in &ops {
            out.push_str(&format!(
                "ldap_client_requests_total{{op=\"{}\"}} {}\n",
                op,
                self.requests(op)
            ));
        }

        out.push_str("# HELP ldap_client_errors_total Failed LDAP operations by type.\n");
        out.push_str("# TYPE ldap_client_errors_total counter\n");
        for op in &ops {
            out.push_str(&format!(
                "ldap_client_errors_total{{op=\"{}\"}} {}\n",
                op,
                self.errors(op)
            ));
        }

        out.push_str("# HELP ldap_client_request_duration_seconds Operation duration in seconds by type.\n");
        out.push_str("# TYPE ldap_client_request_duration_seconds histogram\n");
        for op in &ops {
            let Some(stats) = self.ops.get(op) else {
                continue;
            };
            let hist = &stats.duration;
            let count = hist.count.load(Ordering::Relaxed);
            let mut cum = 0u64;
            for (i, &le) in DURATION_BUCKETS.iter().enumerate() {
                cum += hist.buckets[i].load(Ordering::Relaxed);
                out.push_str(&format!(
                    "ldap_client_request_duration_seconds_bucket{{op=\"{}\",le=\"{}\"}} {}\n",
                    op, le, cum
                ));
            }
            out.push_str(&format!(
                "ldap_client_request_duration_seconds_bucket{{op=\"{}\",le=\"+Inf\"}} {}\n",
                op, count
            ));
            let sum_secs = hist.sum_micros.load(Ordering::Relaxed) as f64 / 1_000_000.0;
            out.push_str(&format!(
                "ldap_client_request_duration_seconds_sum{{op=\"{}\"}} {}\n",
                op, sum_secs
            ));
            out.push_str(&format!(
                "ldap_client_request_duration_seconds_count{{op=\"{}\"}} {}\n",
                op, count
            ));
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use super::Metrics;
    use std::time::Duration;

    #[test]
    fn test_record_counts_requests_and_errors() {
        let m = Metrics::default();
        m.record("search", Duration::from_millis(3), true);
        m.record("search", Duration::from_millis(30), false);
        m.record("bind", Duration::from_millis(1), true);
        assert_eq!(m.requests("search"), 2);
        assert_eq!(m.errors("search"), 1);
        assert_eq!(m.errors("bind"), 0);
        assert_eq!(m.requests("delete"), 0);
    }

    #[test]
    fn test_render() {
        let m = Metrics::default();
        m.inc_connections();
        m.inc_timeout();
        m.record("search", Duration::from_millis(3), true);
        m.record("search", Duration::from_millis(30), false);
        let out = m.render();
        assert!(out.contains("ldap_client_connections_total 1"));
        assert!(out.contains("ldap_client_timeouts_total 1"));
        assert!(out.contains("ldap_client_requests_total{op=\"search\"} 2"));
        assert!(out.contains("ldap_client_errors_total{op=\"search\"} 1"));
        assert!(out.contains("ldap_client_request_duration_seconds_bucket{op=\"search\",le=\"0.005\"} 1"));
        assert!(out.contains("ldap_client_request_duration_seconds_bucket{op=\"search\",le=\"0.05\"} 2"));
        assert!(out.contains("ldap_client_request_duration_seconds_count{op=\"search\"} 2"));
    }
}
