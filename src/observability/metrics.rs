//! Metrics registry
//!
//! - Counters only
//! - Monotonic increase, reset only on process start
//! - Relaxed atomics; exact totals, no ordering guarantees between counters

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Operational counters for one executor (or shared across several)
#[derive(Debug, Default)]
pub struct MetricsRegistry {
    queries_executed: AtomicU64,
    queries_failed: AtomicU64,
    rows_returned: AtomicU64,
    safety_limits_applied: AtomicU64,
    complexity_warnings: AtomicU64,
    batch_tasks_timed_out: AtomicU64,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment_queries_executed(&self) {
        self.queries_executed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_queries_failed(&self) {
        self.queries_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_rows_returned(&self, rows: u64) {
        self.rows_returned.fetch_add(rows, Ordering::Relaxed);
    }

    pub fn increment_safety_limits(&self) {
        self.safety_limits_applied.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_complexity_warnings(&self, count: u64) {
        self.complexity_warnings.fetch_add(count, Ordering::Relaxed);
    }

    pub fn increment_batch_timeouts(&self) {
        self.batch_tasks_timed_out.fetch_add(1, Ordering::Relaxed);
    }

    /// Current values of every counter
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            queries_executed: self.queries_executed.load(Ordering::Relaxed),
            queries_failed: self.queries_failed.load(Ordering::Relaxed),
            rows_returned: self.rows_returned.load(Ordering::Relaxed),
            safety_limits_applied: self.safety_limits_applied.load(Ordering::Relaxed),
            complexity_warnings: self.complexity_warnings.load(Ordering::Relaxed),
            batch_tasks_timed_out: self.batch_tasks_timed_out.load(Ordering::Relaxed),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self.snapshot()).unwrap_or(serde_json::Value::Null)
    }
}

/// A point-in-time snapshot of all metrics
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub queries_executed: u64,
    pub queries_failed: u64,
    pub rows_returned: u64,
    pub safety_limits_applied: u64,
    pub complexity_warnings: u64,
    pub batch_tasks_timed_out: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_registry_has_zero_values() {
        let snapshot = MetricsRegistry::new().snapshot();
        assert_eq!(snapshot.queries_executed, 0);
        assert_eq!(snapshot.rows_returned, 0);
    }

    #[test]
    fn test_counters() {
        let registry = MetricsRegistry::new();
        registry.increment_queries_executed();
        registry.increment_queries_executed();
        registry.increment_queries_failed();
        registry.add_rows_returned(40);
        registry.increment_safety_limits();
        registry.add_complexity_warnings(2);
        registry.increment_batch_timeouts();

        let s = registry.snapshot();
        assert_eq!(s.queries_executed, 2);
        assert_eq!(s.queries_failed, 1);
        assert_eq!(s.rows_returned, 40);
        assert_eq!(s.safety_limits_applied, 1);
        assert_eq!(s.complexity_warnings, 2);
        assert_eq!(s.batch_tasks_timed_out, 1);
    }

    #[test]
    fn test_to_json() {
        let registry = MetricsRegistry::new();
        registry.add_rows_returned(7);
        assert_eq!(registry.to_json()["rows_returned"], 7);
    }

    #[test]
    fn test_thread_safety() {
        use std::sync::Arc;
        use std::thread;

        let registry = Arc::new(MetricsRegistry::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let reg = Arc::clone(&registry);
                thread::spawn(move || {
                    for _ in 0..100 {
                        reg.increment_queries_executed();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(registry.snapshot().queries_executed, 800);
    }
}
