//! Adaptive per-host thread-count hinting and a process-wide connection budget.
//!
//! Supplements the documented per-task `threadCount` knob: when a caller
//! doesn't pin a thread count, the policy recommends one based on how a host
//! has behaved recently (steady good throughput steps the recommendation up;
//! throttling or errors step it back down). A user-supplied `threadCount`
//! always wins; the policy only ever supplies the default.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

/// Host identity used to key adaptive state: scheme + host + resolved port.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HostKey {
    pub scheme: String,
    pub host: String,
    pub port: u16,
}

impl HostKey {
    pub fn from_url(url: &str) -> Option<Self> {
        let parsed = url::Url::parse(url).ok()?;
        let scheme = parsed.scheme().to_string();
        let host = parsed.host_str()?.to_string();
        let port = parsed.port_or_known_default()?;
        Some(HostKey { scheme, host, port })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RangeSupport {
    Unknown,
    Supported,
    NotSupported,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostEntry {
    pub range_support: RangeSupport,
    pub throttled_events: u32,
    pub error_events: u32,
    pub success_events: u32,
    pub last_throughput_bytes_per_sec: f64,
    pub adaptive_thread_limit: u32,
}

impl HostEntry {
    fn new(default_threads: u32) -> Self {
        HostEntry {
            range_support: RangeSupport::Unknown,
            throttled_events: 0,
            error_events: 0,
            success_events: 0,
            last_throughput_bytes_per_sec: 0.0,
            adaptive_thread_limit: default_threads,
        }
    }
}

/// Good-throughput threshold (1 MiB/s) a job's average rate must clear to
/// step the recommendation up.
const GOOD_THROUGHPUT_BYTES_PER_SEC: f64 = 1024.0 * 1024.0;

/// Adaptive per-host state plus a fixed `[min_threads, max_threads]` clamp.
pub struct HostPolicy {
    entries: Mutex<HashMap<HostKey, HostEntry>>,
    min_threads: u32,
    max_threads: u32,
}

impl HostPolicy {
    pub fn new(min_threads: u32, max_threads: u32) -> Self {
        HostPolicy {
            entries: Mutex::new(HashMap::new()),
            min_threads,
            max_threads,
        }
    }

    fn entry_for<'a>(
        entries: &'a mut HashMap<HostKey, HostEntry>,
        key: &HostKey,
        default_threads: u32,
    ) -> &'a mut HostEntry {
        entries
            .entry(key.clone())
            .or_insert_with(|| HostEntry::new(default_threads))
    }

    pub fn record_head_result(&self, key: &HostKey, accept_ranges: bool, default_threads: u32) {
        let mut entries = self.entries.lock().expect("host policy mutex poisoned");
        let entry = Self::entry_for(&mut entries, key, default_threads);
        entry.range_support = if accept_ranges {
            RangeSupport::Supported
        } else {
            RangeSupport::NotSupported
        };
    }

    pub fn record_throttled(&self, key: &HostKey, default_threads: u32) {
        let mut entries = self.entries.lock().expect("host policy mutex poisoned");
        let entry = Self::entry_for(&mut entries, key, default_threads);
        entry.throttled_events += 1;
        entry.adaptive_thread_limit =
            (entry.adaptive_thread_limit / 2).clamp(self.min_threads, self.max_threads);
    }

    pub fn record_error(&self, key: &HostKey, default_threads: u32) {
        let mut entries = self.entries.lock().expect("host policy mutex poisoned");
        let entry = Self::entry_for(&mut entries, key, default_threads);
        entry.error_events += 1;
        entry.adaptive_thread_limit =
            (entry.adaptive_thread_limit / 2).clamp(self.min_threads, self.max_threads);
    }

    /// Records a completed job's sustained throughput; steps the
    /// recommendation up when it clears the good-throughput threshold.
    pub fn record_job_outcome(&self, key: &HostKey, bytes_per_sec: f64, default_threads: u32) {
        let mut entries = self.entries.lock().expect("host policy mutex poisoned");
        let entry = Self::entry_for(&mut entries, key, default_threads);
        entry.success_events += 1;
        entry.last_throughput_bytes_per_sec = bytes_per_sec;
        if bytes_per_sec >= GOOD_THROUGHPUT_BYTES_PER_SEC {
            entry.adaptive_thread_limit =
                (entry.adaptive_thread_limit * 2).clamp(self.min_threads, self.max_threads);
        }
    }

    /// Recommended default thread count for `url`, clamped to `[1, 16]` by
    /// the caller (task construction always clamps regardless).
    pub fn recommended_thread_count_for_url(&self, url: &str, default_threads: u32) -> u32 {
        let Some(key) = HostKey::from_url(url) else {
            return default_threads;
        };
        let entries = self.entries.lock().expect("host policy mutex poisoned");
        entries
            .get(&key)
            .map(|e| e.adaptive_thread_limit)
            .unwrap_or(default_threads)
    }

    /// Serializable snapshot for persistence.
    pub fn to_snapshot(&self) -> HostPolicySnapshot {
        let entries = self.entries.lock().expect("host policy mutex poisoned");
        HostPolicySnapshot {
            entries: entries
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        }
    }

    pub fn from_snapshot(snapshot: HostPolicySnapshot, min_threads: u32, max_threads: u32) -> Self {
        let policy = HostPolicy::new(min_threads, max_threads);
        {
            let mut entries = policy.entries.lock().expect("host policy mutex poisoned");
            for (k, v) in snapshot.entries {
                entries.insert(k, v);
            }
        }
        policy
    }
}

/// Flat, serde-friendly form of `HostPolicy` for saving/loading to disk.
#[derive(Debug, Serialize, Deserialize)]
pub struct HostPolicySnapshot {
    pub entries: Vec<(HostKey, HostEntry)>,
}

/// Process-wide budget bounding total in-flight connections across all
/// concurrent tasks, independent of each task's own thread count.
pub struct ConnectionBudget {
    limit: u32,
    in_use: AtomicU32,
}

/// RAII guard releasing its reserved slot on drop, even on an early return
/// or panic during a segment's download loop.
pub struct BudgetGuard<'a> {
    budget: &'a ConnectionBudget,
}

impl Drop for BudgetGuard<'_> {
    fn drop(&mut self) {
        self.budget.in_use.fetch_sub(1, Ordering::SeqCst);
    }
}

impl ConnectionBudget {
    pub fn new(limit: u32) -> Self {
        ConnectionBudget {
            limit: limit.max(1),
            in_use: AtomicU32::new(0),
        }
    }

    /// Attempts to reserve one connection slot; `None` if the budget is
    /// already fully committed.
    pub fn try_reserve(&self) -> Option<BudgetGuard<'_>> {
        let mut current = self.in_use.load(Ordering::SeqCst);
        loop {
            if current >= self.limit {
                return None;
            }
            match self.in_use.compare_exchange_weak(
                current,
                current + 1,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => return Some(BudgetGuard { budget: self }),
                Err(observed) => current = observed,
            }
        }
    }

    /// Reserves one connection slot, blocking (with brief polling) until one
    /// is free. Used per-connection by segment workers, since the budget
    /// caps total in-flight sockets across every concurrently running task,
    /// not just threads within one task.
    pub fn reserve_blocking(&self) -> BudgetGuard<'_> {
        loop {
            if let Some(guard) = self.try_reserve() {
                return guard;
            }
            std::thread::sleep(std::time::Duration::from_millis(10));
        }
    }

    pub fn in_use(&self) -> u32 {
        self.in_use.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_key_from_url_known_default_port() {
        let k = HostKey::from_url("https://example.com/file").unwrap();
        assert_eq!(k.scheme, "https");
        assert_eq!(k.host, "example.com");
        assert_eq!(k.port, 443);
    }

    #[test]
    fn recommendation_defaults_without_history() {
        let policy = HostPolicy::new(1, 16);
        assert_eq!(
            policy.recommended_thread_count_for_url("https://example.com/f", 4),
            4
        );
    }

    #[test]
    fn good_throughput_steps_up_and_throttle_steps_down() {
        let policy = HostPolicy::new(1, 16);
        let key = HostKey::from_url("https://example.com/f").unwrap();
        policy.record_job_outcome(&key, 2.0 * 1024.0 * 1024.0, 4);
        assert_eq!(
            policy.recommended_thread_count_for_url("https://example.com/f", 4),
            8
        );
        policy.record_throttled(&key, 4);
        assert_eq!(
            policy.recommended_thread_count_for_url("https://example.com/f", 4),
            4
        );
    }

    #[test]
    fn clamped_to_configured_bounds() {
        let policy = HostPolicy::new(2, 8);
        let key = HostKey::from_url("https://example.com/f").unwrap();
        for _ in 0..10 {
            policy.record_job_outcome(&key, 2.0 * 1024.0 * 1024.0, 4);
        }
        assert_eq!(
            policy.recommended_thread_count_for_url("https://example.com/f", 4),
            8
        );
    }

    #[test]
    fn snapshot_roundtrip() {
        let policy = HostPolicy::new(1, 16);
        let key = HostKey::from_url("https://example.com/f").unwrap();
        policy.record_job_outcome(&key, 2.0 * 1024.0 * 1024.0, 4);
        let snap = policy.to_snapshot();
        let restored = HostPolicy::from_snapshot(snap, 1, 16);
        assert_eq!(
            restored.recommended_thread_count_for_url("https://example.com/f", 4),
            8
        );
    }

    #[test]
    fn budget_reserve_and_release() {
        let budget = ConnectionBudget::new(2);
        let g1 = budget.try_reserve().unwrap();
        let g2 = budget.try_reserve().unwrap();
        assert!(budget.try_reserve().is_none());
        assert_eq!(budget.in_use(), 2);
        drop(g1);
        assert_eq!(budget.in_use(), 1);
        let _g3 = budget.try_reserve().unwrap();
        drop(g2);
    }
}
