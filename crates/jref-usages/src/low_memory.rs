use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Signal polled by scans after every analysed unit. When it fires, buffered
/// records are handed to the writer early.
pub trait LowMemory: Send + Sync {
    fn is_low_memory(&self) -> bool;
}

/// Compares the process RSS against a memory budget.
#[derive(Debug)]
pub struct ProcessMemoryWatcher {
    budget_bytes: u64,
    threshold: f64,
}

impl ProcessMemoryWatcher {
    /// `budget_bytes` defaults to total system memory. `threshold` is the
    /// fraction of the budget above which memory counts as low.
    pub fn new(budget_bytes: Option<u64>, threshold: f64) -> Self {
        let budget_bytes = budget_bytes.unwrap_or_else(total_system_memory);
        let threshold = if threshold.is_finite() && threshold > 0.0 {
            threshold
        } else {
            0.9
        };
        Self {
            budget_bytes,
            threshold,
        }
    }

    pub fn from_config(config: &jref_config::IndexConfig) -> Self {
        Self::new(config.memory_budget_bytes, config.low_memory_threshold)
    }

    pub fn budget_bytes(&self) -> u64 {
        self.budget_bytes
    }

    /// Whether `rss_bytes` is over the threshold. A zero budget never is.
    pub fn is_over(&self, rss_bytes: u64) -> bool {
        if self.budget_bytes == 0 {
            return false;
        }
        rss_bytes as f64 / self.budget_bytes as f64 >= self.threshold
    }
}

impl LowMemory for ProcessMemoryWatcher {
    fn is_low_memory(&self) -> bool {
        current_rss_bytes().is_some_and(|rss| self.is_over(rss))
    }
}

fn total_system_memory() -> u64 {
    let mut sys = sysinfo::System::new();
    sys.refresh_memory();
    sys.total_memory()
}

/// Resident set size from `/proc/self/status`, where available.
pub fn current_rss_bytes() -> Option<u64> {
    #[cfg(target_os = "linux")]
    {
        let status = match std::fs::read_to_string("/proc/self/status") {
            Ok(status) => status,
            Err(err) => {
                if err.kind() != std::io::ErrorKind::NotFound {
                    tracing::debug!(
                        target: "jref.usages",
                        error = %err,
                        "failed to read /proc/self/status while sampling rss"
                    );
                }
                return None;
            }
        };
        let kb = status
            .lines()
            .find_map(|line| line.trim_start().strip_prefix("VmRSS:"))?
            .split_whitespace()
            .next()?
            .parse::<u64>()
            .ok()?;
        Some(kb.saturating_mul(1024))
    }

    #[cfg(not(target_os = "linux"))]
    {
        None
    }
}

/// Switchable signal for tests. It can also fire once every `n` polls.
#[derive(Debug, Default)]
pub struct ManualLowMemory {
    low: AtomicBool,
    every: AtomicU64,
    polls: AtomicU64,
}

impl ManualLowMemory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, low: bool) {
        self.low.store(low, Ordering::SeqCst);
    }

    /// Fire on every `n`th poll; `0` disables the cadence.
    pub fn fire_every(&self, n: u64) {
        self.every.store(n, Ordering::SeqCst);
    }

    pub fn polls(&self) -> u64 {
        self.polls.load(Ordering::SeqCst)
    }
}

impl LowMemory for ManualLowMemory {
    fn is_low_memory(&self) -> bool {
        let poll = self.polls.fetch_add(1, Ordering::SeqCst) + 1;
        let every = self.every.load(Ordering::SeqCst);
        self.low.load(Ordering::SeqCst) || (every > 0 && poll % every == 0)
    }
}

/// Never reports low memory.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoLowMemory;

impl LowMemory for NoLowMemory {
    fn is_low_memory(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn threshold_is_a_fraction_of_the_budget() {
        let watcher = ProcessMemoryWatcher::new(Some(1000), 0.5);
        assert!(!watcher.is_over(499));
        assert!(watcher.is_over(500));
        assert!(!ProcessMemoryWatcher::new(Some(0), 0.5).is_over(u64::MAX));
    }

    #[test]
    fn manual_signal_fires_on_cadence() {
        let signal = ManualLowMemory::new();
        signal.fire_every(3);
        let fired: Vec<bool> = (0..6).map(|_| signal.is_low_memory()).collect();
        assert_eq!(fired, vec![false, false, true, false, false, true]);
        signal.fire_every(0);
        signal.set(true);
        assert!(signal.is_low_memory());
        assert_eq!(signal.polls(), 7);
    }
}
