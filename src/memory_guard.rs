//! Host and accelerator memory-pressure tracking (C1).
//!
//! Callers that must block wait on [`MemoryGuard::wait_for_recovery`]; callers that
//! can self-shed (the text embedder's batch sizing) query
//! [`MemoryGuard::is_under_pressure`] directly.

use std::sync::{Arc, Mutex};

use sysinfo::System;
use tokio::time::{sleep, Duration};

const POLL_INTERVAL: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy)]
pub struct MemorySnapshot {
    pub total: u64,
    pub available: u64,
    pub free: u64,
    pub used: u64,
    pub percent: f64,
    pub accelerator_free: Option<u64>,
}

type AcceleratorProbe = Arc<dyn Fn() -> Option<u64> + Send + Sync>;

pub struct MemoryGuard {
    min_free_bytes: u64,
    system: Mutex<System>,
    accelerator_probe: Option<AcceleratorProbe>,
}

impl MemoryGuard {
    pub fn new(min_free_bytes: u64) -> Self {
        Self {
            min_free_bytes,
            system: Mutex::new(System::new()),
            accelerator_probe: None,
        }
    }

    /// Install a probe for accelerator-free-bytes (e.g. an MPS/CUDA query). Absent a
    /// probe, pressure is judged on host memory alone.
    pub fn with_accelerator_probe(mut self, probe: AcceleratorProbe) -> Self {
        self.accelerator_probe = Some(probe);
        self
    }

    pub fn min_free_bytes(&self) -> u64 {
        self.min_free_bytes
    }

    pub fn snapshot(&self) -> MemorySnapshot {
        let mut system = self.system.lock().expect("memory guard mutex poisoned");
        system.refresh_memory();
        let accelerator_free = self.accelerator_probe.as_ref().and_then(|probe| probe());
        let total = system.total_memory();
        let used = system.used_memory();
        let free = system.free_memory();
        let available = system.available_memory();
        let percent = if total > 0 {
            (used as f64 / total as f64) * 100.0
        } else {
            0.0
        };
        MemorySnapshot {
            total,
            available,
            free,
            used,
            percent,
            accelerator_free,
        }
    }

    pub fn is_under_pressure(&self) -> bool {
        let snap = self.snapshot();
        tracing::debug!(free = snap.free, available = snap.available, accelerator_free = ?snap.accelerator_free, "memory snapshot");
        snap.free < self.min_free_bytes
            || snap
                .accelerator_free
                .is_some_and(|free| free < self.min_free_bytes)
    }

    /// Polls at a coarse cadence until pressure clears.
    pub async fn wait_for_recovery(&self) {
        while self.is_under_pressure() {
            tracing::warn!(min_free = self.min_free_bytes, "memory pressure detected; backing off");
            sleep(POLL_INTERVAL).await;
        }
    }
}

impl Default for MemoryGuard {
    fn default() -> Self {
        Self::new(1_500 * 1024 * 1024)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pressure_triggers_on_impossible_threshold() {
        let guard = MemoryGuard::new(u64::MAX);
        assert!(guard.is_under_pressure());
    }

    #[test]
    fn no_pressure_with_zero_threshold() {
        let guard = MemoryGuard::new(0);
        assert!(!guard.is_under_pressure());
    }

    #[test]
    fn accelerator_probe_drives_pressure() {
        let guard = MemoryGuard::new(0).with_accelerator_probe(Arc::new(|| Some(1)));
        assert!(guard.is_under_pressure());
    }
}
