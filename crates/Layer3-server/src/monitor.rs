//! Host CPU and memory usage for the task manager app

use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use sysinfo::System;

/// Usage in percent, one decimal
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SystemStats {
    pub cpu: f64,
    pub ram: f64,
}

/// Shared sampler. CPU usage is measured between two refreshes, so each
/// call reports the load since the previous one.
#[derive(Clone)]
pub struct SystemMonitor {
    system: Arc<Mutex<System>>,
}

impl Default for SystemMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemMonitor {
    pub fn new() -> Self {
        let mut system = System::new();
        system.refresh_cpu_usage();
        system.refresh_memory();
        Self {
            system: Arc::new(Mutex::new(system)),
        }
    }

    pub fn sample(&self) -> SystemStats {
        let mut system = self.system.lock();
        system.refresh_cpu_usage();
        system.refresh_memory();

        SystemStats {
            cpu: round1(f64::from(system.global_cpu_usage())),
            ram: round1(percent(system.used_memory(), system.total_memory())),
        }
    }
}

fn percent(used: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    used as f64 * 100.0 / total as f64
}

fn round1(value: f64) -> f64 {
    (value.clamp(0.0, 100.0) * 10.0).round() / 10.0
}
