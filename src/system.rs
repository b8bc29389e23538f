//! Host health figures for the status endpoint.

use std::path::Path;
use std::sync::{Mutex, PoisonError};

use serde::Serialize;
use sysinfo::{Components, Disks, System};
use tracing::trace;

const THERMAL_ZONE: &str = "/sys/class/thermal/thermal_zone0/temp";
const BYTES_PER_MB: f64 = 1024.0 * 1024.0;
const BYTES_PER_GB: f64 = 1024.0 * 1024.0 * 1024.0;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SystemStats {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory_free_mb: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpu_percent: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpu_temp: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disk_free_gb: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disk_used_percent: Option<f64>,
}

/// Keeps one `System` around so CPU usage is measured between calls.
#[derive(Debug)]
pub struct SystemMonitor {
    system: Mutex<System>,
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
        Self {
            system: Mutex::new(system),
        }
    }

    /// Collect a snapshot; `disk_path` selects the filesystem reported on.
    pub fn snapshot(&self, disk_path: &Path) -> SystemStats {
        let (memory_free_mb, cpu_percent) = {
            let mut system = self.system.lock().unwrap_or_else(PoisonError::into_inner);
            system.refresh_memory();
            system.refresh_cpu_usage();
            (
                Some(round1(system.available_memory() as f64 / BYTES_PER_MB)),
                Some(round1(f64::from(system.global_cpu_usage()))),
            )
        };
        let (disk_free_gb, disk_used_percent) = disk_usage(disk_path).unzip();
        let stats = SystemStats {
            memory_free_mb,
            cpu_percent,
            cpu_temp: cpu_temperature().map(round1),
            disk_free_gb,
            disk_used_percent,
        };
        trace!(?stats, "system snapshot");
        stats
    }
}

fn cpu_temperature() -> Option<f64> {
    let components = Components::new_with_refreshed_list();
    let readings: Vec<(String, f32)> = components
        .list()
        .iter()
        .filter_map(|c| {
            let temp: Option<f32> = c.temperature().into();
            temp.filter(|t| t.is_finite())
                .map(|t| (c.label().to_ascii_lowercase(), t))
        })
        .collect();
    let preferred = readings
        .iter()
        .find(|(label, _)| ["cpu", "soc", "package"].iter().any(|k| label.contains(k)))
        .or_else(|| readings.first());
    if let Some((_, temp)) = preferred {
        return Some(f64::from(*temp));
    }
    // Raspberry Pi kernels expose the SoC sensor here without hwmon labels.
    std::fs::read_to_string(THERMAL_ZONE)
        .ok()
        .and_then(|raw| raw.trim().parse::<f64>().ok())
        .map(|milli| milli / 1000.0)
}

/// Free GB and used percentage of the disk with the longest mount point
/// containing `path`.
fn disk_usage(path: &Path) -> Option<(f64, f64)> {
    let path = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
    let disks = Disks::new_with_refreshed_list();
    let disk = disks
        .list()
        .iter()
        .filter(|d| path.starts_with(d.mount_point()))
        .max_by_key(|d| d.mount_point().as_os_str().len())?;
    let total = disk.total_space();
    if total == 0 {
        return None;
    }
    let free = disk.available_space();
    let used = total.saturating_sub(free);
    Some((
        round1(free as f64 / BYTES_PER_GB),
        round1(used as f64 / total as f64 * 100.0),
    ))
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rounding_keeps_one_decimal() {
        assert_eq!(round1(12.345), 12.3);
        assert_eq!(round1(0.06), 0.1);
    }

    #[test]
    fn snapshot_reports_memory() {
        let monitor = SystemMonitor::new();
        let stats = monitor.snapshot(Path::new("/"));
        assert!(stats.memory_free_mb.is_some());
        assert!(stats.cpu_percent.is_some());
    }
}
