use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use sysinfo::{Pid, System};

/// Process-wide counters for requests served and messages ingested, plus
/// host resource gauges sampled on each snapshot.
#[derive(Debug, Default)]
pub struct Metrics {
    pub current_requests: AtomicU64,
    pub day_average_requests: AtomicU64,
    pub week_average_requests: AtomicU64,
    pub day_range_requests: AtomicU64,
    pub week_range_requests: AtomicU64,
    pub messages_received: AtomicU64,
    pub readings_stored: AtomicU64,
    pub parse_failures: AtomicU64,
    pub store_failures: AtomicU64,
    resources: ResourceGauges,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    #[serde(rename = "weather.current.temperature.requests")]
    pub current_requests: u64,
    #[serde(rename = "weather.average.temperature.lastday.requests")]
    pub day_average_requests: u64,
    #[serde(rename = "weather.average.temperature.lastweek.requests")]
    pub week_average_requests: u64,
    #[serde(rename = "weather.range.temperature.lastday.requests")]
    pub day_range_requests: u64,
    #[serde(rename = "weather.range.temperature.lastweek.requests")]
    pub week_range_requests: u64,
    #[serde(rename = "weather.ingest.messages.received")]
    pub messages_received: u64,
    #[serde(rename = "weather.ingest.readings.stored")]
    pub readings_stored: u64,
    #[serde(rename = "weather.ingest.parse.failures")]
    pub parse_failures: u64,
    #[serde(rename = "weather.ingest.store.failures")]
    pub store_failures: u64,
    /// Resident memory of this process, in bytes.
    #[serde(rename = "process.memory.used")]
    pub memory_used_bytes: u64,
    /// Mean load across all CPUs, `0.0..=1.0`; 0 until a second sample exists.
    #[serde(rename = "system.cpu.usage")]
    pub cpu_usage: f64,
}

impl Metrics {
    pub fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let get = |c: &AtomicU64| c.load(Ordering::Relaxed);
        let (memory_used_bytes, cpu_usage) = self.resources.sample();
        MetricsSnapshot {
            current_requests: get(&self.current_requests),
            day_average_requests: get(&self.day_average_requests),
            week_average_requests: get(&self.week_average_requests),
            day_range_requests: get(&self.day_range_requests),
            week_range_requests: get(&self.week_range_requests),
            messages_received: get(&self.messages_received),
            readings_stored: get(&self.readings_stored),
            parse_failures: get(&self.parse_failures),
            store_failures: get(&self.store_failures),
            memory_used_bytes,
            cpu_usage,
        }
    }
}

/// CPU usage is a delta between refreshes, so one `System` is kept around.
struct ResourceGauges {
    system: Mutex<System>,
    pid: Option<Pid>,
}

impl Default for ResourceGauges {
    fn default() -> Self {
        Self {
            system: Mutex::new(System::new()),
            pid: sysinfo::get_current_pid().ok(),
        }
    }
}

impl std::fmt::Debug for ResourceGauges {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceGauges").field("pid", &self.pid).finish()
    }
}

impl ResourceGauges {
    /// `(memory used in bytes, cpu usage in 0.0..=1.0)`; zero where unavailable.
    fn sample(&self) -> (u64, f64) {
        let mut sys = match self.system.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        sys.refresh_cpu();
        let cpus = sys.cpus();
        let cpu_usage = if cpus.is_empty() {
            0.0
        } else {
            let percent = cpus.iter().map(|cpu| cpu.cpu_usage() as f64).sum::<f64>() / cpus.len() as f64;
            if percent.is_finite() {
                (percent / 100.0).clamp(0.0, 1.0)
            } else {
                0.0
            }
        };

        let memory_used = match self.pid {
            Some(pid) if sys.refresh_process(pid) => sys.process(pid).map_or(0, |p| p.memory()),
            _ => 0,
        };
        (memory_used, cpu_usage)
    }
}
