//! Periodic resource sampling and budget checks for loaded plugins.
//!
//! The runtime offers no per-plugin memory or task accounting, so every
//! sample carries a host-wide reading: resident memory of the whole process
//! and the live task count of the current Tokio runtime. Budgets are
//! report-only; a violation is counted and surfaced as an error, but the
//! plugin keeps running.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use sysinfo::System;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::{PluginError, PluginResult};
use crate::plugin::ResourceBudget;

/// Interval between background samples when the host does not supply one.
pub const DEFAULT_MONITOR_INTERVAL: Duration = Duration::from_secs(30);

/// A point-in-time resource reading for one monitored plugin.
///
/// Memory and task figures describe the host process as a whole, not the
/// plugin in isolation. The violation count accumulates across samples and
/// is never reset by the background loop.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceSample {
    /// Plugin the sample belongs to.
    pub plugin_id: String,
    /// Resident memory of the host process, in megabytes.
    pub memory_mb: f64,
    /// Live tasks on the current Tokio runtime.
    pub task_count: usize,
    /// When the sample was taken.
    pub sampled_at: DateTime<Utc>,
    /// Cumulative number of budget violations recorded for this plugin.
    pub violations: u64,
    /// Whether the plugin has been throttled. Budgets are report-only, so
    /// this is always `false`.
    pub throttled: bool,
}

/// Samples host resource usage on a fixed interval and checks plugin
/// budgets against the latest reading.
pub struct ResourceMonitor {
    samples: Arc<RwLock<HashMap<String, ResourceSample>>>,
    system: Arc<Mutex<System>>,
    interval: Duration,
    started: AtomicBool,
    shutdown: CancellationToken,
}

impl ResourceMonitor {
    /// Creates a monitor that samples every `interval` once started.
    #[must_use]
    pub fn new(interval: Duration) -> Self {
        Self {
            samples: Arc::new(RwLock::new(HashMap::new())),
            system: Arc::new(Mutex::new(System::new_all())),
            interval,
            started: AtomicBool::new(false),
            shutdown: CancellationToken::new(),
        }
    }

    /// Takes an immediate sample and spawns the background sampling loop.
    ///
    /// The loop runs until [`ResourceMonitor::stop`] is called. Calling
    /// `start` again has no effect.
    ///
    /// # Panics
    ///
    /// Panics if an internal lock is poisoned.
    pub async fn start(&self) {
        if self.started.swap(true, Ordering::SeqCst) {
            return;
        }

        refresh_samples(&self.system, &self.samples).await;

        let samples = Arc::clone(&self.samples);
        let system = Arc::clone(&self.system);
        let shutdown = self.shutdown.clone();
        let period = self.interval;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            // The first tick completes immediately; the sample above already
            // covered it.
            ticker.tick().await;
            loop {
                tokio::select! {
                    () = shutdown.cancelled() => break,
                    _ = ticker.tick() => refresh_samples(&system, &samples).await,
                }
            }
            debug!("resource sampling loop exited");
        });

        info!(
            interval_secs = self.interval.as_secs(),
            "resource monitor started"
        );
    }

    /// Stops the background sampling loop.
    ///
    /// Later calls have no effect.
    pub fn stop(&self) {
        if !self.shutdown.is_cancelled() {
            self.shutdown.cancel();
            info!("resource monitor stopped");
        }
    }

    /// Starts tracking `plugin_id`, seeding it with a fresh sample.
    ///
    /// Registering an already-tracked plugin keeps the existing sample and
    /// its violation count.
    ///
    /// # Panics
    ///
    /// Panics if an internal lock is poisoned.
    pub async fn register(&self, plugin_id: &str) {
        {
            let samples = self.samples.read().expect("lock poisoned");
            if samples.contains_key(plugin_id) {
                return;
            }
        }

        let (memory_mb, task_count) = host_sample(&self.system).await;
        let inserted = {
            let mut samples = self.samples.write().expect("lock poisoned");
            match samples.entry(plugin_id.to_owned()) {
                Entry::Occupied(_) => false,
                Entry::Vacant(slot) => {
                    slot.insert(ResourceSample {
                        plugin_id: plugin_id.to_owned(),
                        memory_mb,
                        task_count,
                        sampled_at: Utc::now(),
                        violations: 0,
                        throttled: false,
                    });
                    true
                }
            }
        };
        if inserted {
            debug!(plugin_id = %plugin_id, "plugin registered for monitoring");
        }
    }

    /// Stops tracking `plugin_id`, discarding its sample.
    ///
    /// # Panics
    ///
    /// Panics if an internal lock is poisoned.
    pub fn unregister(&self, plugin_id: &str) {
        let mut samples = self.samples.write().expect("lock poisoned");
        if samples.remove(plugin_id).is_some() {
            drop(samples);
            debug!(plugin_id = %plugin_id, "plugin unregistered from monitoring");
        }
    }

    /// Returns the latest sample for `plugin_id`.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::NotMonitored`] if the plugin is not tracked.
    ///
    /// # Panics
    ///
    /// Panics if an internal lock is poisoned.
    pub fn metrics(&self, plugin_id: &str) -> PluginResult<ResourceSample> {
        let samples = self.samples.read().expect("lock poisoned");
        samples
            .get(plugin_id)
            .cloned()
            .ok_or_else(|| PluginError::NotMonitored(plugin_id.to_owned()))
    }

    /// Returns a snapshot of every tracked sample, sorted by plugin ID.
    ///
    /// # Panics
    ///
    /// Panics if an internal lock is poisoned.
    #[must_use]
    pub fn all_metrics(&self) -> Vec<ResourceSample> {
        let samples = self.samples.read().expect("lock poisoned");
        let mut all: Vec<ResourceSample> = samples.values().cloned().collect();
        drop(samples);
        all.sort_by(|a, b| a.plugin_id.cmp(&b.plugin_id));
        all
    }

    /// Checks the latest sample for `plugin_id` against `budget`.
    ///
    /// A missing budget always passes, even for untracked plugins. On a
    /// violation the plugin's violation count is incremented and an error
    /// returned; the plugin is never throttled or stopped.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::NotMonitored`] if a budget is present but the
    /// plugin is not tracked, and [`PluginError::ResourceLimitExceeded`]
    /// when any limit is breached.
    ///
    /// # Panics
    ///
    /// Panics if an internal lock is poisoned.
    #[allow(clippy::cast_precision_loss)]
    pub fn check_limits(
        &self,
        plugin_id: &str,
        budget: Option<&ResourceBudget>,
    ) -> PluginResult<()> {
        let Some(budget) = budget else {
            return Ok(());
        };

        let mut samples = self.samples.write().expect("lock poisoned");
        let sample = samples
            .get_mut(plugin_id)
            .ok_or_else(|| PluginError::NotMonitored(plugin_id.to_owned()))?;

        let mut violations = Vec::new();
        if let Some(max) = budget.max_memory_mb {
            if sample.memory_mb > max as f64 {
                violations.push(format!(
                    "memory usage {:.2}MB exceeds limit {max}MB",
                    sample.memory_mb
                ));
            }
        }
        if let Some(max) = budget.max_tasks {
            if sample.task_count > max {
                violations.push(format!(
                    "task count {} exceeds limit {max}",
                    sample.task_count
                ));
            }
        }

        if violations.is_empty() {
            return Ok(());
        }
        sample.violations = sample.violations.saturating_add(1);
        Err(PluginError::ResourceLimitExceeded {
            plugin_id: plugin_id.to_owned(),
            violations,
        })
    }
}

impl fmt::Debug for ResourceMonitor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceMonitor")
            .field("interval", &self.interval)
            .finish_non_exhaustive()
    }
}

/// Overwrites every tracked sample with a fresh host reading.
///
/// Violation counts and throttle flags carry over untouched.
async fn refresh_samples(
    system: &Arc<Mutex<System>>,
    samples: &RwLock<HashMap<String, ResourceSample>>,
) {
    let (memory_mb, task_count) = host_sample(system).await;
    let now = Utc::now();

    let mut samples = samples.write().expect("lock poisoned");
    for sample in samples.values_mut() {
        sample.memory_mb = memory_mb;
        sample.task_count = task_count;
        sample.sampled_at = now;
    }
}

/// Reads the host process footprint: resident memory in megabytes and live
/// tasks on the current runtime, or zeroes when either is unavailable.
///
/// The sysinfo refresh scans the whole process table and runs on the
/// blocking pool, never on an async worker.
async fn host_sample(system: &Arc<Mutex<System>>) -> (f64, usize) {
    let task_count = tokio::runtime::Handle::try_current()
        .map(|handle| handle.metrics().num_alive_tasks())
        .unwrap_or_default();

    let system = Arc::clone(system);
    let memory_mb = tokio::task::spawn_blocking(move || {
        let mut system = system.lock().expect("lock poisoned");
        system.refresh_all();
        let pid = sysinfo::Pid::from_u32(std::process::id());
        system
            .process(pid)
            .map_or(0.0, |process| bytes_to_mb(process.memory()))
    })
    .await
    .unwrap_or_default();

    (memory_mb, task_count)
}

#[allow(clippy::cast_precision_loss)]
fn bytes_to_mb(bytes: u64) -> f64 {
    bytes as f64 / 1024.0 / 1024.0
}
