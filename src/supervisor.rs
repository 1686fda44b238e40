use crate::config::MappingConfig;
use crate::device_worker::DeviceWorker;
use crate::deviceinfo;
use crate::hotplug::HotplugWatcher;
use anyhow::Result;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

const HOTPLUG_DEBOUNCE: Duration = Duration::from_millis(500);
const SETTLE_DELAY: Duration = Duration::from_millis(500);
const POLL_INTERVAL: Duration = Duration::from_millis(200);

struct WorkerEntry {
    handle: JoinHandle<()>,
    finished: Arc<AtomicBool>,
}

/// Enumerates keyboards at startup, watches for hot-plugged keyboards, and
/// maintains one `DeviceWorker` per live keyboard (spec §4.6).
///
/// `workers` is owned exclusively by this struct/thread; a live entry always
/// corresponds to a currently-running worker thread, and every running
/// worker is reachable from exactly one entry.
pub struct Supervisor {
    config: MappingConfig,
    workers: HashMap<PathBuf, WorkerEntry>,
}

impl Supervisor {
    pub fn new(config: MappingConfig) -> Self {
        Self { config, workers: HashMap::new() }
    }

    fn spawn_worker(&mut self, path: PathBuf) {
        let finished = Arc::new(AtomicBool::new(false));
        let handle = DeviceWorker::spawn(path.clone(), self.config.clone(), Arc::clone(&finished));
        log::info!("spawned worker for {}", path.display());
        self.workers.insert(path, WorkerEntry { handle, finished });
    }

    /// Drop any entry whose worker has already finished, joining its
    /// thread. Never joins a thread whose flag is unset, so a live worker
    /// can never be blocked on here.
    fn reap(&mut self) {
        let finished_paths: Vec<PathBuf> = self
            .workers
            .iter()
            .filter(|(_, entry)| entry.finished.load(Ordering::SeqCst))
            .map(|(path, _)| path.clone())
            .collect();

        for path in finished_paths {
            if let Some(entry) = self.workers.remove(&path) {
                let _ = entry.handle.join();
                log::info!("reaped worker for {}", path.display());
            }
        }
    }

    /// Enumerate currently-visible keyboards and spawn a worker for any
    /// that isn't already tracked. If the config names an explicit device
    /// path that enumeration didn't surface, it is added unconditionally
    /// (spec §4.6).
    fn discover_and_spawn(&mut self) -> Result<()> {
        let mut paths: Vec<PathBuf> =
            deviceinfo::enumerate_keyboards()?.into_iter().map(|d| d.path).collect();

        if let Some(name) = &self.config.device_name {
            if let Ok(named) = deviceinfo::DeviceInfo::with_name(name, self.config.phys.as_deref()) {
                if !paths.contains(&named.path) {
                    paths.push(named.path);
                }
            }
        }

        for path in paths {
            if !self.workers.contains_key(&path) {
                self.spawn_worker(path);
            }
        }
        Ok(())
    }

    /// Discover keyboards once, then run forever: await hotplug
    /// notifications, settle, reap finished workers, and re-enumerate.
    /// Never returns under normal operation (spec §4.6's shutdown is
    /// undefined; the process runs until killed).
    pub fn run(mut self, watch_dir: &Path) -> Result<()> {
        self.discover_and_spawn()?;
        if self.workers.is_empty() && self.config.device_name.is_none() {
            anyhow::bail!("no keyboards found and no device specified in config");
        }

        let watcher = HotplugWatcher::start(watch_dir)?;

        loop {
            std::thread::sleep(POLL_INTERVAL);
            if watcher.poll(HOTPLUG_DEBOUNCE) {
                log::info!("hotplug: new device settled, re-enumerating");
                std::thread::sleep(SETTLE_DELAY);
                self.reap();
                if let Err(err) = self.discover_and_spawn() {
                    log::error!("re-enumeration after hotplug failed: {err:#}");
                }
            } else {
                self.reap();
            }
        }
    }
}
