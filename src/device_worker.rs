use crate::config::{EventCode, KeyCode, MappingConfig};
use crate::event::KeyEvent;
use crate::pipeline::Pipeline;
use anyhow::{Context, Result};
use evdev_rs::{Device, DeviceWrapper, GrabMode, InputEvent, ReadFlag, ReadStatus, UInputDevice};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Owns one physical keyboard, its synthetic mirror, and the mapper state
/// for as long as the device stays attached (spec §4.4).
///
/// Created when a keyboard is discovered, destroyed when its read loop
/// returns for any reason. No state here is ever shared with another
/// worker: `mappings` is this worker's own clone of the supervisor's
/// `MappingConfig`.
pub struct DeviceWorker {
    source_path: PathBuf,
    input: Device,
    output: UInputDevice,
    pipeline: Pipeline,
}

fn enable_key_code(input: &mut Device, key: KeyCode) -> Result<()> {
    input.enable(EventCode::EV_KEY(key)).context(format!("enable key {key:?}"))?;
    Ok(())
}

impl DeviceWorker {
    /// Open, settle, grab and mirror the device. On any failure the
    /// partially-acquired resources are dropped (closing fds / releasing
    /// the grab) as soon as this function returns its error.
    fn create(path: &Path, config: &MappingConfig) -> Result<Self> {
        let f = std::fs::File::open(path).context(format!("opening {}", path.display()))?;
        let mut input = Device::new_from_file(f)
            .with_context(|| format!("failed to create new Device from file {}", path.display()))?;
        input.set_name(&format!("evremap Virtual input for {}", path.display()));

        // Ensure every key this config can ever emit is supported by the
        // synthetic device, even if the source hardware lacks it.
        for &code in config.single.values() {
            enable_key_code(&mut input, code)?;
        }
        for rule in &config.double {
            for &code in &rule.emit {
                enable_key_code(&mut input, code)?;
            }
        }
        if let Some(meta) = &config.meta {
            enable_key_code(&mut input, meta.modifier)?;
            for expansion in meta.table.values() {
                for &code in expansion {
                    enable_key_code(&mut input, code)?;
                }
            }
        }

        // Give the kernel (and any session manager still enumerating the
        // device) a moment to settle before we grab it exclusively.
        thread::sleep(Duration::from_secs(1));

        input
            .grab(GrabMode::Grab)
            .context(format!("grabbing exclusive access on {}", path.display()))?;

        let output = UInputDevice::create_from_device(&input)
            .context(format!("creating UInputDevice from {}", path.display()))?;

        Ok(Self { source_path: path.to_path_buf(), input, output, pipeline: Pipeline::new(config) })
    }

    /// Spawn a worker thread for `path`. `finished` is set exactly once,
    /// after teardown, regardless of how the read loop exits; the
    /// supervisor only reaps entries whose flag is set.
    pub fn spawn(
        path: PathBuf,
        config: MappingConfig,
        finished: Arc<AtomicBool>,
    ) -> JoinHandle<()> {
        thread::spawn(move || {
            let result = Self::create(&path, &config).and_then(|mut worker| worker.run_mapper());
            if let Err(err) = result {
                log::error!("device worker for {} exiting: {err:#}", path.display());
            }
            // `input`/`output` are dropped here (ungrab + close fds) before
            // the flag is raised, so the supervisor never observes a
            // "finished" worker that still holds the grab.
            finished.store(true, Ordering::SeqCst);
        })
    }

    fn run_mapper(&mut self) -> Result<()> {
        log::info!("worker for {} entering read loop", self.source_path.display());
        loop {
            let (status, event) = match self.input.next_event(ReadFlag::NORMAL | ReadFlag::BLOCKING) {
                Ok(pair) => pair,
                Err(err) if err.raw_os_error() == Some(libc::EAGAIN) => continue,
                Err(err) => return Err(err).context("reading from source device"),
            };

            match status {
                ReadStatus::Success => self.handle_event(&event)?,
                ReadStatus::Sync => self.drain_sync()?,
            }
        }
    }

    /// Kernel reported a dropped-event (sync) condition: drain in sync mode
    /// without running the pipeline, then resume normal reads (spec §4.4,
    /// §9 "sync-state handling").
    fn drain_sync(&mut self) -> Result<()> {
        loop {
            let (status, event) = match self.input.next_event(ReadFlag::SYNC) {
                Ok(pair) => pair,
                Err(err) if err.raw_os_error() == Some(libc::EAGAIN) => return Ok(()),
                Err(err) => return Err(err).context("draining sync events"),
            };
            match status {
                ReadStatus::Sync => {
                    let _ = event;
                    continue;
                },
                ReadStatus::Success => return Ok(()),
            }
        }
    }

    fn handle_event(&mut self, event: &InputEvent) -> Result<()> {
        match event.event_code {
            EventCode::EV_KEY(code) => {
                let key_event = KeyEvent::new(code, event.value, event.time);
                for out in self.pipeline.apply(key_event) {
                    self.write_key_event(out)?;
                }
            },
            _ => {
                self.output.write_event(event).context("forwarding non-key event")?;
                self.sync(&event.time)?;
            },
        }
        Ok(())
    }

    fn write_key_event(&mut self, event: KeyEvent) -> Result<()> {
        let wire = InputEvent::new(&event.time, &EventCode::EV_KEY(event.code), event.value);
        self.output.write_event(&wire).context("writing key event")?;
        self.sync(&event.time)?;
        Ok(())
    }

    fn sync(&self, time: &evdev_rs::TimeVal) -> Result<()> {
        self.output
            .write_event(&InputEvent::new(time, &EventCode::EV_SYN(evdev_rs::enums::EV_SYN::SYN_REPORT), 0))
            .context("writing SYN_REPORT")
    }
}

impl Drop for DeviceWorker {
    fn drop(&mut self) {
        // `UInputDevice` and `Device` release their resources on drop; the
        // explicit ungrab makes the release order match spec §4.4's
        // teardown contract instead of relying on fd-close semantics alone.
        if let Err(err) = self.input.grab(GrabMode::Ungrab) {
            log::warn!("ungrab of {} failed: {err}", self.source_path.display());
        }
    }
}
