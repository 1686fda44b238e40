use crate::config::KeyCode;
use anyhow::{bail, Context, Result};
use evdev_rs::enums::EventCode;
use evdev_rs::{Device, DeviceWrapper};
use std::fs::File;
use std::path::{Path, PathBuf};

/// Identifies one `/dev/input/eventN` node and the name/phys pair used to
/// recognize it again across restarts and hotplug re-enumeration.
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub path: PathBuf,
    pub name: String,
    pub phys: Option<String>,
}

fn open_device(path: &Path) -> Result<Device> {
    let f = File::open(path).context(format!("opening {}", path.display()))?;
    Device::new_from_file(f)
        .with_context(|| format!("failed to create new Device from file {}", path.display()))
}

/// True if the kernel publishes a physical-topology descriptor for this node.
/// Real hardware devices always have one; transient nodes created by
/// userspace device managers before the kernel has finished enumeration do
/// not, which is how the hotplug watcher tells them apart (spec §4.5).
pub fn has_physical_descriptor(dev: &Device) -> bool {
    dev.phys().is_some()
}

/// A node counts as a keyboard if it exposes the core alphabetic key range;
/// this mirrors the "capability bits include the keyboard key range"
/// criterion from spec §4.6 without depending on a specific device class API.
pub fn is_keyboard(dev: &Device) -> bool {
    dev.has(EventCode::EV_KEY(KeyCode::KEY_A))
        && dev.has(EventCode::EV_KEY(KeyCode::KEY_Z))
        && dev.has(EventCode::EV_KEY(KeyCode::KEY_SPACE))
}

fn event_paths() -> Result<Vec<PathBuf>> {
    let mut paths = Vec::new();
    for entry in std::fs::read_dir("/dev/input").context("reading /dev/input")? {
        let entry = entry?;
        let path = entry.path();
        if path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with("event"))
        {
            paths.push(path);
        }
    }
    paths.sort();
    Ok(paths)
}

impl DeviceInfo {
    /// Locate a device by its reported name, optionally disambiguated by its
    /// `phys` path when more than one device shares a product name.
    pub fn with_name(name: &str, phys: Option<&str>) -> Result<Self> {
        for path in event_paths()? {
            let dev = match open_device(&path) {
                Ok(dev) => dev,
                Err(_) => continue,
            };
            if dev.name() != Some(name) {
                continue;
            }
            if let Some(want_phys) = phys {
                if dev.phys() != Some(want_phys) {
                    continue;
                }
            }
            return Ok(Self { path, name: name.to_string(), phys: dev.phys().map(str::to_string) });
        }
        bail!("no device named `{name}` found under /dev/input")
    }

    fn from_device(path: PathBuf, dev: &Device) -> Self {
        Self {
            path,
            name: dev.name().unwrap_or("<unnamed>").to_string(),
            phys: dev.phys().map(str::to_string),
        }
    }
}

/// Enumerate every real keyboard device currently visible under
/// `/dev/input`, used by the supervisor both at startup and after each
/// hotplug-debounced re-enumeration.
pub fn enumerate_keyboards() -> Result<Vec<DeviceInfo>> {
    let mut keyboards = Vec::new();
    for path in event_paths()? {
        let dev = match open_device(&path) {
            Ok(dev) => dev,
            Err(_) => continue,
        };
        if is_keyboard(&dev) {
            keyboards.push(DeviceInfo::from_device(path, &dev));
        }
    }
    Ok(keyboards)
}

/// `list-devices` CLI subcommand: print every input device's name and phys.
pub fn list_devices() -> Result<()> {
    for path in event_paths()? {
        let dev = match open_device(&path) {
            Ok(dev) => dev,
            Err(err) => {
                log::warn!("skipping {}: {err:#}", path.display());
                continue;
            },
        };
        println!(
            "{}\t{}\t{}",
            path.display(),
            dev.name().unwrap_or("<unnamed>"),
            dev.phys().unwrap_or("<no phys>")
        );
    }
    Ok(())
}
