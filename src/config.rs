use anyhow::Context;
pub use evdev_rs::enums::{EV_KEY as KeyCode, EventCode, EventType};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;

/// The fully validated, immutable mapping configuration shared (by value) with
/// every `DeviceWorker`. Constructed once at startup from a TOML file; never
/// mutated afterwards.
#[derive(Debug, Clone, Default)]
pub struct MappingConfig {
    pub device_name: Option<String>,
    pub phys: Option<String>,
    pub single: HashMap<KeyCode, KeyCode>,
    pub double: Vec<DoubleRule>,
    pub meta: Option<MetaConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DoubleRule {
    pub trigger: [KeyCode; 2],
    pub emit: Vec<KeyCode>,
    pub window_ms: u64,
}

impl DoubleRule {
    /// The trigger set is unordered: either key may arrive first.
    pub fn matches(&self, a: KeyCode, b: KeyCode) -> bool {
        (self.trigger[0] == a && self.trigger[1] == b)
            || (self.trigger[0] == b && self.trigger[1] == a)
    }

    pub fn has_trigger(&self, code: KeyCode) -> bool {
        self.trigger[0] == code || self.trigger[1] == code
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetaConfig {
    pub meta_key: KeyCode,
    pub modifier: KeyCode,
    pub table: HashMap<KeyCode, Vec<KeyCode>>,
}

impl MappingConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let toml_data = std::fs::read_to_string(path)
            .context(format!("reading toml from {}", path.display()))?;
        Self::from_str(&toml_data).context(format!("parsing toml from {}", path.display()))
    }

    pub fn from_str(toml_data: &str) -> anyhow::Result<Self> {
        let file: ConfigFile = toml::from_str(toml_data)?;
        Self::from_file_config(file)
    }

    fn from_file_config(file: ConfigFile) -> anyhow::Result<Self> {
        let mut single = HashMap::new();
        for entry in file.single {
            single.insert(entry.from.code, entry.to.code);
        }

        let mut double = Vec::new();
        for rule in file.double {
            if rule.trigger.len() != 2 {
                return Err(ConfigError::DoubleTriggerArity(rule.trigger.len()).into());
            }
            let trigger = [rule.trigger[0].code, rule.trigger[1].code];
            if trigger[0] == trigger[1] {
                return Err(ConfigError::DoubleTriggerSameKey(format!("{:?}", trigger[0])).into());
            }
            double.push(DoubleRule {
                trigger,
                emit: rule.emit.into_iter().map(|k| k.code).collect(),
                window_ms: rule.window_ms,
            });
        }

        let meta = match file.meta {
            None => None,
            Some(m) => {
                let mut table = HashMap::new();
                for (k, v) in m.table {
                    let expansion: Vec<KeyCode> = v.into_iter().map(|k| k.code).collect();
                    if expansion.contains(&m.meta_key.code) {
                        return Err(ConfigError::MetaExpandsToSelf(format!(
                            "{:?}",
                            m.meta_key.code
                        ))
                        .into());
                    }
                    table.insert(k.code, expansion);
                }
                Some(MetaConfig { meta_key: m.meta_key.code, modifier: m.modifier.code, table })
            },
        };

        Ok(Self { device_name: file.device_name, phys: file.phys, single, double, meta })
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid key `{0}`.  Use `evremap list-keys` to see possible keys.")]
    InvalidKey(String),
    #[error("Impossible: parsed KEY_XXX but not into an EV_KEY")]
    ImpossibleParseKey,
    #[error("double rule trigger must name exactly 2 keys, found {0}")]
    DoubleTriggerArity(usize),
    #[error("double rule trigger names the same key twice: {0}")]
    DoubleTriggerSameKey(String),
    #[error("meta table expands {0} to itself; this would never terminate the hold")]
    MetaExpandsToSelf(String),
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(try_from = "String")]
pub struct KeyCodeWrapper {
    pub code: KeyCode,
}

impl std::convert::TryFrom<String> for KeyCodeWrapper {
    type Error = ConfigError;

    fn try_from(s: String) -> Result<KeyCodeWrapper, Self::Error> {
        match EventCode::from_str(&EventType::EV_KEY, &s) {
            Some(code) => match code {
                EventCode::EV_KEY(code) => Ok(KeyCodeWrapper { code }),
                _ => Err(ConfigError::ImpossibleParseKey),
            },
            None => Err(ConfigError::InvalidKey(s)),
        }
    }
}

#[derive(Debug, Deserialize)]
struct SingleEntryConfig {
    from: KeyCodeWrapper,
    to: KeyCodeWrapper,
}

#[derive(Debug, Deserialize)]
struct DoubleRuleConfig {
    trigger: Vec<KeyCodeWrapper>,
    emit: Vec<KeyCodeWrapper>,
    #[serde(default = "default_window_ms")]
    window_ms: u64,
}

fn default_window_ms() -> u64 {
    200
}

#[derive(Debug, Deserialize)]
struct MetaConfigFile {
    meta_key: KeyCodeWrapper,
    modifier: KeyCodeWrapper,
    #[serde(default)]
    table: HashMap<KeyCodeWrapper, Vec<KeyCodeWrapper>>,
}

#[derive(Debug, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    device_name: Option<String>,
    #[serde(default)]
    phys: Option<String>,
    #[serde(default)]
    single: Vec<SingleEntryConfig>,
    #[serde(default)]
    double: Vec<DoubleRuleConfig>,
    #[serde(default)]
    meta: Option<MetaConfigFile>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_single_double_meta() {
        let toml_data = r#"
            device_name = "Test Keyboard"

            [[single]]
            from = "KEY_CAPSLOCK"
            to = "KEY_ESC"

            [[double]]
            trigger = ["KEY_J", "KEY_K"]
            emit = ["KEY_ESC"]
            window_ms = 200

            [meta]
            meta_key = "KEY_SPACE"
            modifier = "KEY_LEFTCTRL"

            [meta.table]
            KEY_H = ["KEY_LEFT"]
        "#;
        let cfg = MappingConfig::from_str(toml_data).expect("parse ok");
        assert_eq!(cfg.device_name.as_deref(), Some("Test Keyboard"));
        assert_eq!(cfg.single.get(&KeyCode::KEY_CAPSLOCK), Some(&KeyCode::KEY_ESC));
        assert_eq!(cfg.double.len(), 1);
        assert_eq!(cfg.double[0].trigger, [KeyCode::KEY_J, KeyCode::KEY_K]);
        let meta = cfg.meta.expect("meta present");
        assert_eq!(meta.meta_key, KeyCode::KEY_SPACE);
        assert_eq!(meta.table.get(&KeyCode::KEY_H), Some(&vec![KeyCode::KEY_LEFT]));
    }

    #[test]
    fn empty_config_is_identity() {
        let cfg = MappingConfig::from_str("").expect("parse ok");
        assert!(cfg.single.is_empty());
        assert!(cfg.double.is_empty());
        assert!(cfg.meta.is_none());
    }

    #[test]
    fn rejects_meta_expanding_to_itself() {
        let toml_data = r#"
            [meta]
            meta_key = "KEY_SPACE"
            modifier = "KEY_LEFTCTRL"

            [meta.table]
            KEY_H = ["KEY_SPACE"]
        "#;
        let err = MappingConfig::from_str(toml_data).unwrap_err();
        assert!(err.to_string().contains("expands"));
    }

    #[test]
    fn rejects_double_trigger_naming_same_key_twice() {
        let toml_data = r#"
            [[double]]
            trigger = ["KEY_J", "KEY_J"]
            emit = ["KEY_ESC"]
        "#;
        assert!(MappingConfig::from_str(toml_data).is_err());
    }

    #[test]
    fn invalid_key_name_is_rejected() {
        let toml_data = r#"
            [[single]]
            from = "KEY_NOT_A_REAL_KEY"
            to = "KEY_ESC"
        "#;
        assert!(MappingConfig::from_str(toml_data).is_err());
    }
}
