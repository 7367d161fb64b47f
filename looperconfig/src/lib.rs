//! # looper configuration
//!
//! Settings are resolved in three layers:
//!
//! 1. the defaults embedded in the binary (`looper.yaml`),
//! 2. an optional `config.yaml` from the configuration directory, merged key
//!    by key over the defaults,
//! 3. environment variables of the form `LOOPER_CONFIG__SECTION__KEY=value`,
//!    whose values are parsed as YAML scalars.
//!
//! The configuration directory is, in order: the directory passed to
//! [`Config::load`], `$LOOPER_CONFIG`, `./.looper`, then `~/.looper`.
//!
//! ```no_run
//! use looperconfig::Config;
//!
//! let config = Config::load(None)?;
//! let options = looperdecode::SessionOptions::from(&config.playback);
//! println!("{} buffers of {} bytes", options.buffer_count, options.buffer_size);
//! # Ok::<(), anyhow::Error>(())
//! ```

use std::{
    env, fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result, anyhow};
use dirs::home_dir;
use serde::Deserialize;
use serde_yaml::{Mapping, Value};
use tracing::{debug, info};

use looperdecode::SessionOptions;

const DEFAULT_CONFIG: &str = include_str!("looper.yaml");

const ENV_CONFIG_DIR: &str = "LOOPER_CONFIG";
const ENV_PREFIX: &str = "LOOPER_CONFIG__";
const CONFIG_DIR_NAME: &str = ".looper";
const CONFIG_FILE: &str = "config.yaml";

/// Smallest output buffer accepted.
pub const MIN_BUFFER_SIZE: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Output {
    /// Default audio output device.
    Device,
    /// Decode only, discard the PCM.
    Discard,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PlaybackConfig {
    pub buffer_count: usize,
    pub buffer_size: usize,
    pub frames_per_unit: usize,
    pub output: Output,
}

impl From<&PlaybackConfig> for SessionOptions {
    fn from(playback: &PlaybackConfig) -> Self {
        SessionOptions {
            buffer_count: playback.buffer_count,
            buffer_size: playback.buffer_size,
            frames_per_unit: playback.frames_per_unit,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is not set.
    pub level: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Config {
    pub playback: PlaybackConfig,
    pub logging: LoggingConfig,
    /// `config.yaml` that was merged, if any.
    #[serde(skip)]
    pub source: Option<PathBuf>,
}

impl Config {
    /// Loads the configuration from `directory` or the first directory found
    /// by the lookup order, with the process environment applied.
    pub fn load(directory: Option<&Path>) -> Result<Self> {
        let file = find_config_dir(directory).map(|dir| dir.join(CONFIG_FILE));
        let external = match &file {
            Some(path) if path.is_file() => {
                info!(config_file = %path.display(), "loading configuration");
                Some(
                    fs::read_to_string(path)
                        .with_context(|| format!("cannot read {}", path.display()))?,
                )
            }
            _ => {
                info!("no config.yaml found, using embedded defaults");
                None
            }
        };

        let mut config = Self::from_sources(external.as_deref(), env::vars())?;
        if external.is_some() {
            config.source = file;
        }
        Ok(config)
    }

    /// Builds a configuration from an optional external YAML document and a
    /// set of environment variables.
    pub fn from_sources<I>(external: Option<&str>, vars: I) -> Result<Self>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut value: Value =
            serde_yaml::from_str(DEFAULT_CONFIG).context("embedded defaults are invalid")?;
        if let Some(external) = external {
            let external: Value =
                serde_yaml::from_str(external).context("config.yaml is not valid YAML")?;
            // An empty file parses as null and changes nothing.
            if !external.is_null() {
                merge_yaml(&mut value, &lower_keys(external));
            }
        }
        apply_env_overrides(&mut value, vars);

        let config: Config =
            serde_yaml::from_value(value).context("configuration does not match the schema")?;
        config.validate()?;
        debug!(?config, "configuration resolved");
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let playback = &self.playback;
        if playback.buffer_count < 1 {
            return Err(anyhow!("playback.buffer_count must be at least 1"));
        }
        if playback.buffer_size < MIN_BUFFER_SIZE {
            return Err(anyhow!(
                "playback.buffer_size must be at least {MIN_BUFFER_SIZE} bytes, got {}",
                playback.buffer_size
            ));
        }
        if playback.frames_per_unit < 1 {
            return Err(anyhow!("playback.frames_per_unit must be at least 1"));
        }
        Ok(())
    }

    pub fn session_options(&self) -> SessionOptions {
        SessionOptions::from(&self.playback)
    }
}

/// Picks the configuration directory; `None` when no candidate exists.
pub fn find_config_dir(directory: Option<&Path>) -> Option<PathBuf> {
    if let Some(directory) = directory {
        return Some(directory.to_path_buf());
    }
    if let Ok(env_path) = env::var(ENV_CONFIG_DIR) {
        debug!(env_var = ENV_CONFIG_DIR, path = %env_path, "config directory from environment");
        return Some(PathBuf::from(env_path));
    }
    let local = Path::new(CONFIG_DIR_NAME);
    if local.is_dir() {
        return Some(local.to_path_buf());
    }
    home_dir()
        .map(|home| home.join(CONFIG_DIR_NAME))
        .filter(|dir| dir.is_dir())
}

/// Applies `LOOPER_CONFIG__A__B=value` style variables to the tree.
fn apply_env_overrides<I>(config: &mut Value, vars: I)
where
    I: IntoIterator<Item = (String, String)>,
{
    for (key, value) in vars {
        let Some(path) = key.strip_prefix(ENV_PREFIX) else {
            continue;
        };
        let path: Vec<String> = path.split("__").map(str::to_lowercase).collect();
        if path.iter().any(String::is_empty) {
            continue;
        }
        debug!(variable = %key, "configuration override from environment");
        set_value(config, &path, convert_env_value(&value));
    }
}

fn set_value(data: &mut Value, path: &[String], value: Value) {
    let Some((first, rest)) = path.split_first() else {
        *data = value;
        return;
    };
    if !data.is_mapping() {
        *data = Value::Mapping(Mapping::new());
    }
    if let Value::Mapping(map) = data {
        let entry = map
            .entry(Value::String(first.clone()))
            .or_insert(Value::Null);
        set_value(entry, rest, value);
    }
}

fn convert_env_value(value: &str) -> Value {
    serde_yaml::from_str::<Value>(value).unwrap_or_else(|_| Value::String(value.to_string()))
}

fn lower_keys(value: Value) -> Value {
    match value {
        Value::Mapping(map) => Value::Mapping(
            map.into_iter()
                .map(|(k, v)| match k {
                    Value::String(s) => (Value::String(s.to_lowercase()), lower_keys(v)),
                    other => (other, lower_keys(v)),
                })
                .collect(),
        ),
        Value::Sequence(seq) => Value::Sequence(seq.into_iter().map(lower_keys).collect()),
        other => other,
    }
}

/// Merges `external` into `default`: mappings key by key, anything else
/// replaces the default.
fn merge_yaml(default: &mut Value, external: &Value) {
    match (default, external) {
        (Value::Mapping(dmap), Value::Mapping(emap)) => {
            for (k, v) in emap {
                match dmap.get_mut(k) {
                    Some(dv) => merge_yaml(dv, v),
                    None => {
                        dmap.insert(k.clone(), v.clone());
                    }
                }
            }
        }
        (d, e) => *d = e.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_values_are_parsed_as_yaml() {
        assert_eq!(convert_env_value("8"), Value::from(8));
        assert_eq!(convert_env_value("true"), Value::Bool(true));
        assert_eq!(convert_env_value("null"), Value::Null);
        assert_eq!(convert_env_value("debug"), Value::String("debug".into()));
    }

    #[test]
    fn merge_keeps_unmentioned_keys() {
        let mut base: Value = serde_yaml::from_str("a: {x: 1, y: 2}\nb: 3").unwrap();
        let external: Value = serde_yaml::from_str("a: {y: 5}\nc: 4").unwrap();
        merge_yaml(&mut base, &external);
        let expected: Value = serde_yaml::from_str("a: {x: 1, y: 5}\nb: 3\nc: 4").unwrap();
        assert_eq!(base, expected);
    }

    #[test]
    fn overrides_create_missing_sections() {
        let mut value = Value::Mapping(Mapping::new());
        apply_env_overrides(
            &mut value,
            [("LOOPER_CONFIG__Extra__Depth".to_string(), "2".to_string())],
        );
        let expected: Value = serde_yaml::from_str("extra: {depth: 2}").unwrap();
        assert_eq!(value, expected);
    }

    #[test]
    fn keys_are_lowered() {
        let value: Value = serde_yaml::from_str("Playback: {Buffer_Count: 4}").unwrap();
        let expected: Value = serde_yaml::from_str("playback: {buffer_count: 4}").unwrap();
        assert_eq!(lower_keys(value), expected);
    }
}
