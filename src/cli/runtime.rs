use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::config::Config;

/// Env files read before anything else, in order. Variables already set in
/// the process environment are never replaced.
pub const ENV_FILES: &[&str] = &[".env", "config/local.env"];

/// Loads every env file that exists; returns the ones that were read.
pub fn load_env_files() -> Vec<PathBuf> {
    let mut loaded = Vec::new();
    for name in ENV_FILES {
        let path = Path::new(name);
        let Ok(contents) = fs::read_to_string(path) else {
            continue;
        };
        for (key, value) in parse_env(&contents) {
            if env::var_os(&key).is_none() {
                env::set_var(key, value);
            }
        }
        loaded.push(path.to_path_buf());
    }
    loaded
}

/// `KEY=value` lines; blank lines, comments and lines without `=` are
/// skipped. A leading `export ` is tolerated.
pub fn parse_env(contents: &str) -> Vec<(String, String)> {
    contents
        .lines()
        .filter_map(|raw| {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                return None;
            }
            let line = line.strip_prefix("export ").unwrap_or(line);
            let (key, value) = line.split_once('=')?;
            let key = key.trim();
            if key.is_empty() {
                return None;
            }
            Some((key.to_string(), unquote(value.trim())))
        })
        .collect()
}

fn unquote(value: &str) -> String {
    let quoted = value.len() >= 2
        && ((value.starts_with('"') && value.ends_with('"')) || (value.starts_with('\'') && value.ends_with('\'')));
    if !quoted {
        return value.to_string();
    }
    let inner = &value[1..value.len() - 1];
    if value.starts_with('\'') {
        return inner.to_string();
    }
    inner
        .replace("\\\"", "\"")
        .replace("\\n", "\n")
        .replace("\\t", "\t")
}

pub struct LoadedConfig {
    pub config: Config,
    pub path: PathBuf,
    pub from_file: bool,
}

/// `--config`, else `./config/config.yaml`, else
/// `<config_dir>/dashprobe/config.yaml`, else defaults. Environment
/// overrides are applied on top.
pub fn load_config(config_path: Option<&PathBuf>) -> Result<LoadedConfig> {
    let path = match config_path {
        Some(path) => path.clone(),
        None => default_config_path(),
    };

    let (mut config, from_file) = if path.exists() {
        let raw = fs::read_to_string(&path).with_context(|| format!("reading {}", path.display()))?;
        let config: Config = serde_yaml::from_str(&raw).with_context(|| format!("parsing {}", path.display()))?;
        (config, true)
    } else if config_path.is_some() {
        anyhow::bail!("config file {} does not exist", path.display());
    } else {
        (Config::default(), false)
    };
    config.apply_env(|key| env::var(key).ok());

    Ok(LoadedConfig {
        config,
        path,
        from_file,
    })
}

pub fn default_config_path() -> PathBuf {
    let local = PathBuf::from("config/config.yaml");
    if local.exists() {
        return local;
    }
    match dirs::config_dir() {
        Some(mut dir) => {
            dir.push("dashprobe");
            dir.push("config.yaml");
            dir
        }
        None => local,
    }
}
