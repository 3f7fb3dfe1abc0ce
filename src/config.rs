/*
 *  config.rs
 *
 *  statelink - typed plugin state across the module boundary
 *  (c) 2020-26 Stuart Hunter
 *
 *  Host configuration: YAML file layered under CLI overrides
 *
 *  This program is free software: you can redistribute it and/or modify
 *  it under the terms of the GNU General Public License as published by
 *  the Free Software Foundation, either version 3 of the License, or
 *  (at your option) any later version.
 *
 *  This program is distributed in the hope that it will be useful,
 *  but WITHOUT ANY WARRANTY; without even the implied warranty of
 *  MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 *  GNU General Public License for more details.
 *
 *  See <http://www.gnu.org/licenses/> to get a copy of the GNU General
 *  Public License.
 *
 */

use serde::{Deserialize, Serialize};
use clap::{ArgAction, Parser, ValueHint};
use dirs_next::home_dir;
use std::{fs, path::{Path, PathBuf}, time::Duration};
use thiserror::Error;

pub const DEFAULT_LOG_LEVEL: &str = "info";
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 250;

/// Error type for config loading/validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Validation error: {0}")]
    Validation(String),
}

/// Host configuration. Every field is optional so layers merge cleanly.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    pub log_level: Option<String>,          // e.g., "info" | "debug"
    /// plugin module to load (.so/.dylib/.dll)
    pub plugin: Option<PathBuf>,
    /// sample cadence for poll-profile plugins
    pub poll_interval_ms: Option<u64>,
    /// stop after this long; run until Ctrl-C when unset
    pub run_for_secs: Option<u64>,
    /// check every report against the declared schema
    pub validate_reports: Option<bool>,
}

impl Config {
    pub fn log_level(&self) -> &str {
        self.log_level.as_deref().unwrap_or(DEFAULT_LOG_LEVEL)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.unwrap_or(DEFAULT_POLL_INTERVAL_MS))
    }

    pub fn run_for(&self) -> Option<Duration> {
        self.run_for_secs.map(Duration::from_secs)
    }

    pub fn validate_reports(&self) -> bool {
        self.validate_reports.unwrap_or(true)
    }

    /// Pretty YAML of the effective config
    pub fn to_yaml(&self) -> Result<String, ConfigError> {
        Ok(serde_yaml::to_string(self)?)
    }
}

/// CLI overrides. All fields are Options so we can layer them over YAML.
#[derive(Debug, Parser, Clone, Default)]
#[command(name = "statelink", about = "statelink plugin host", version)]
pub struct Cli {
    /// Path to a YAML config file (overrides search)
    #[arg(long, value_hint = ValueHint::FilePath)]
    pub config: Option<PathBuf>,
    #[arg(long)]
    pub log_level: Option<String>,
    /// Plugin module to load
    #[arg(long, value_hint = ValueHint::FilePath)]
    pub plugin: Option<PathBuf>,
    #[arg(long)]
    pub poll_interval_ms: Option<u64>,
    #[arg(long)]
    pub run_for_secs: Option<u64>,
    #[arg(long, action = ArgAction::Set)]
    pub validate_reports: Option<bool>,
    /// dump fully merged config (after overrides) and exit
    #[arg(long, action = ArgAction::SetTrue)]
    pub dump_config: bool,
}

/// Read YAML, merge, apply `cli` on top, validate.
pub fn load_with(cli: &Cli) -> Result<Config, ConfigError> {
    // 1) defaults (from `Default` impl)
    let mut cfg = Config::default();

    // 2) YAML file (explicit path or search)
    if let Some(p) = cli.config.as_ref() {
        if p.exists() {
            let y = read_yaml(p)?;
            merge(&mut cfg, y);
        } else {
            return Err(ConfigError::Validation(format!(
                "Config file not found: {}",
                p.display()
            )));
        }
    } else if let Some(p) = find_config_file() {
        let y = read_yaml(&p)?;
        merge(&mut cfg, y);
    }

    // 3) CLI overrides (highest precedence)
    apply_cli_overrides(&mut cfg, cli);

    // 4) Validate
    validate(&cfg)?;

    Ok(cfg)
}

/// Try common locations in order (first hit wins).
pub fn find_config_file() -> Option<PathBuf> {
    // XDG-style: ~/.config/statelink/config.yaml
    if let Some(home) = home_dir() {
        let p = home.join(".config/statelink/config.yaml");
        if p.exists() { return Some(p) }
    }
    // project local
    for candidate in &["statelink.yaml", "config/statelink.yaml"] {
        let p = PathBuf::from(candidate);
        if p.exists() { return Some(p) }
    }
    None
}

fn read_yaml(path: &Path) -> Result<Config, ConfigError> {
    let s = fs::read_to_string(path)?;
    let cfg: Config = serde_yaml::from_str(&s)?;
    Ok(cfg)
}

/// Shallow merge `src` into `dst`, Option-by-Option.
fn merge(dst: &mut Config, src: Config) {
    if src.log_level.is_some()        { dst.log_level = src.log_level; }
    if src.plugin.is_some()           { dst.plugin = src.plugin; }
    if src.poll_interval_ms.is_some() { dst.poll_interval_ms = src.poll_interval_ms; }
    if src.run_for_secs.is_some()     { dst.run_for_secs = src.run_for_secs; }
    if src.validate_reports.is_some() { dst.validate_reports = src.validate_reports; }
}

fn apply_cli_overrides(cfg: &mut Config, cli: &Cli) {
    merge(cfg, Config {
        log_level: cli.log_level.clone(),
        plugin: cli.plugin.clone(),
        poll_interval_ms: cli.poll_interval_ms,
        run_for_secs: cli.run_for_secs,
        validate_reports: cli.validate_reports,
    });
}

fn validate(cfg: &Config) -> Result<(), ConfigError> {
    if cfg.poll_interval_ms == Some(0) {
        return Err(ConfigError::Validation("poll_interval_ms must be > 0".into()));
    }
    if let Some(level) = cfg.log_level.as_deref() {
        if level.parse::<log::LevelFilter>().is_err() {
            return Err(ConfigError::Validation(format!("unknown log_level '{}'", level)));
        }
    }
    if let Some(plugin) = cfg.plugin.as_ref() {
        if plugin.as_os_str().is_empty() {
            return Err(ConfigError::Validation("plugin path must not be empty".into()));
        }
    }
    Ok(())
}
