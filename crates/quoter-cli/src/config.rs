// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result, anyhow, bail};
use quoter_app::NumberFormat;
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

const CONFIG_VERSION: i64 = 1;
const DEFAULT_TIMEOUT: &str = "5s";
const DEFAULT_DEBOUNCE: &str = "300ms";
const DEFAULT_LOG_LEVEL: &str = "info";
const LOG_LEVELS: [&str; 6] = ["trace", "debug", "info", "warn", "error", "off"];

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub version: i64,
    #[serde(default)]
    pub storage: Storage,
    #[serde(default)]
    pub format: Format,
    #[serde(default)]
    pub sync: SyncSettings,
    #[serde(default)]
    pub log: Log,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            storage: Storage::default(),
            format: Format::default(),
            sync: SyncSettings::default(),
            log: Log::default(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Storage {
    pub db_path: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Format {
    pub decimal_separator: Option<String>,
    /// Empty string disables digit grouping.
    pub grouping_separator: Option<String>,
}

impl Default for Format {
    fn default() -> Self {
        Self {
            decimal_separator: Some(".".to_owned()),
            grouping_separator: Some(",".to_owned()),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SyncSettings {
    pub enabled: Option<bool>,
    pub update_url: Option<String>,
    pub timeout: Option<String>,
    pub debounce: Option<String>,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            enabled: Some(false),
            update_url: None,
            timeout: Some(DEFAULT_TIMEOUT.to_owned()),
            debounce: Some(DEFAULT_DEBOUNCE.to_owned()),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Log {
    pub path: Option<String>,
    pub level: Option<String>,
}

impl Default for Log {
    fn default() -> Self {
        Self {
            path: None,
            level: Some(DEFAULT_LOG_LEVEL.to_owned()),
        }
    }
}

impl Config {
    pub fn default_path() -> Result<PathBuf> {
        if let Some(path) = env::var_os("QUOTER_CONFIG_PATH") {
            return Ok(PathBuf::from(path));
        }

        let config_root = dirs::config_dir().ok_or_else(|| {
            anyhow!("cannot resolve config directory; set QUOTER_CONFIG_PATH to the config file")
        })?;

        let app_dir = config_root.join(quoter_db::APP_NAME);
        fs::create_dir_all(&app_dir)
            .with_context(|| format!("create config directory {}", app_dir.display()))?;
        Ok(app_dir.join("config.toml"))
    }

    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let raw = fs::read_to_string(path)
            .with_context(|| format!("read config file {}", path.display()))?;
        let value: toml::Value = toml::from_str(&raw)
            .with_context(|| format!("parse TOML config {}", path.display()))?;

        let version = value
            .get("version")
            .and_then(toml::Value::as_integer)
            .ok_or_else(|| {
                anyhow!(
                    "config file {} has no version. Add `version = 1` and keep values under [storage], [format], [sync], and [log]",
                    path.display()
                )
            })?;

        if version != CONFIG_VERSION {
            bail!(
                "unsupported config version {} in {}; expected version = 1. Regenerate it with --print-example-config",
                version,
                path.display()
            );
        }

        let config: Config = value
            .try_into()
            .with_context(|| format!("decode config {}", path.display()))?;
        config.validate(path)?;
        Ok(config)
    }

    fn validate(&self, path: &Path) -> Result<()> {
        if let Some(db_path) = &self.storage.db_path {
            quoter_db::validate_db_path(db_path)?;
        }

        self.number_format()
            .with_context(|| format!("invalid [format] in {}", path.display()))?;

        for (key, raw) in [
            ("sync.timeout", self.sync.timeout.as_deref()),
            ("sync.debounce", self.sync.debounce.as_deref()),
        ] {
            let Some(raw) = raw else {
                continue;
            };
            let parsed = parse_duration(raw)?;
            if key == "sync.timeout" && parsed <= Duration::ZERO {
                bail!("{key} in {} must be positive, got {raw}", path.display());
            }
        }

        if self.sync_enabled() && self.sync_update_url().is_none() {
            bail!(
                "sync.enabled is true in {} but sync.update_url is missing; set the update URL or disable sync",
                path.display()
            );
        }

        let level = self.log_level();
        if !LOG_LEVELS.contains(&level) {
            bail!(
                "log.level in {} must be one of {}, got {level:?}",
                path.display(),
                LOG_LEVELS.join(", ")
            );
        }

        Ok(())
    }

    pub fn db_path(&self) -> Result<PathBuf> {
        match &self.storage.db_path {
            Some(path) => Ok(PathBuf::from(path)),
            None => quoter_db::default_db_path(),
        }
    }

    pub fn number_format(&self) -> Result<NumberFormat> {
        let decimal = single_char(
            "format.decimal_separator",
            self.format.decimal_separator.as_deref().unwrap_or("."),
        )?
        .ok_or_else(|| anyhow!("format.decimal_separator must not be empty"))?;
        let grouping = single_char(
            "format.grouping_separator",
            self.format.grouping_separator.as_deref().unwrap_or(","),
        )?;
        NumberFormat::new(decimal, grouping)
    }

    pub fn sync_enabled(&self) -> bool {
        self.sync.enabled.unwrap_or(false)
    }

    pub fn sync_update_url(&self) -> Option<&str> {
        self.sync
            .update_url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
    }

    pub fn sync_timeout(&self) -> Result<Duration> {
        parse_duration(self.sync.timeout.as_deref().unwrap_or(DEFAULT_TIMEOUT))
    }

    pub fn sync_debounce(&self) -> Result<Duration> {
        parse_duration(self.sync.debounce.as_deref().unwrap_or(DEFAULT_DEBOUNCE))
    }

    pub fn log_level(&self) -> &str {
        self.log.level.as_deref().unwrap_or(DEFAULT_LOG_LEVEL)
    }

    pub fn log_path(&self) -> Result<PathBuf> {
        if let Some(path) = &self.log.path {
            return Ok(PathBuf::from(path));
        }
        let data_root = dirs::data_local_dir().ok_or_else(|| {
            anyhow!("cannot resolve data directory; set log.path in the config file")
        })?;
        Ok(data_root.join(quoter_db::APP_NAME).join("quoter.log"))
    }

    pub fn example_config(path: &Path) -> String {
        format!(
            "# quoter config\n# Place this file at: {}\n\nversion = 1\n\n[storage]\n# Optional. Default is platform data dir (for example ~/.local/share/quoter/quoter.db)\n# db_path = \"/absolute/path/to/quoter.db\"\n\n[format]\ndecimal_separator = \".\"\n# Empty string disables grouping.\ngrouping_separator = \",\"\n\n[sync]\nenabled = false\n# update_url = \"https://erp.example.com/calculation/update\"\ntimeout = \"{}\"\ndebounce = \"{}\"\n\n[log]\n# path = \"/absolute/path/to/quoter.log\"\nlevel = \"{}\"\n",
            path.display(),
            DEFAULT_TIMEOUT,
            DEFAULT_DEBOUNCE,
            DEFAULT_LOG_LEVEL,
        )
    }
}

fn single_char(key: &str, raw: &str) -> Result<Option<char>> {
    let mut chars = raw.chars();
    match (chars.next(), chars.next()) {
        (None, _) => Ok(None),
        (Some(ch), None) => Ok(Some(ch)),
        _ => bail!("{key} must be a single character, got {raw:?}"),
    }
}

fn parse_duration(raw: &str) -> Result<Duration> {
    if let Some(value) = raw.strip_suffix("ms") {
        let millis: u64 = value
            .parse()
            .with_context(|| format!("invalid duration {raw:?}"))?;
        return Ok(Duration::from_millis(millis));
    }
    if let Some(value) = raw.strip_suffix('s') {
        let secs: u64 = value
            .parse()
            .with_context(|| format!("invalid duration {raw:?}"))?;
        return Ok(Duration::from_secs(secs));
    }
    if let Some(value) = raw.strip_suffix('m') {
        let mins: u64 = value
            .parse()
            .with_context(|| format!("invalid duration {raw:?}"))?;
        let secs = mins
            .checked_mul(60)
            .ok_or_else(|| anyhow!("duration {raw:?} is too large"))?;
        return Ok(Duration::from_secs(secs));
    }

    bail!("invalid duration {raw:?}; use one of: <N>ms, <N>s, <N>m (for example 300ms or 5s)")
}
