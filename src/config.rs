use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use directories::ProjectDirs;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::domain::EXTERNAL_RESOURCE;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Name stamped on imports and matches (`imported_by`, `matched_by`).
    pub operator: String,
    pub current_tenant: String,

    #[serde(default)]
    pub match_tuning: MatchTuning,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            operator: default_operator(),
            current_tenant: "default".to_string(),
            match_tuning: MatchTuning::default(),
        }
    }
}

fn default_operator() -> String {
    std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "operator".to_string())
}

/// Weights and tolerances behind the suggestion score. Every field falls back
/// to its default so older config files keep loading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchTuning {
    /// Relative amount tolerance in percent (1 = ±1%).
    pub amount_tolerance_pct: Decimal,
    pub date_window_days: i64,

    pub weight_amount_exact: u32,
    pub weight_amount_near: u32,
    pub weight_date_exact: u32,
    pub weight_date_near: u32,
    pub weight_counterparty: u32,
    pub weight_reference: u32,

    pub high_confidence: u8,
    pub medium_confidence: u8,
    /// Candidates scoring below this are not suggested at all.
    pub min_score: u8,
}

impl Default for MatchTuning {
    fn default() -> Self {
        Self {
            amount_tolerance_pct: Decimal::ONE,
            date_window_days: 3,
            weight_amount_exact: 50,
            weight_amount_near: 30,
            weight_date_exact: 25,
            weight_date_near: 15,
            weight_counterparty: 15,
            weight_reference: 20,
            high_confidence: 80,
            medium_confidence: 50,
            min_score: 1,
        }
    }
}

/// Display settings for the booking calendar. Passed explicitly to the
/// renderer; persisted through a [`SettingsStore`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalendarSettings {
    pub resource_colors: BTreeMap<String, String>,
    pub external_color: String,
    pub banner_image: Option<String>,
}

pub const DEFAULT_RESOURCE_COLOR: &str = "blue";

impl Default for CalendarSettings {
    fn default() -> Self {
        Self {
            resource_colors: BTreeMap::new(),
            external_color: "gray".to_string(),
            banner_image: None,
        }
    }
}

impl CalendarSettings {
    pub fn color_for(&self, resource: &str) -> &str {
        if let Some(c) = self.resource_colors.get(resource) {
            return c;
        }
        if resource == EXTERNAL_RESOURCE {
            &self.external_color
        } else {
            DEFAULT_RESOURCE_COLOR
        }
    }
}

pub trait SettingsStore {
    fn load_settings(&self) -> Result<CalendarSettings>;
    fn save_settings(&self, settings: &CalendarSettings) -> Result<()>;
}

#[derive(Debug, Clone)]
pub struct AppPaths {
    pub config_dir: PathBuf,
    pub data_dir: PathBuf,
}

pub fn app_paths(override_home: Option<PathBuf>) -> Result<AppPaths> {
    if let Some(home) = override_home {
        return Ok(AppPaths {
            config_dir: home.join("config"),
            data_dir: home.join("data"),
        });
    }

    let proj = ProjectDirs::from("com", "charterdesk", "charterdesk")
        .context("Failed to resolve platform directories")?;

    Ok(AppPaths {
        config_dir: proj.config_dir().to_path_buf(),
        data_dir: proj.data_dir().to_path_buf(),
    })
}

pub fn load_or_init_config(paths: &AppPaths) -> Result<(AppConfig, PathBuf)> {
    fs::create_dir_all(&paths.config_dir)
        .with_context(|| format!("Failed to create config dir {}", paths.config_dir.display()))?;

    let cfg_path = paths.config_dir.join("config.json");
    if !cfg_path.exists() {
        let cfg = AppConfig::default();
        write_config(&cfg_path, &cfg)?;
        return Ok((cfg, cfg_path));
    }

    let raw = fs::read_to_string(&cfg_path)
        .with_context(|| format!("Failed to read {}", cfg_path.display()))?;
    let cfg: AppConfig = serde_json::from_str(&raw)
        .with_context(|| format!("Failed to parse {}", cfg_path.display()))?;

    Ok((cfg, cfg_path))
}

pub fn write_config(path: &Path, cfg: &AppConfig) -> Result<()> {
    let json = serde_json::to_string_pretty(cfg)?;
    fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}

pub fn tenant_slug(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for ch in name.chars() {
        let mapped = match ch {
            'a'..='z' | '0'..='9' | '-' | '_' => Some(ch),
            'A'..='Z' => Some(ch.to_ascii_lowercase()),
            ' ' | ':' | '/' | '\\' | '.' => Some('-'),
            _ => None,
        };
        if let Some(c) = mapped {
            if !(c == '-' && out.ends_with('-')) {
                out.push(c);
            }
        }
    }

    let trimmed = out.trim_matches('-');
    if trimmed.is_empty() {
        "tenant".to_string()
    } else {
        trimmed.to_string()
    }
}

pub fn now_utc() -> DateTime<Utc> {
    Utc::now()
}
