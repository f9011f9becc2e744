// src/config/profiles.rs
//! Summary profiles: named prompt variants, each backed by a
//! `summary_<name>` column in the store.
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

pub const ENV_PROFILES_PATH: &str = "BACKLOG_PROFILES_PATH";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub name: String,
    pub prompt: String,
}

impl Profile {
    pub fn new(name: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            prompt: prompt.into(),
        }
    }

    /// Store column holding this profile's output.
    pub fn column(&self) -> String {
        column_for(&self.name)
    }
}

pub fn column_for(profile: &str) -> String {
    format!("summary_{profile}")
}

/// Built-in audience levels.
pub fn default_profiles() -> Vec<Profile> {
    vec![
        Profile::new(
            "simple",
            "Explain and summarize this legislative bill to a 12 year old. Be as verbose as needed not to miss a detail.",
        ),
        Profile::new(
            "medium",
            "Explain and summarize this legislative bill to a 16 year old. Be as verbose as needed not to miss a detail.",
        ),
        Profile::new(
            "complex",
            "Provide a detailed summary of this bill for a policy expert in plain language.",
        ),
    ]
}

/// Load profiles from an explicit path. Supports TOML or JSON formats.
pub fn load_profiles_from(path: &Path) -> Result<Vec<Profile>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("reading profiles from {}", path.display()))?;
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    parse_profiles(&content, ext.as_str())
}

/// Resolve profiles:
/// 1) explicit path (usually $BACKLOG_PROFILES_PATH)
/// 2) config/profiles.toml
/// 3) config/profiles.json
/// 4) built-in defaults
pub fn load_profiles(explicit: Option<&str>) -> Result<Vec<Profile>> {
    if let Some(p) = explicit {
        let pb = PathBuf::from(p);
        if !pb.exists() {
            return Err(anyhow!("{ENV_PROFILES_PATH} points to non-existent path"));
        }
        return load_profiles_from(&pb);
    }
    for candidate in ["config/profiles.toml", "config/profiles.json"] {
        let pb = PathBuf::from(candidate);
        if pb.exists() {
            return load_profiles_from(&pb);
        }
    }
    Ok(default_profiles())
}

fn parse_profiles(s: &str, hint_ext: &str) -> Result<Vec<Profile>> {
    let parsed = if hint_ext == "json" || s.trim_start().starts_with('[') {
        parse_json(s).or_else(|_| parse_toml(s))
    } else {
        parse_toml(s).or_else(|_| parse_json(s))
    }
    .map_err(|_| anyhow!("unsupported profiles format"))?;

    let cleaned = clean_profiles(parsed);
    if cleaned.is_empty() {
        return Err(anyhow!("profile list is empty"));
    }
    Ok(cleaned)
}

fn parse_toml(s: &str) -> Result<Vec<Profile>> {
    #[derive(Deserialize)]
    struct TomlProfiles {
        profiles: Vec<Profile>,
    }
    let v: TomlProfiles = toml::from_str(s)?;
    Ok(v.profiles)
}

fn parse_json(s: &str) -> Result<Vec<Profile>> {
    Ok(serde_json::from_str(s)?)
}

/// Trim names, drop empty ones and later duplicates; declared order is kept.
/// Names end up in column names, so only `[a-z0-9_]` survives.
fn clean_profiles(items: Vec<Profile>) -> Vec<Profile> {
    let mut seen = HashSet::new();
    let mut out = Vec::with_capacity(items.len());
    for it in items {
        let name = it.name.trim().to_ascii_lowercase();
        if name.is_empty() {
            continue;
        }
        if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            tracing::warn!(profile = %name, "skipping profile with unusable name");
            continue;
        }
        if !seen.insert(name.clone()) {
            continue;
        }
        out.push(Profile {
            name,
            prompt: it.prompt.trim().to_string(),
        });
    }
    out
}
