// src/relevance.rs
//! Relevance gate: keyword heuristic deciding whether a normalized record is
//! in scope for the target population. Recall-favoring: any locality hit OR
//! any breadth hit passes.

use serde::Deserialize;
use std::collections::BTreeSet;
use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};
use std::thread;
use std::time::{Duration, SystemTime};
use tracing::{debug, info, warn};

use crate::ingest::types::ScholarshipRecord;

// --- env defaults & names ---
pub const DEFAULT_RELEVANCE_CONFIG_PATH: &str = "config/relevance.toml";
pub const ENV_RELEVANCE_CONFIG_PATH: &str = "RELEVANCE_CONFIG_PATH";

const DEFAULT_LOCALITY: &[&str] = &[
    "nigeria",
    "nigerian",
    "lagos",
    "abuja",
    "kano",
    "ibadan",
    "port harcourt",
    "enugu",
    "kaduna",
    "benin city",
    "ogun state",
    "oyo state",
    "rivers state",
    "west africa",
    "ecowas",
];

const DEFAULT_BREADTH: &[&str] = &[
    "international",
    "africa",
    "developing countries",
    "developing nations",
    "low-income countries",
    "global south",
    "worldwide",
    "all countries",
    "all nationalities",
    "any nationality",
    "commonwealth",
    "sub-saharan",
];

// Dev env: debug build or SHUTTLE_ENV in {local,development,dev}
pub(crate) fn is_dev_env() -> bool {
    cfg!(debug_assertions)
        || matches!(
            std::env::var("SHUTTLE_ENV")
                .unwrap_or_default()
                .to_ascii_lowercase()
                .as_str(),
            "local" | "development" | "dev"
        )
}

/* ----------------------------
Config schema (from TOML)
---------------------------- */

#[derive(Debug, Clone, Deserialize)]
pub struct RelevanceConfig {
    #[serde(default)]
    pub locality: Vec<String>,
    #[serde(default)]
    pub breadth: Vec<String>,
}

/// Compiled keyword sets (trimmed, lowercased, de-duplicated).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelevanceFilter {
    locality: Vec<String>,
    breadth: Vec<String>,
}

fn clean_keywords<I, S>(items: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    items
        .into_iter()
        .map(|s| s.as_ref().trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

fn first_hit<'a>(set: &'a [String], hay: &str) -> Option<&'a String> {
    set.iter().find(|k| hay.contains(k.as_str()))
}

impl Default for RelevanceFilter {
    fn default() -> Self {
        Self::new(DEFAULT_LOCALITY.iter(), DEFAULT_BREADTH.iter())
    }
}

impl RelevanceFilter {
    pub fn new<I, J, S, T>(locality: I, breadth: J) -> Self
    where
        I: IntoIterator<Item = S>,
        J: IntoIterator<Item = T>,
        S: AsRef<str>,
        T: AsRef<str>,
    {
        Self {
            locality: clean_keywords(locality),
            breadth: clean_keywords(breadth),
        }
    }

    /// Load from a TOML string. An empty section falls back to the built-in set.
    pub fn from_toml_str(toml_str: &str) -> anyhow::Result<Self> {
        let cfg: RelevanceConfig = toml::from_str(toml_str)?;
        let defaults = Self::default();
        let mut f = Self::new(cfg.locality, cfg.breadth);
        if f.locality.is_empty() {
            f.locality = defaults.locality;
        }
        if f.breadth.is_empty() {
            f.breadth = defaults.breadth;
        }
        Ok(f)
    }

    /// Load from RELEVANCE_CONFIG_PATH or "config/relevance.toml"; built-in sets
    /// when neither exists. An explicit env path must exist.
    pub fn from_env() -> anyhow::Result<Self> {
        let path = match std::env::var(ENV_RELEVANCE_CONFIG_PATH) {
            Ok(p) => {
                let pb = PathBuf::from(p);
                if !pb.exists() {
                    anyhow::bail!("{ENV_RELEVANCE_CONFIG_PATH} points to non-existent path");
                }
                pb
            }
            Err(_) => {
                let pb = PathBuf::from(DEFAULT_RELEVANCE_CONFIG_PATH);
                if !pb.exists() {
                    info!(target: "relevance", "no keyword config found, using built-in sets");
                    return Ok(Self::default());
                }
                pb
            }
        };
        let content = fs::read_to_string(&path).map_err(|e| {
            anyhow::anyhow!(
                "Failed to read relevance config at {}: {}",
                path.display(),
                e
            )
        })?;
        Self::from_toml_str(&content)
    }

    pub fn locality(&self) -> &[String] {
        &self.locality
    }

    pub fn breadth(&self) -> &[String] {
        &self.breadth
    }

    /// Substring match over lowercase `title + " " + description`.
    pub fn is_relevant_text(&self, title: &str, description: &str) -> bool {
        let hay = format!("{} {}", title, description).to_lowercase();
        match first_hit(&self.locality, &hay).or_else(|| first_hit(&self.breadth, &hay)) {
            Some(k) => {
                debug!(target: "relevance", keyword = %k, "relevant");
                true
            }
            None => false,
        }
    }

    pub fn is_relevant(&self, record: &ScholarshipRecord) -> bool {
        self.is_relevant_text(&record.title, &record.description)
    }
}

/* ----------------------------
Thread-safe handle + hot reload
---------------------------- */

/// A threadsafe handle that can hot-reload the underlying keyword sets in dev/local.
/// - Enable by setting RELEVANCE_HOT_RELOAD=1
/// - Dev-gated: active only if cfg!(debug_assertions) OR SHUTTLE_ENV is "local"/"development".
#[derive(Clone, Debug)]
pub struct RelevanceHandle {
    inner: Arc<RwLock<RelevanceFilter>>,
}

impl Default for RelevanceHandle {
    fn default() -> Self {
        Self::new(RelevanceFilter::default())
    }
}

impl RelevanceHandle {
    pub fn new(filter: RelevanceFilter) -> Self {
        Self {
            inner: Arc::new(RwLock::new(filter)),
        }
    }

    /// Copy of the current keyword sets.
    pub fn snapshot(&self) -> RelevanceFilter {
        match self.inner.read() {
            Ok(f) => f.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn replace(&self, filter: RelevanceFilter) {
        match self.inner.write() {
            Ok(mut guard) => *guard = filter,
            Err(poisoned) => *poisoned.into_inner() = filter,
        }
    }

    pub fn is_relevant(&self, record: &ScholarshipRecord) -> bool {
        match self.inner.read() {
            Ok(f) => f.is_relevant(record),
            Err(poisoned) => poisoned.into_inner().is_relevant(record),
        }
    }
}

/// Returns true if we should enable hot reload (dev/local only).
fn hot_reload_enabled() -> bool {
    let want = std::env::var("RELEVANCE_HOT_RELOAD")
        .ok()
        .is_some_and(|v| v == "1");
    want && is_dev_env()
}

/// Start a simple polling watcher on `path` to hot-reload into `handle`.
/// Polls mtime every 2s.
pub fn start_hot_reload_thread(handle: RelevanceHandle, path: PathBuf) {
    if !hot_reload_enabled() {
        return;
    }

    thread::spawn(move || {
        let poll = Duration::from_secs(2);
        let mut last_mtime: Option<SystemTime> = None;

        loop {
            if let Ok(mtime) = fs::metadata(&path).and_then(|m| m.modified()) {
                let changed = match last_mtime {
                    None => {
                        last_mtime = Some(mtime);
                        false
                    }
                    Some(prev) => mtime > prev,
                };
                if changed {
                    match fs::read_to_string(&path)
                        .map_err(anyhow::Error::from)
                        .and_then(|c| RelevanceFilter::from_toml_str(&c))
                    {
                        Ok(f) => {
                            info!(
                                target: "relevance",
                                locality = f.locality.len(),
                                breadth = f.breadth.len(),
                                "keyword sets reloaded"
                            );
                            handle.replace(f);
                        }
                        Err(e) => warn!(target: "relevance", error = %e, "reload failed, keeping old sets"),
                    }
                    last_mtime = Some(mtime);
                }
            }
            thread::sleep(poll);
        }
    });
}

/* ----------------------------
Tests
---------------------------- */
