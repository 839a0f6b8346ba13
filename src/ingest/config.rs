// src/ingest/config.rs
//! Source registry: the catalog of descriptors the aggregator runs over.
//! Loaded once at startup and passed in by value; never mutated afterwards.

use anyhow::{anyhow, bail, Context, Result};
use serde::Deserialize;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use crate::ingest::types::{Category, Mechanism, SelectorSet, SourceDescriptor};

pub const ENV_SOURCES_PATH: &str = "SCHOLARSHIP_SOURCES_PATH";
pub const ENV_MAX_IN_FLIGHT: &str = "SCHOLARSHIP_MAX_IN_FLIGHT";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceRegistry {
    sources: Vec<SourceDescriptor>,
}

impl SourceRegistry {
    /// Validates names (unique, non-empty) and endpoints (non-empty).
    pub fn new(sources: Vec<SourceDescriptor>) -> Result<Self> {
        let mut seen = HashSet::new();
        for s in &sources {
            if s.name.trim().is_empty() {
                bail!("source with endpoint `{}` has an empty name", s.endpoint);
            }
            if s.endpoint.trim().is_empty() {
                bail!("source `{}` has an empty endpoint", s.name);
            }
            if !seen.insert(s.name.as_str()) {
                bail!("duplicate source name `{}`", s.name);
            }
        }
        Ok(Self { sources })
    }

    pub fn sources(&self) -> &[SourceDescriptor] {
        &self.sources
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// Exact-name lookup across all mechanisms.
    pub fn find(&self, name: &str) -> Option<&SourceDescriptor> {
        self.sources.iter().find(|s| s.name == name)
    }

    /// Registry-order iteration restricted to a category.
    pub fn in_category(&self, category: Category) -> impl Iterator<Item = &SourceDescriptor> {
        self.sources
            .iter()
            .filter(move |s| category.admits(&s.mechanism))
    }

    /// Selectors of the first registered document source.
    pub fn default_selectors(&self) -> Option<&SelectorSet> {
        self.sources.iter().find_map(|s| match &s.mechanism {
            Mechanism::Document { selectors } => Some(selectors),
            _ => None,
        })
    }

    /// Built-in catalog used when no config file is present.
    pub fn builtin() -> Self {
        let article_selectors = SelectorSet {
            container: [".scholarship", "article", ".post"].into(),
            title: [".entry-title", "h2", "h3"].into(),
            amount: [".amount", ".award", ".funding"].into(),
            deadline: [".deadline", ".closing-date", "time"].into(),
            description: [".excerpt", ".entry-summary", ".entry-content p", "p"].into(),
        };
        Self {
            sources: vec![
                SourceDescriptor::new(
                    "Scholarships for Development",
                    "https://www.scholars4dev.com/category/country/africa-scholarships/",
                    Mechanism::Document {
                        selectors: article_selectors.clone(),
                    },
                ),
                SourceDescriptor::new(
                    "Opportunities For Africans",
                    "https://www.opportunitiesforafricans.com/category/scholarships/",
                    Mechanism::Document {
                        selectors: article_selectors,
                    },
                ),
                SourceDescriptor::new(
                    "Opportunity Desk",
                    "https://opportunitydesk.org/category/scholarships/feed/",
                    Mechanism::Feed,
                ),
                SourceDescriptor::new(
                    "After School Africa",
                    "https://www.afterschoolafrica.com/category/scholarships/feed/",
                    Mechanism::Feed,
                ),
                SourceDescriptor::new(
                    "Scholarship Region",
                    "https://www.scholarshipregion.com/feed/",
                    Mechanism::Feed,
                ),
            ],
        }
    }
}

#[derive(Deserialize)]
struct RegistryFile {
    #[serde(default)]
    sources: Vec<SourceDescriptor>,
}

/// Load the registry from an explicit path. Supports TOML or JSON formats.
pub fn load_registry_from(path: &Path) -> Result<SourceRegistry> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("reading sources from {}", path.display()))?;
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    let sources = parse_registry(&content, ext.as_str())
        .with_context(|| format!("parsing sources from {}", path.display()))?;
    SourceRegistry::new(sources)
}

/// Load the registry using env var + fallbacks:
/// 1) $SCHOLARSHIP_SOURCES_PATH
/// 2) config/sources.toml
/// 3) config/sources.json
/// 4) built-in catalog
pub fn load_registry_default() -> Result<SourceRegistry> {
    if let Ok(p) = std::env::var(ENV_SOURCES_PATH) {
        let pb = PathBuf::from(p);
        if pb.exists() {
            return load_registry_from(&pb);
        } else {
            return Err(anyhow!("{ENV_SOURCES_PATH} points to non-existent path"));
        }
    }
    let toml_p = PathBuf::from("config/sources.toml");
    if toml_p.exists() {
        return load_registry_from(&toml_p);
    }
    let json_p = PathBuf::from("config/sources.json");
    if json_p.exists() {
        return load_registry_from(&json_p);
    }
    Ok(SourceRegistry::builtin())
}

fn parse_registry(s: &str, hint_ext: &str) -> Result<Vec<SourceDescriptor>> {
    let try_toml = hint_ext == "toml" || s.contains("[[sources]]");
    if try_toml {
        match toml::from_str::<RegistryFile>(s) {
            Ok(v) => return Ok(v.sources),
            Err(e) if hint_ext == "toml" => return Err(e.into()),
            Err(_) => {}
        }
    }
    let v: RegistryFile = serde_json::from_str(s).map_err(|e| anyhow!("unsupported sources format: {e}"))?;
    Ok(v.sources)
}

/// Aggregator fan-out width from $SCHOLARSHIP_MAX_IN_FLIGHT (1 = sequential).
pub fn max_in_flight_from_env() -> usize {
    std::env::var(ENV_MAX_IN_FLIGHT)
        .ok()
        .and_then(|v| v.trim().parse::<usize>().ok())
        .map(|n| n.clamp(1, 8))
        .unwrap_or(1)
}
