// src/ingest/types.rs
//! Data model shared by every pipeline stage: source descriptors, raw
//! candidates, normalized scholarship records and the batch result.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One external origin of scholarship data. Immutable once loaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceDescriptor {
    pub name: String,
    pub endpoint: String,
    #[serde(flatten)]
    pub mechanism: Mechanism,
}

/// How a source is fetched and which extractor reads its response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mechanism", rename_all = "snake_case")]
pub enum Mechanism {
    Document {
        selectors: SelectorSet,
    },
    Feed,
    Api {
        #[serde(default)]
        headers: BTreeMap<String, String>,
        #[serde(default)]
        params: BTreeMap<String, String>,
        /// Top-level key holding the record array, tried before the defaults.
        #[serde(default)]
        items_key: Option<String>,
    },
}

impl Mechanism {
    pub fn provenance(&self) -> Provenance {
        match self {
            Mechanism::Document { .. } => Provenance::DocumentScrape,
            Mechanism::Feed => Provenance::Feed,
            Mechanism::Api { .. } => Provenance::Api,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Mechanism::Document { .. } => "document",
            Mechanism::Feed => "feed",
            Mechanism::Api { .. } => "api",
        }
    }

    /// API mechanism with no extra headers, params or shape hint.
    pub fn plain_api() -> Self {
        Mechanism::Api {
            headers: BTreeMap::new(),
            params: BTreeMap::new(),
            items_key: None,
        }
    }
}

impl SourceDescriptor {
    pub fn new(name: impl Into<String>, endpoint: impl Into<String>, mechanism: Mechanism) -> Self {
        Self {
            name: name.into(),
            endpoint: endpoint.into(),
            mechanism,
        }
    }
}

/// Prioritized alternative CSS selectors; the first one that yields text wins.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "OneOrMany")]
pub struct SelectorList(pub Vec<String>);

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl From<OneOrMany> for SelectorList {
    fn from(v: OneOrMany) -> Self {
        let raw = match v {
            OneOrMany::One(s) => vec![s],
            OneOrMany::Many(v) => v,
        };
        SelectorList(
            raw.into_iter()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
        )
    }
}

impl SelectorList {
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

impl From<&str> for SelectorList {
    fn from(s: &str) -> Self {
        SelectorList(vec![s.to_string()])
    }
}

impl<const N: usize> From<[&str; N]> for SelectorList {
    fn from(v: [&str; N]) -> Self {
        SelectorList(v.iter().map(|s| s.to_string()).collect())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectorSet {
    pub container: SelectorList,
    pub title: SelectorList,
    #[serde(default)]
    pub amount: SelectorList,
    #[serde(default)]
    pub deadline: SelectorList,
    pub description: SelectorList,
}

/// Category filter for a full-registry run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    #[default]
    All,
    Scrape,
    Feed,
}

impl Category {
    pub fn admits(self, mechanism: &Mechanism) -> bool {
        match self {
            Category::All => true,
            Category::Scrape => matches!(mechanism, Mechanism::Document { .. }),
            Category::Feed => matches!(mechanism, Mechanism::Feed),
        }
    }
}

/// Raw-text stage of one extracted item.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CandidateRecord {
    pub title: Option<String>,
    pub description: Option<String>,
    pub raw_amount: Option<String>,
    pub raw_deadline: Option<String>,
    pub source_url: Option<String>,
}

impl CandidateRecord {
    /// Title and description both present and non-blank.
    pub fn is_complete(&self) -> bool {
        let filled = |f: &Option<String>| f.as_deref().is_some_and(|s| !s.trim().is_empty());
        filled(&self.title) && filled(&self.description)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    DocumentScrape,
    Feed,
    Api,
}

/// Normalized pipeline output unit.
///
/// `amount == 0` means the amount was absent or unparseable. `deadline`
/// serializes as the ISO-8601 instant of local midnight on that date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScholarshipRecord {
    pub title: String,
    pub description: String,
    pub amount: u64,
    #[serde(with = "local_midnight", default)]
    pub deadline: Option<NaiveDate>,
    pub source_url: String,
    pub provenance: Provenance,
}

/// Per-source summary carried alongside the batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceOutcome {
    pub source: String,
    pub mechanism: &'static str,
    pub candidates: usize,
    pub skipped: usize,
    pub kept: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchResult {
    pub records: Vec<ScholarshipRecord>,
    pub count: usize,
    pub sources: Vec<SourceOutcome>,
}

impl BatchResult {
    pub fn sample(&self, n: usize) -> &[ScholarshipRecord] {
        &self.records[..self.records.len().min(n)]
    }
}

mod local_midnight {
    use chrono::{DateTime, Local, NaiveDate, SecondsFormat, TimeZone, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(v: &Option<NaiveDate>, s: S) -> Result<S::Ok, S::Error> {
        match v {
            Some(d) => {
                let naive = d.and_hms_opt(0, 0, 0).unwrap_or_default();
                let instant = Local
                    .from_local_datetime(&naive)
                    .earliest()
                    .map(|dt| dt.with_timezone(&Utc))
                    .unwrap_or_else(|| Utc.from_utc_datetime(&naive));
                s.serialize_str(&instant.to_rfc3339_opts(SecondsFormat::Millis, true))
            }
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<NaiveDate>, D::Error> {
        let raw: Option<String> = Option::deserialize(d)?;
        let Some(raw) = raw else {
            return Ok(None);
        };
        if let Ok(dt) = DateTime::parse_from_rfc3339(&raw) {
            return Ok(Some(dt.with_timezone(&Local).date_naive()));
        }
        NaiveDate::parse_from_str(&raw, "%Y-%m-%d")
            .map(Some)
            .map_err(serde::de::Error::custom)
    }
}
