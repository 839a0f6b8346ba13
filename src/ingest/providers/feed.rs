// src/ingest/providers/feed.rs
use quick_xml::de::from_str;
use serde::Deserialize;
use time::{format_description::well_known::Rfc2822, OffsetDateTime};

use super::Extraction;
use crate::ingest::clean_opt;
use crate::ingest::error::ExtractionError;
use crate::ingest::normalize::{DEFAULT_DESCRIPTION, DEFAULT_TITLE};
use crate::ingest::types::CandidateRecord;

#[derive(Debug, Deserialize)]
struct Rss {
    channel: Channel,
}

#[derive(Debug, Deserialize)]
struct Channel {
    #[serde(rename = "item", default)]
    item: Vec<Item>,
}

#[derive(Debug, Deserialize)]
struct Item {
    title: Option<String>,
    link: Option<String>,
    #[serde(rename = "pubDate")]
    pub_date: Option<String>,
    description: Option<String>,
    #[serde(rename = "content:encoded", alias = "encoded")]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AtomFeed {
    #[serde(rename = "entry", default)]
    entry: Vec<Entry>,
}

#[derive(Debug, Deserialize)]
struct Entry {
    title: Option<TextNode>,
    #[serde(rename = "link", default)]
    link: Vec<AtomLink>,
    summary: Option<TextNode>,
    content: Option<TextNode>,
    published: Option<String>,
    updated: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AtomLink {
    #[serde(rename = "@href")]
    href: Option<String>,
    #[serde(rename = "@rel")]
    rel: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TextNode {
    #[serde(rename = "$text", default)]
    text: String,
}

/// RFC 2822 `pubDate` → `YYYY-MM-DD`, so the deadline parser's ISO form applies.
fn rfc2822_to_iso_date(ts: &str) -> Option<String> {
    let dt = OffsetDateTime::parse(ts.trim(), &Rfc2822).ok()?;
    let d = dt.date();
    Some(format!(
        "{:04}-{:02}-{:02}",
        d.year(),
        u8::from(d.month()),
        d.day()
    ))
}

fn scrub_html_entities_for_xml(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&ndash;", "-")
        .replace("&mdash;", "-")
        .replace("&ldquo;", "\"")
        .replace("&rdquo;", "\"")
        .replace("&lsquo;", "'")
        .replace("&rsquo;", "'")
        .replace("&pound;", "£")
        .replace("&euro;", "€")
        .replace("&yen;", "¥")
}

fn with_defaults(mut c: CandidateRecord, endpoint: &str) -> CandidateRecord {
    c.title.get_or_insert_with(|| DEFAULT_TITLE.to_string());
    c.description
        .get_or_insert_with(|| DEFAULT_DESCRIPTION.to_string());
    c.source_url.get_or_insert_with(|| endpoint.to_string());
    c
}

fn from_rss_item(it: Item, endpoint: &str) -> CandidateRecord {
    let description = clean_opt(it.description.as_deref());
    let content = clean_opt(it.content.as_deref());
    with_defaults(
        CandidateRecord {
            title: clean_opt(it.title.as_deref()),
            description: description.clone().or_else(|| content.clone()),
            raw_amount: content.or(description),
            raw_deadline: it
                .pub_date
                .as_deref()
                .map(|p| rfc2822_to_iso_date(p).unwrap_or_else(|| p.trim().to_string())),
            source_url: it.link.map(|l| l.trim().to_string()).filter(|l| !l.is_empty()),
        },
        endpoint,
    )
}

fn from_atom_entry(e: Entry, endpoint: &str) -> CandidateRecord {
    let summary = clean_opt(e.summary.as_ref().map(|t| t.text.as_str()));
    let content = clean_opt(e.content.as_ref().map(|t| t.text.as_str()));
    let link = e
        .link
        .iter()
        .find(|l| l.rel.as_deref().map_or(true, |r| r == "alternate"))
        .or_else(|| e.link.first())
        .and_then(|l| l.href.clone());
    with_defaults(
        CandidateRecord {
            title: clean_opt(e.title.as_ref().map(|t| t.text.as_str())),
            description: summary.clone().or_else(|| content.clone()),
            raw_amount: content.or(summary),
            raw_deadline: e.published.or(e.updated),
            source_url: link,
        },
        endpoint,
    )
}

/// One candidate per feed item; missing fields take defaults, nothing is dropped.
pub fn extract(xml: &str, endpoint: &str) -> Result<Extraction, ExtractionError> {
    let xml_clean = scrub_html_entities_for_xml(xml);

    let candidates = match from_str::<Rss>(&xml_clean) {
        Ok(rss) => rss
            .channel
            .item
            .into_iter()
            .map(|it| from_rss_item(it, endpoint))
            .collect(),
        Err(rss_err) if xml_clean.contains("<feed") => {
            let atom: AtomFeed = from_str(&xml_clean).map_err(|e| ExtractionError::Malformed {
                format: "atom",
                reason: e.to_string(),
            })?;
            tracing::debug!(target: "ingest", error = %rss_err, "not rss, parsed as atom");
            atom.entry
                .into_iter()
                .map(|e| from_atom_entry(e, endpoint))
                .collect()
        }
        Err(e) => {
            return Err(ExtractionError::Malformed {
                format: "rss",
                reason: e.to_string(),
            })
        }
    };

    Ok(Extraction {
        candidates,
        skipped: Vec::new(),
    })
}
