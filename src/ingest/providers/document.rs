// src/ingest/providers/document.rs
use reqwest::Url;
use scraper::{ElementRef, Html, Selector};

use super::Extraction;
use crate::ingest::tidy_text;
use crate::ingest::error::ExtractionError;
use crate::ingest::types::{CandidateRecord, SelectorList, SelectorSet};

struct Compiled {
    container: Vec<Selector>,
    title: Vec<Selector>,
    amount: Vec<Selector>,
    deadline: Vec<Selector>,
    description: Vec<Selector>,
    link: Selector,
}

fn compile(list: &SelectorList) -> Result<Vec<Selector>, ExtractionError> {
    list.iter()
        .map(|s| {
            Selector::parse(s).map_err(|_| ExtractionError::InvalidSelector {
                selector: s.to_string(),
            })
        })
        .collect()
}

impl Compiled {
    fn new(set: &SelectorSet) -> Result<Self, ExtractionError> {
        let link = Selector::parse("a[href]").map_err(|_| ExtractionError::InvalidSelector {
            selector: "a[href]".into(),
        })?;
        Ok(Self {
            container: compile(&set.container)?,
            title: compile(&set.title)?,
            amount: compile(&set.amount)?,
            deadline: compile(&set.deadline)?,
            description: compile(&set.description)?,
            link,
        })
    }
}

/// First non-empty text among the alternatives, each resolved to its first
/// match in document order under `scope`. Text nodes are joined as-is so
/// inline markup (`$1,<b>000</b>`) does not split tokens.
fn first_text(scope: &ElementRef<'_>, alternatives: &[Selector]) -> String {
    alternatives
        .iter()
        .filter_map(|sel| scope.select(sel).next())
        .map(|el| tidy_text(&el.text().collect::<String>()))
        .find(|t| !t.is_empty())
        .unwrap_or_default()
}

fn item_link(scope: &ElementRef<'_>, link: &Selector, base: Option<&Url>) -> Option<String> {
    let href = scope
        .value()
        .attr("href")
        .or_else(|| scope.select(link).next()?.value().attr("href"))?
        .trim();
    if href.is_empty() || href.starts_with('#') || href.starts_with("javascript:") {
        return None;
    }
    match base {
        Some(b) => b.join(href).ok().map(|u| u.to_string()),
        None => Url::parse(href).ok().map(|u| u.to_string()),
    }
}

/// Apply the container selector, then per-field selectors under each container.
/// Containers with an empty title or description are dropped.
pub fn extract(
    html: &str,
    selectors: &SelectorSet,
    endpoint: &str,
) -> Result<Extraction, ExtractionError> {
    let compiled = Compiled::new(selectors)?;
    let doc = Html::parse_document(html);
    let base = Url::parse(endpoint).ok();

    // First container alternative that matches anything wins.
    let containers: Vec<ElementRef<'_>> = compiled
        .container
        .iter()
        .map(|sel| doc.select(sel).collect::<Vec<_>>())
        .find(|found| !found.is_empty())
        .unwrap_or_default();

    let mut out = Extraction::default();
    for (index, el) in containers.iter().enumerate() {
        let text = |alts: &[Selector]| Some(first_text(el, alts)).filter(|s| !s.is_empty());
        let candidate = CandidateRecord {
            title: text(&compiled.title),
            description: text(&compiled.description),
            raw_amount: text(&compiled.amount),
            raw_deadline: text(&compiled.deadline),
            source_url: item_link(el, &compiled.link, base.as_ref())
                .or_else(|| Some(endpoint.to_string())),
        };
        if !candidate.is_complete() {
            out.skipped.push(ExtractionError::Item {
                index,
                reason: "missing title or description".into(),
            });
            continue;
        }
        out.candidates.push(candidate);
    }
    Ok(out)
}
