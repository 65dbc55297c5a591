//! Keyword rule tables and the enrichment pass that backfills inferred fields.
//!
//! Rule tables are data, not code: the tag patterns, jurisdiction host rules
//! and tender patterns ship with compiled-in defaults and can be replaced
//! wholesale from a YAML file without touching the dispatch logic. Singular
//! fields already carrying a value are never overwritten; tag sets only grow,
//! so re-running the pass over the same text is a no-op.

use std::path::Path;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use gtr_core::{extract_close_date, DateOutcome, ListingType, Opportunity, RadarConfig, DATE_FORMAT};
use rayon::prelude::*;
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use url::Url;

pub const CRATE_NAME: &str = "gtr-rules";

/// One tag with its case-insensitive match pattern.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagRule {
    pub tag: String,
    pub pattern: String,
}

/// One jurisdiction decided by URL-host membership. `contains` are substring
/// checks, `suffixes` are end-of-host checks; either kind is a hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostRule {
    pub jurisdiction: String,
    #[serde(default)]
    pub contains: Vec<String>,
    #[serde(default)]
    pub suffixes: Vec<String>,
}

impl HostRule {
    fn matches(&self, host: &str) -> bool {
        self.contains.iter().any(|c| host.contains(c.as_str()))
            || self.suffixes.iter().any(|s| host.ends_with(s.as_str()))
    }
}

/// The full rule configuration surface. Ordered: the first matching host
/// rule wins, and tag rules apply in table order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuleSet {
    pub audience: Vec<TagRule>,
    pub discipline: Vec<TagRule>,
    pub jurisdiction: Vec<HostRule>,
    pub tender_url: String,
    pub tender_text: String,
    pub council_hosts: Vec<String>,
}

fn tag_rules(rules: &[(&str, &str)]) -> Vec<TagRule> {
    rules
        .iter()
        .map(|(tag, pattern)| TagRule {
            tag: (*tag).to_string(),
            pattern: (*pattern).to_string(),
        })
        .collect()
}

impl Default for RuleSet {
    fn default() -> Self {
        Self {
            audience: tag_rules(&[
                ("community", r"\b(community|club|not[- ]?for[- ]?profit|nfp|volunteer|arts|sport)\b"),
                ("business", r"\b(business|sme|startup|company|commerciali[sz]ation)\b"),
                ("students", r"\b(student|scholarship|undergrad|postgrad|hdr|phd)\b"),
                ("research", r"\b(research|r&d|fellowship|grant round|arc|nhmrc)\b"),
            ]),
            discipline: tag_rules(&[
                ("health", r"\b(health|medical|hospital|clinic|nhmrc)\b"),
                ("engineering", r"\b(engineer|infrastructure|transport|construction)\b"),
                ("environment", r"\b(environment|sustainab|recycl|waste|emission|energy)\b"),
                ("arts", r"\b(arts?|creative|culture)\b"),
                ("sport", r"\b(sport|recreation)\b"),
            ]),
            jurisdiction: vec![
                HostRule {
                    jurisdiction: "Commonwealth".to_string(),
                    contains: vec![
                        "grants.gov.au".to_string(),
                        "business.gov.au".to_string(),
                        "austender".to_string(),
                    ],
                    suffixes: vec![],
                },
                HostRule {
                    jurisdiction: "VIC".to_string(),
                    contains: vec!["business.vic.gov.au".to_string(), "wyndham.vic.gov.au".to_string()],
                    suffixes: vec![".vic.gov.au".to_string()],
                },
            ],
            tender_url: r"tender|atm|rft|rfq|rfp|contract".to_string(),
            tender_text: r"\btender\b".to_string(),
            council_hosts: vec!["wyndham.vic.gov.au".to_string()],
        }
    }
}

impl RuleSet {
    /// Load a replacement rule table from YAML. Unlike the radar config, a
    /// named rules file that cannot be read or parsed is an error.
    pub fn from_yaml_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        serde_yaml::from_str(&text).with_context(|| format!("parsing {}", path.display()))
    }
}

/// Rule tables compiled against a locality. All patterns are matched
/// case-insensitively, mirroring how the tables are written.
pub struct Classifier {
    audience: Vec<(String, Regex)>,
    discipline: Vec<(String, Regex)>,
    jurisdiction: Vec<HostRule>,
    tender_url: Regex,
    tender_text: Regex,
    council_hosts: Vec<String>,
    locality: String,
    locality_lower: String,
}

fn compile(pattern: &str) -> Result<Regex> {
    RegexBuilder::new(pattern)
        .case_insensitive(true)
        .build()
        .with_context(|| format!("compiling rule pattern {pattern:?}"))
}

fn compile_tags(rules: &[TagRule]) -> Result<Vec<(String, Regex)>> {
    rules
        .iter()
        .map(|r| Ok((r.tag.clone(), compile(&r.pattern)?)))
        .collect()
}

fn host_of(url: &str) -> Option<String> {
    Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.to_ascii_lowercase()))
}

impl Classifier {
    pub fn new(rules: &RuleSet, config: &RadarConfig) -> Result<Self> {
        Ok(Self {
            audience: compile_tags(&rules.audience)?,
            discipline: compile_tags(&rules.discipline)?,
            jurisdiction: rules.jurisdiction.clone(),
            tender_url: compile(&rules.tender_url)?,
            tender_text: compile(&rules.tender_text)?,
            council_hosts: rules
                .council_hosts
                .iter()
                .map(|h| h.to_ascii_lowercase())
                .collect(),
            locality: config.lga.clone(),
            locality_lower: config.lga.to_lowercase(),
        })
    }

    fn jurisdiction_for(&self, host: &str) -> Option<String> {
        self.jurisdiction
            .iter()
            .find(|rule| rule.matches(host))
            .map(|rule| rule.jurisdiction.clone())
    }

    /// Enrich one record in place. Additive and idempotent: inferred values
    /// fill gaps, tag unions converge after a single pass over the text.
    pub fn classify(&self, record: &mut Opportunity, today: NaiveDate) {
        let blob = record.combined_text();
        let host = record.url.as_deref().and_then(host_of);

        if record.kind.is_none() {
            let url_hit = record
                .url
                .as_deref()
                .map(|u| self.tender_url.is_match(u))
                .unwrap_or(false);
            let kind = if url_hit || self.tender_text.is_match(&blob) {
                ListingType::Tender
            } else {
                ListingType::Grant
            };
            record.kind = Some(kind);
        }

        if record.jurisdiction.is_none() {
            record.jurisdiction = host.as_deref().and_then(|h| self.jurisdiction_for(h));
        }

        if record.lga.is_none() {
            let council_hit = host
                .as_deref()
                .map(|h| self.council_hosts.iter().any(|c| h.contains(c.as_str())))
                .unwrap_or(false);
            if council_hit || blob.to_lowercase().contains(&self.locality_lower) {
                record.lga = Some(self.locality.clone());
            }
        }

        for (tag, pattern) in &self.audience {
            if pattern.is_match(&blob) {
                record.audience.insert(tag.clone());
            }
        }
        for (tag, pattern) in &self.discipline {
            if pattern.is_match(&blob) {
                record.discipline.insert(tag.clone());
            }
        }

        if record.close_date.is_none() {
            if let DateOutcome::Resolved(d) = extract_close_date(&blob) {
                debug!(date = %d, title = %record.title, "extracted close date from text");
                record.close_date = Some(d.format(DATE_FORMAT).to_string());
            }
        }

        if record.last_seen.is_none() {
            record.last_seen = Some(today.format(DATE_FORMAT).to_string());
        }

        record.normalize(today);
    }

    /// Enrich a whole collection. Classification has no cross-record
    /// dependency, so records fan out across threads; in-place mutation
    /// keeps the collection order untouched.
    pub fn classify_all(&self, records: &mut [Opportunity], today: NaiveDate) {
        records
            .par_iter_mut()
            .for_each(|record| self.classify(record, today));
        info!(records = records.len(), "enrichment pass complete");
    }
}
