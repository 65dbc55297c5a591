//! Core domain model, record normalization and date resolution for GTR.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use anyhow::Context;
use chrono::{NaiveDate, NaiveDateTime};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

pub const CRATE_NAME: &str = "gtr-core";

/// Canonical wire format for calendar dates across the catalog.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Listing classification: every enriched record is one or the other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListingType {
    Grant,
    Tender,
}

impl ListingType {
    pub fn as_str(self) -> &'static str {
        match self {
            ListingType::Grant => "grant",
            ListingType::Tender => "tender",
        }
    }
}

impl fmt::Display for ListingType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ListingType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "grant" => Ok(ListingType::Grant),
            "tender" => Ok(ListingType::Tender),
            other => Err(format!("unknown listing type: {other}")),
        }
    }
}

/// Outcome of resolving a raw date string. Parse failure is a value, not an
/// error, so downstream views can tell a resolved date from an unresolvable
/// one without touching `Option` semantics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DateOutcome {
    Resolved(NaiveDate),
    #[default]
    Unresolved,
}

impl DateOutcome {
    pub fn resolved(self) -> Option<NaiveDate> {
        match self {
            DateOutcome::Resolved(d) => Some(d),
            DateOutcome::Unresolved => None,
        }
    }

    pub fn is_resolved(self) -> bool {
        matches!(self, DateOutcome::Resolved(_))
    }
}

/// Derived temporal attributes. Never persisted; recomputed from the raw
/// date strings whenever the catalog is loaded or a view is built.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Temporal {
    pub open: DateOutcome,
    pub close: DateOutcome,
    pub last_seen: DateOutcome,
    /// Days until close relative to the normalization date. Negative means
    /// already closed; `None` means the close date did not resolve.
    pub days_to_close: Option<i64>,
}

/// A single grant or tender listing. Every field is defaulted so a sparse
/// source record deserializes without error; keys the catalog does not
/// recognize ride along in `extra` untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Opportunity {
    pub id: Option<String>,
    pub source: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<ListingType>,
    pub url: Option<String>,
    pub title: String,
    pub description: String,
    pub agency: Option<String>,
    pub jurisdiction: Option<String>,
    pub lga: Option<String>,
    pub audience: BTreeSet<String>,
    pub discipline: BTreeSet<String>,
    pub open_date: Option<String>,
    pub close_date: Option<String>,
    pub status: Option<String>,
    pub amount_min: Option<f64>,
    pub amount_max: Option<f64>,
    pub last_seen: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, JsonValue>,
    #[serde(skip)]
    pub temporal: Temporal,
}

impl Opportunity {
    /// Recompute the derived temporal attributes against `today`.
    pub fn normalize(&mut self, today: NaiveDate) {
        let close = resolve_date_field(self.close_date.as_deref());
        self.temporal = Temporal {
            open: resolve_date_field(self.open_date.as_deref()),
            close,
            last_seen: resolve_date_field(self.last_seen.as_deref()),
            days_to_close: close.resolved().map(|d| (d - today).num_days()),
        };
    }

    pub fn normalized(mut self, today: NaiveDate) -> Self {
        self.normalize(today);
        self
    }

    /// Title + description, the text the classifier and search run over.
    pub fn combined_text(&self) -> String {
        format!("{} {}", self.title.trim(), self.description.trim())
    }

    /// Title + description + agency, used for locality mention checks.
    pub fn scope_text(&self) -> String {
        format!(
            "{} {} {}",
            self.title,
            self.description,
            self.agency.as_deref().unwrap_or_default()
        )
    }
}

/// Resolve a raw date string: strict ISO date, then the same with slashes
/// swapped for dashes, then ISO date-time flavors truncated to the date.
pub fn resolve_date(raw: &str) -> DateOutcome {
    let s = raw.trim();
    if s.is_empty() {
        return DateOutcome::Unresolved;
    }
    if let Ok(d) = NaiveDate::parse_from_str(s, DATE_FORMAT) {
        return DateOutcome::Resolved(d);
    }
    let dashed = s.replace('/', "-");
    if let Ok(d) = NaiveDate::parse_from_str(&dashed, DATE_FORMAT) {
        return DateOutcome::Resolved(d);
    }
    // last_seen may carry a date-time stamp
    let stamp = dashed.trim_end_matches('Z');
    for fmt in [
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %H:%M",
    ] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(stamp, fmt) {
            return DateOutcome::Resolved(dt.date());
        }
    }
    DateOutcome::Unresolved
}

pub fn resolve_date_field(raw: Option<&str>) -> DateOutcome {
    raw.map(resolve_date).unwrap_or_default()
}

/// Scan free text for a close-date mention: a "close(s/d)"/"deadline" marker
/// followed within a few punctuation characters by a date-like token run,
/// parsed day-before-month.
pub fn extract_close_date(text: &str) -> DateOutcome {
    let Ok(marker) = Regex::new(r"(?i)(close[sd]?|deadline)[^0-9A-Za-z]{0,10}([A-Za-z0-9 ,/\-:]+)")
    else {
        return DateOutcome::Unresolved;
    };
    let Some(caps) = marker.captures(text) else {
        return DateOutcome::Unresolved;
    };
    let candidate = caps.get(2).map(|m| m.as_str()).unwrap_or_default();
    parse_dayfirst(candidate)
        .map(DateOutcome::Resolved)
        .unwrap_or_default()
}

// Day-first formats tried against every token window of the candidate run.
// `%d/%m/%Y` sits ahead of any month-first shape so 03/04 reads as 3 April.
const DAYFIRST_FORMATS: &[&str] = &[
    "%d %B %Y",
    "%d %b %Y",
    "%B %d %Y",
    "%b %d %Y",
    "%d/%m/%Y",
    "%d-%m-%Y",
    "%Y-%m-%d",
    "%Y/%m/%d",
];

/// Loose day-first parse of a token run extracted from prose. Tries longer
/// token windows first so "30 June 2025 at 5pm" and "on 30 June 2025" both
/// land on the date tokens.
fn parse_dayfirst(candidate: &str) -> Option<NaiveDate> {
    let tokens: Vec<String> = candidate
        .split_whitespace()
        .map(|t| t.trim_matches(|c: char| c == ',' || c == ':').to_string())
        .filter(|t| !t.is_empty())
        .collect();
    if tokens.is_empty() {
        return None;
    }
    let max_window = tokens.len().min(5);
    for width in (1..=max_window).rev() {
        for start in 0..=(tokens.len() - width) {
            let window = tokens[start..start + width].join(" ");
            for fmt in DAYFIRST_FORMATS {
                if let Ok(d) = NaiveDate::parse_from_str(&window, fmt) {
                    return Some(d);
                }
            }
        }
    }
    None
}

/// Radar-wide configuration: the locality of interest and the view defaults.
/// Loaded from YAML; every field falls back to the built-in default so a
/// partial file only overrides what it names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RadarConfig {
    pub council: String,
    pub lga: String,
    pub audience_defaults: Vec<String>,
    pub jurisdictions: Vec<String>,
    pub closing_window_days: i64,
    pub digest_limit: usize,
}

impl Default for RadarConfig {
    fn default() -> Self {
        Self {
            council: "Wyndham City Council".to_string(),
            lga: "Wyndham".to_string(),
            audience_defaults: vec![
                "community".to_string(),
                "business".to_string(),
                "nonprofit".to_string(),
            ],
            jurisdictions: vec!["VIC".to_string(), "Commonwealth".to_string()],
            closing_window_days: 14,
            digest_limit: 25,
        }
    }
}

impl RadarConfig {
    /// Load configuration from `path`. A missing file yields the defaults; a
    /// present but unparseable file is an error.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        serde_yaml::from_str(&text).with_context(|| format!("parsing {}", path.display()))
    }
}
