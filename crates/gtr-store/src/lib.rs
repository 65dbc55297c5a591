//! Flat-file catalog persistence for GTR: JSON array or JSONL, plus the
//! starter seed listings.

use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use gtr_core::{ListingType, Opportunity, RadarConfig, DATE_FORMAT};
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

pub const CRATE_NAME: &str = "gtr-store";

/// Conventional catalog locations probed when no explicit path is given.
pub const CATALOG_CANDIDATES: &[&str] = &[
    "grants.json",
    "data/grants.json",
    "grants.jsonl",
    "data/grants.jsonl",
];

/// A catalog load/save failure. Container-level only: one bad record shape
/// or an unreadable file fails the whole batch, while per-field garbage
/// (e.g. an unparseable close date) survives into the loaded record.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("reading {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("writing {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("parsing {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("parsing {} line {line}: {source}", path.display())]
    ParseLine {
        path: PathBuf,
        line: usize,
        #[source]
        source: serde_json::Error,
    },
}

fn is_jsonl(path: &Path) -> bool {
    path.extension().map(|e| e == "jsonl").unwrap_or(false)
}

/// Return the first conventional catalog path that exists, preferring an
/// explicitly supplied one.
pub fn find_catalog(preferred: Option<&Path>) -> Option<PathBuf> {
    preferred
        .map(Path::to_path_buf)
        .into_iter()
        .chain(CATALOG_CANDIDATES.iter().map(PathBuf::from))
        .find(|p| p.exists())
}

/// Load a catalog file and normalize every record against `today`.
pub fn load_catalog(path: &Path, today: NaiveDate) -> Result<Vec<Opportunity>, CatalogError> {
    let text = std::fs::read_to_string(path).map_err(|source| CatalogError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    let mut records: Vec<Opportunity> = if is_jsonl(path) {
        let mut rows = Vec::new();
        for (idx, line) in text.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let row = serde_json::from_str(line).map_err(|source| CatalogError::ParseLine {
                path: path.to_path_buf(),
                line: idx + 1,
                source,
            })?;
            rows.push(row);
        }
        rows
    } else {
        serde_json::from_str(&text).map_err(|source| CatalogError::Parse {
            path: path.to_path_buf(),
            source,
        })?
    };

    for record in &mut records {
        record.normalize(today);
    }
    info!(records = records.len(), path = %path.display(), "catalog loaded");
    Ok(records)
}

/// Write the catalog back in the format the extension implies, via a sibling
/// temp file and atomic rename.
pub fn save_catalog(path: &Path, records: &[Opportunity]) -> Result<(), CatalogError> {
    let body = if is_jsonl(path) {
        let mut lines = records
            .iter()
            .map(serde_json::to_string)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|source| CatalogError::Parse {
                path: path.to_path_buf(),
                source,
            })?
            .join("\n");
        lines.push('\n');
        lines
    } else {
        serde_json::to_string_pretty(records).map_err(|source| CatalogError::Parse {
            path: path.to_path_buf(),
            source,
        })?
    };

    let parent = path.parent().filter(|p| !p.as_os_str().is_empty());
    let temp_path = parent
        .unwrap_or_else(|| Path::new("."))
        .join(format!(".{}.tmp", Uuid::new_v4()));
    let write_err = |source| CatalogError::Write {
        path: path.to_path_buf(),
        source,
    };
    std::fs::write(&temp_path, body).map_err(write_err)?;
    std::fs::rename(&temp_path, path).map_err(|source| {
        let _ = std::fs::remove_file(&temp_path);
        write_err(source)
    })?;
    info!(records = records.len(), path = %path.display(), "catalog saved");
    Ok(())
}

struct StarterListing {
    title: &'static str,
    url: &'static str,
}

// The handful of always-worth-watching listing pages used to bootstrap an
// empty catalog.
const STARTER_LISTINGS: &[StarterListing] = &[
    StarterListing {
        title: "Wyndham Community Grants",
        url: "https://www.wyndham.vic.gov.au/residents/community-support/grants",
    },
    StarterListing {
        title: "Business Victoria – Grants and Programs",
        url: "https://business.vic.gov.au/grants-and-programs",
    },
    StarterListing {
        title: "GrantConnect – Current Grant Opportunities",
        url: "https://www.grants.gov.au/go/list",
    },
    StarterListing {
        title: "Business.gov.au – Grants and Programs",
        url: "https://business.gov.au/grants-and-programs",
    },
];

fn quick_jurisdiction(url: &str) -> Option<String> {
    if url.contains(".vic.gov.au") {
        Some("VIC".to_string())
    } else if url.contains("grants.gov.au") || url.contains("business.gov.au") {
        Some("Commonwealth".to_string())
    } else {
        None
    }
}

/// Render the starter listings into full records. Ids are deterministic
/// (UUIDv5 over the listing URL) so repeated seeding cannot mint duplicates.
pub fn seed_records(config: &RadarConfig, today: NaiveDate) -> Vec<Opportunity> {
    STARTER_LISTINGS
        .iter()
        .map(|listing| {
            let council_page = listing.url.contains("wyndham.vic.gov.au");
            let audience = if council_page { "community" } else { "business" };
            Opportunity {
                id: Some(format!(
                    "seed-{}",
                    Uuid::new_v5(&Uuid::NAMESPACE_URL, listing.url.as_bytes())
                )),
                source: Some("seed".to_string()),
                kind: Some(ListingType::Grant),
                url: Some(listing.url.to_string()),
                title: listing.title.to_string(),
                jurisdiction: quick_jurisdiction(listing.url),
                lga: council_page.then(|| config.lga.clone()),
                audience: [audience.to_string()].into(),
                status: Some("open".to_string()),
                last_seen: Some(today.format(DATE_FORMAT).to_string()),
                ..Default::default()
            }
            .normalized(today)
        })
        .collect()
}

/// Append the incoming records whose id is not already present. Identity is
/// the only dedup key; existing records are never replaced.
pub fn merge_by_id(catalog: &mut Vec<Opportunity>, incoming: Vec<Opportunity>) -> usize {
    let mut known: std::collections::BTreeSet<String> =
        catalog.iter().filter_map(|r| r.id.clone()).collect();
    let mut added = 0;
    for record in incoming {
        let duplicate = record
            .id
            .as_ref()
            .map(|id| known.contains(id))
            .unwrap_or(false);
        if !duplicate {
            if let Some(id) = &record.id {
                known.insert(id.clone());
            }
            catalog.push(record);
            added += 1;
        }
    }
    added
}
