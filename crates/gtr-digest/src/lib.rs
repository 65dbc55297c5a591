//! Weekly digest derivation: scope the catalog to the configured
//! jurisdictions, take the two temporal views, cap each section, and render
//! a markdown brief for downstream delivery.

use chrono::NaiveDate;
use gtr_core::{Opportunity, RadarConfig};
use gtr_views::{closing_soon, recently_observed};
use serde::Serialize;

pub const CRATE_NAME: &str = "gtr-digest";

#[derive(Debug, Clone, Copy)]
pub struct DigestOptions {
    pub closing_window_days: i64,
    pub limit: usize,
    pub locality_only: bool,
}

impl DigestOptions {
    pub fn from_config(config: &RadarConfig) -> Self {
        Self {
            closing_window_days: config.closing_window_days,
            limit: config.digest_limit,
            locality_only: false,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Digest {
    pub council: String,
    pub generated_on: NaiveDate,
    pub closing_window_days: i64,
    pub new_this_week: Vec<Opportunity>,
    pub closing_soon: Vec<Opportunity>,
}

// Jurisdiction scope: configured jurisdictions pass (case-insensitively),
// and so does an uninferrable one. The locality flag swaps this for a
// locality-mention check instead.
fn in_scope(record: &Opportunity, config: &RadarConfig, locality_only: bool) -> bool {
    if locality_only {
        return record.lga.as_deref() == Some(config.lga.as_str())
            || record
                .scope_text()
                .to_lowercase()
                .contains(&config.lga.to_lowercase());
    }
    match record.jurisdiction.as_deref() {
        Some(jurisdiction) => config
            .jurisdictions
            .iter()
            .any(|j| j.eq_ignore_ascii_case(jurisdiction)),
        None => true,
    }
}

/// Derive the digest for `today` from an already-enriched catalog.
pub fn build_digest(
    records: &[Opportunity],
    config: &RadarConfig,
    options: &DigestOptions,
    today: NaiveDate,
) -> Digest {
    let scoped: Vec<Opportunity> = records
        .iter()
        .filter(|r| in_scope(r, config, options.locality_only))
        .cloned()
        .collect();

    let mut new_this_week = recently_observed(&scoped, today);
    new_this_week.truncate(options.limit);
    let mut closing = closing_soon(&scoped, options.closing_window_days, today);
    closing.truncate(options.limit);

    Digest {
        council: config.council.clone(),
        generated_on: today,
        closing_window_days: options.closing_window_days,
        new_this_week,
        closing_soon: closing,
    }
}

fn render_item(record: &Opportunity) -> String {
    let kind = record
        .kind
        .map(|k| k.as_str().to_string())
        .unwrap_or_else(|| "opportunity".to_string());
    let jurisdiction = record.jurisdiction.as_deref().unwrap_or("—");
    let close = record.close_date.as_deref().unwrap_or("?");
    let title = if record.title.is_empty() {
        "Untitled"
    } else {
        record.title.as_str()
    };
    match record.url.as_deref() {
        Some(url) => format!("- [{title}]({url}) — {kind}, {jurisdiction} — closes {close}"),
        None => format!("- {title} — {kind}, {jurisdiction} — closes {close}"),
    }
}

fn render_section(heading: &str, rows: &[Opportunity], empty_note: &str) -> String {
    if rows.is_empty() {
        return format!("## {heading}\n\n_{empty_note}_\n");
    }
    let items = rows.iter().map(render_item).collect::<Vec<_>>().join("\n");
    format!("## {heading}\n\n{items}\n")
}

/// Render the digest as a markdown brief.
pub fn render_markdown(digest: &Digest) -> String {
    format!(
        "# {} — Grants & Tenders Weekly Digest\n\n\
         Generated {}. Check details at the source link before applying; \
         dates and amounts may change.\n\n{}\n{}",
        digest.council,
        digest.generated_on.format("%Y-%m-%d"),
        render_section(
            "New this week",
            &digest.new_this_week,
            "No new items detected this week.",
        ),
        render_section(
            &format!("Closing in the next {} days", digest.closing_window_days),
            &digest.closing_soon,
            "No items closing in the selected window.",
        ),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, 20).expect("valid date")
    }

    fn iso(date: NaiveDate) -> String {
        date.format("%Y-%m-%d").to_string()
    }

    fn record(title: &str, jurisdiction: Option<&str>) -> Opportunity {
        Opportunity {
            title: title.to_string(),
            jurisdiction: jurisdiction.map(str::to_string),
            last_seen: Some(iso(today())),
            close_date: Some(iso(today() + chrono::Duration::days(3))),
            ..Default::default()
        }
    }

    #[test]
    fn scope_keeps_configured_and_unset_jurisdictions() {
        let config = RadarConfig::default();
        let rows = vec![
            record("vic", Some("VIC")),
            record("nsw", Some("NSW")),
            record("federal", Some("commonwealth")),
            record("unknown", None),
        ];
        let digest = build_digest(&rows, &config, &DigestOptions::from_config(&config), today());
        let titles: Vec<_> = digest.closing_soon.iter().map(|r| r.title.as_str()).collect();
        assert_eq!(titles, ["vic", "federal", "unknown"]);
    }

    #[test]
    fn locality_flag_swaps_the_scope_rule() {
        let config = RadarConfig::default();
        let mut local = record("local", Some("NSW"));
        local.lga = Some("Wyndham".to_string());
        let rows = vec![local, record("vic", Some("VIC"))];

        let options = DigestOptions {
            locality_only: true,
            ..DigestOptions::from_config(&config)
        };
        let digest = build_digest(&rows, &config, &options, today());
        let titles: Vec<_> = digest.closing_soon.iter().map(|r| r.title.as_str()).collect();
        assert_eq!(titles, ["local"]);
    }

    #[test]
    fn sections_are_capped_at_the_limit() {
        let config = RadarConfig::default();
        let rows: Vec<Opportunity> = (0..30).map(|i| record(&format!("r{i}"), None)).collect();
        let options = DigestOptions {
            limit: 5,
            ..DigestOptions::from_config(&config)
        };
        let digest = build_digest(&rows, &config, &options, today());
        assert_eq!(digest.new_this_week.len(), 5);
        assert_eq!(digest.closing_soon.len(), 5);
    }

    #[test]
    fn markdown_brief_lists_items_and_placeholders() {
        let config = RadarConfig::default();
        let mut r = record("Community Sports Grant", Some("VIC"));
        r.url = Some("https://business.vic.gov.au/grants/sports".to_string());
        r.last_seen = None;
        let digest = build_digest(&[r], &config, &DigestOptions::from_config(&config), today());

        let brief = render_markdown(&digest);
        assert!(brief.contains("# Wyndham City Council — Grants & Tenders Weekly Digest"));
        assert!(brief.contains("_No new items detected this week._"));
        assert!(brief.contains(
            "[Community Sports Grant](https://business.vic.gov.au/grants/sports)"
        ));
        assert!(brief.contains("## Closing in the next 14 days"));
    }
}
