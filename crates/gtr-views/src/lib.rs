//! Multi-criteria filtering and the two temporal views over a normalized
//! catalog. Every function here is a pure derivation: same records, same
//! criteria, same `today` — same output, in a defined order.

use std::collections::BTreeSet;

use chrono::NaiveDate;
use gtr_core::Opportunity;
use serde::{Deserialize, Serialize};

pub const CRATE_NAME: &str = "gtr-views";

/// Trailing window for the recently-observed view.
pub const RECENT_WINDOW_DAYS: i64 = 7;

/// A conjunctive filter request. Empty criteria impose no constraint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterCriteria {
    pub types: BTreeSet<String>,
    pub jurisdictions: BTreeSet<String>,
    pub audiences: BTreeSet<String>,
    pub disciplines: BTreeSet<String>,
    pub amount_min: Option<f64>,
    pub amount_max: Option<f64>,
    pub text_query: String,
    pub locality_only: bool,
}

impl FilterCriteria {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

fn intersects(requested: &BTreeSet<String>, present: &BTreeSet<String>) -> bool {
    requested.iter().any(|tag| present.contains(tag))
}

// Every whitespace term must appear in the title or in the description;
// terms may be satisfied by different fields.
fn text_query_matches(record: &Opportunity, query: &str) -> bool {
    let title = record.title.to_lowercase();
    let description = record.description.to_lowercase();
    query
        .split_whitespace()
        .map(str::to_lowercase)
        .all(|term| title.contains(&term) || description.contains(&term))
}

fn mentions_locality(record: &Opportunity, locality: &str) -> bool {
    record.lga.as_deref() == Some(locality)
        || record
            .scope_text()
            .to_lowercase()
            .contains(&locality.to_lowercase())
}

fn matches(record: &Opportunity, criteria: &FilterCriteria, locality: &str) -> bool {
    if !criteria.types.is_empty() {
        let kind = record.kind.map(|k| k.as_str().to_string()).unwrap_or_default();
        if !criteria.types.contains(&kind) {
            return false;
        }
    }

    // a record whose jurisdiction could not be inferred always passes
    if !criteria.jurisdictions.is_empty() {
        if let Some(jurisdiction) = &record.jurisdiction {
            if !criteria.jurisdictions.contains(jurisdiction) {
                return false;
            }
        }
    }

    if !criteria.audiences.is_empty() && !intersects(&criteria.audiences, &record.audience) {
        return false;
    }
    if !criteria.disciplines.is_empty() && !intersects(&criteria.disciplines, &record.discipline) {
        return false;
    }

    // amount range: only a known bound can exclude; missing financials get
    // the benefit of the doubt
    if let (Some(wanted_min), Some(known_max)) = (criteria.amount_min, record.amount_max) {
        if known_max < wanted_min {
            return false;
        }
    }
    if let (Some(wanted_max), Some(known_min)) = (criteria.amount_max, record.amount_min) {
        if known_min > wanted_max {
            return false;
        }
    }

    if criteria.locality_only && !mentions_locality(record, locality) {
        return false;
    }

    if !criteria.text_query.trim().is_empty() && !text_query_matches(record, &criteria.text_query) {
        return false;
    }

    true
}

/// Return the records matching every supplied criterion, in input order.
pub fn apply_filters(
    records: &[Opportunity],
    criteria: &FilterCriteria,
    locality: &str,
) -> Vec<Opportunity> {
    records
        .iter()
        .filter(|r| matches(r, criteria, locality))
        .cloned()
        .collect()
}

/// Records whose last-seen stamp falls in the inclusive trailing window
/// `[today - 7, today]`, most recently seen first. An absent or unparseable
/// stamp excludes the record.
pub fn recently_observed(records: &[Opportunity], today: NaiveDate) -> Vec<Opportunity> {
    let mut seen: Vec<(NaiveDate, Opportunity)> = records
        .iter()
        .filter_map(|r| {
            let record = r.clone().normalized(today);
            let date = record.temporal.last_seen.resolved()?;
            let age = (today - date).num_days();
            (0..=RECENT_WINDOW_DAYS).contains(&age).then_some((date, record))
        })
        .collect();
    seen.sort_by_key(|(date, _)| std::cmp::Reverse(*date));
    seen.into_iter().map(|(_, record)| record).collect()
}

/// Records closing within `window_days` of `today`, soonest first.
/// Already-closed records and records without a resolvable close date are
/// excluded no matter the window.
pub fn closing_soon(
    records: &[Opportunity],
    window_days: i64,
    today: NaiveDate,
) -> Vec<Opportunity> {
    let mut closing: Vec<(i64, Opportunity)> = records
        .iter()
        .filter_map(|r| {
            let record = r.clone().normalized(today);
            let days = record.temporal.days_to_close?;
            (0..=window_days).contains(&days).then_some((days, record))
        })
        .collect();
    closing.sort_by_key(|(days, _)| *days);
    closing.into_iter().map(|(_, record)| record).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use gtr_core::ListingType;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, 20).expect("valid date")
    }

    fn iso(date: NaiveDate) -> String {
        date.format("%Y-%m-%d").to_string()
    }

    fn record(title: &str) -> Opportunity {
        Opportunity {
            title: title.to_string(),
            ..Default::default()
        }
    }

    fn tags(values: &[&str]) -> BTreeSet<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn empty_criteria_pass_everything_in_order() {
        let rows = vec![record("a"), record("b"), record("c")];
        let out = apply_filters(&rows, &FilterCriteria::default(), "Wyndham");
        let titles: Vec<_> = out.iter().map(|r| r.title.as_str()).collect();
        assert_eq!(titles, ["a", "b", "c"]);
    }

    #[test]
    fn type_filter_is_set_membership() {
        let mut grant = record("g");
        grant.kind = Some(ListingType::Grant);
        let mut tender = record("t");
        tender.kind = Some(ListingType::Tender);
        let untyped = record("u");

        let criteria = FilterCriteria {
            types: tags(&["grant"]),
            ..Default::default()
        };
        let out = apply_filters(&[grant, tender, untyped], &criteria, "Wyndham");
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].title, "g");
    }

    #[test]
    fn unset_jurisdiction_always_passes() {
        let mut vic = record("vic");
        vic.jurisdiction = Some("VIC".to_string());
        let mut nsw = record("nsw");
        nsw.jurisdiction = Some("NSW".to_string());
        let unknown = record("unknown");

        let criteria = FilterCriteria {
            jurisdictions: tags(&["VIC"]),
            ..Default::default()
        };
        let out = apply_filters(&[vic, nsw, unknown], &criteria, "Wyndham");
        let titles: Vec<_> = out.iter().map(|r| r.title.as_str()).collect();
        assert_eq!(titles, ["vic", "unknown"]);
    }

    #[test]
    fn tag_filters_need_a_non_empty_intersection() {
        let mut community = record("c");
        community.audience = tags(&["community", "nonprofit"]);
        let mut business = record("b");
        business.audience = tags(&["business"]);
        let untagged = record("u");

        let criteria = FilterCriteria {
            audiences: tags(&["community", "students"]),
            ..Default::default()
        };
        let out = apply_filters(&[community, business, untagged], &criteria, "Wyndham");
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].title, "c");
    }

    #[test]
    fn unknown_amounts_get_the_benefit_of_the_doubt() {
        let unknown = record("unknown");
        let mut small = record("small");
        small.amount_min = Some(1000.0);
        small.amount_max = Some(2000.0);
        let mut large = record("large");
        large.amount_min = Some(900_000.0);
        large.amount_max = Some(950_000.0);

        let criteria = FilterCriteria {
            amount_min: Some(5000.0),
            amount_max: Some(100_000.0),
            ..Default::default()
        };
        let out = apply_filters(&[unknown, small, large], &criteria, "Wyndham");
        let titles: Vec<_> = out.iter().map(|r| r.title.as_str()).collect();
        assert_eq!(titles, ["unknown"]);
    }

    #[test]
    fn single_known_bound_is_the_only_one_checked() {
        let mut min_only = record("min-only");
        min_only.amount_min = Some(200_000.0);

        let criteria = FilterCriteria {
            amount_max: Some(100_000.0),
            ..Default::default()
        };
        assert!(apply_filters(&[min_only.clone()], &criteria, "Wyndham").is_empty());

        // the known min sits inside the range; the unknown max cannot exclude
        let wide = FilterCriteria {
            amount_min: Some(500_000.0),
            ..Default::default()
        };
        assert_eq!(apply_filters(&[min_only], &wide, "Wyndham").len(), 1);
    }

    #[test]
    fn text_query_is_a_conjunction_of_terms() {
        let mut r = record("Health Innovation Grant");
        r.description = String::new();

        let hit = FilterCriteria {
            text_query: "health grant".to_string(),
            ..Default::default()
        };
        assert_eq!(apply_filters(&[r.clone()], &hit, "Wyndham").len(), 1);

        let miss = FilterCriteria {
            text_query: "health tender".to_string(),
            ..Default::default()
        };
        assert!(apply_filters(&[r], &miss, "Wyndham").is_empty());
    }

    #[test]
    fn text_query_terms_may_match_different_fields() {
        let mut r = record("Health Innovation Round");
        r.description = "Open to community groups".to_string();
        let criteria = FilterCriteria {
            text_query: "health community".to_string(),
            ..Default::default()
        };
        assert_eq!(apply_filters(&[r], &criteria, "Wyndham").len(), 1);
    }

    #[test]
    fn locality_flag_accepts_lga_or_text_mention() {
        let mut tagged = record("tagged");
        tagged.lga = Some("Wyndham".to_string());
        let mut mentioned = record("Support for Wyndham clubs");
        mentioned.agency = Some("Wyndham City Council".to_string());
        let elsewhere = record("Statewide program");

        let criteria = FilterCriteria {
            locality_only: true,
            ..Default::default()
        };
        let out = apply_filters(&[tagged, mentioned, elsewhere], &criteria, "Wyndham");
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn recently_observed_honors_the_window_boundary() {
        let mk = |title: &str, days_ago: i64| {
            let mut r = record(title);
            r.last_seen = Some(iso(today() - chrono::Duration::days(days_ago)));
            r
        };
        let mut unstamped = record("unstamped");
        unstamped.last_seen = Some("last tuesday".to_string());

        let rows = vec![mk("today", 0), mk("week-old", 7), mk("too-old", 8), unstamped];
        let out = recently_observed(&rows, today());
        let titles: Vec<_> = out.iter().map(|r| r.title.as_str()).collect();
        assert_eq!(titles, ["today", "week-old"]);
    }

    #[test]
    fn recently_observed_sorts_newest_first_and_is_stable() {
        let mk = |title: &str, days_ago: i64| {
            let mut r = record(title);
            r.last_seen = Some(iso(today() - chrono::Duration::days(days_ago)));
            r
        };
        let rows = vec![mk("older", 3), mk("tie-a", 1), mk("newest", 0), mk("tie-b", 1)];
        let out = recently_observed(&rows, today());
        let titles: Vec<_> = out.iter().map(|r| r.title.as_str()).collect();
        assert_eq!(titles, ["newest", "tie-a", "tie-b", "older"]);
    }

    #[test]
    fn closing_soon_excludes_closed_and_unresolved() {
        let mk = |title: &str, in_days: i64| {
            let mut r = record(title);
            r.close_date = Some(iso(today() + chrono::Duration::days(in_days)));
            r
        };
        let undated = record("undated");

        let rows = vec![mk("later", 14), mk("tomorrow", 1), mk("closed", -1), mk("today", 0), undated];
        let out = closing_soon(&rows, 14, today());
        let titles: Vec<_> = out.iter().map(|r| r.title.as_str()).collect();
        assert_eq!(titles, ["today", "tomorrow", "later"]);
        assert_eq!(out[0].temporal.days_to_close, Some(0));
    }

    #[test]
    fn closing_soon_window_is_monotonic() {
        let mk = |title: &str, in_days: i64| {
            let mut r = record(title);
            r.close_date = Some(iso(today() + chrono::Duration::days(in_days)));
            r
        };
        let rows = vec![mk("d2", 2), mk("d5", 5)];
        let narrow = closing_soon(&rows, 2, today());
        assert_eq!(narrow.len(), 1);
        assert_eq!(narrow[0].title, "d2");
        let wide = closing_soon(&rows, 5, today());
        assert_eq!(wide.len(), 2);
        assert_eq!(wide[0].title, "d2");
    }

    #[test]
    fn views_recompute_days_against_the_supplied_today() {
        let mut r = record("fixed-close");
        r.close_date = Some("2025-06-30".to_string());
        // stale derived state from an earlier load must not leak through
        r.normalize(NaiveDate::from_ymd_opt(2025, 1, 1).expect("valid date"));
        let out = closing_soon(&[r], 14, today());
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].temporal.days_to_close, Some(10));
    }
}
