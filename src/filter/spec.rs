//! Matching rules for the exclude-then-selections filter model: a show is
//! filtered if it hits any global exclude; otherwise it is accepted if it
//! satisfies any configured selection (OR over selections, AND within one).

use crate::cache::Show;
use crate::config::{FiltersConfig, SelectionConfig};

/// The global exclude set a show is checked against before selections are
/// considered at all.
pub fn matches_any_exclude(filters: &FiltersConfig, show: &Show) -> bool {
    let exclude = &filters.exclude;

    if intersects(&exclude.genres, &show.genres) {
        return true;
    }
    if membership(&exclude.types, show.show_type.as_deref()) {
        return true;
    }
    if membership(&exclude.languages, show.language.as_deref()) {
        return true;
    }
    if membership(&exclude.countries, show.country.as_deref()) {
        return true;
    }
    if membership(&exclude.networks, effective_network(show)) {
        return true;
    }

    false
}

/// Finds the first selection this show satisfies, if any.
pub fn matching_selection<'a>(
    filters: &'a FiltersConfig,
    show: &Show,
) -> Option<&'a SelectionConfig> {
    filters.selections.iter().find(|s| selection_matches(s, show))
}

fn effective_network(show: &Show) -> Option<&str> {
    show.network.as_deref().or(show.web_channel.as_deref())
}

/// An empty constraint is vacuously true; membership requires the field be
/// present and contained in the list (case-sensitive, matching the literal
/// strings the upstream catalog and configuration both use).
fn membership(constraint: &[String], field: Option<&str>) -> bool {
    if constraint.is_empty() {
        return false;
    }
    match field {
        Some(value) => constraint.iter().any(|c| c == value),
        None => false,
    }
}

fn intersects(constraint: &[String], values: &[String]) -> bool {
    if constraint.is_empty() {
        return false;
    }
    constraint.iter().any(|c| values.iter().any(|v| v == c))
}

fn selection_matches(selection: &SelectionConfig, show: &Show) -> bool {
    if !vacuous_or_member(&selection.languages, show.language.as_deref()) {
        return false;
    }
    if !vacuous_or_member(&selection.countries, show.country.as_deref()) {
        return false;
    }
    if !vacuous_or_intersects(&selection.genres, &show.genres) {
        return false;
    }
    if !vacuous_or_member(&selection.types, show.show_type.as_deref()) {
        return false;
    }
    if !vacuous_or_member(&selection.networks, effective_network(show)) {
        return false;
    }
    if !vacuous_or_member(&selection.status, show.status.as_deref()) {
        return false;
    }
    if !date_range_ok(
        show.premiered,
        selection.premiered_after.as_deref(),
        selection.premiered_before.as_deref(),
    ) {
        return false;
    }
    if !date_range_ok(
        show.ended,
        selection.ended_after.as_deref(),
        selection.ended_before.as_deref(),
    ) {
        return false;
    }
    if !numeric_range_ok(show.rating, selection.min_rating, selection.max_rating) {
        return false;
    }
    if !numeric_range_ok(
        show.runtime.map(|r| r as f64),
        selection.min_runtime.map(|r| r as f64),
        selection.max_runtime.map(|r| r as f64),
    ) {
        return false;
    }

    true
}

fn vacuous_or_member(constraint: &[String], field: Option<&str>) -> bool {
    constraint.is_empty() || membership(constraint, field)
}

fn vacuous_or_intersects(constraint: &[String], values: &[String]) -> bool {
    constraint.is_empty() || intersects(constraint, values)
}

/// A present bound fails if the value is null; an absent bound is
/// vacuously satisfied; both bounds are inclusive.
fn date_range_ok(
    value: Option<chrono::NaiveDate>,
    after: Option<&str>,
    before: Option<&str>,
) -> bool {
    if after.is_none() && before.is_none() {
        return true;
    }
    let Some(value) = value else { return false };

    if let Some(after) = after {
        let Ok(bound) = chrono::NaiveDate::parse_from_str(after, "%Y-%m-%d") else {
            return false;
        };
        if value < bound {
            return false;
        }
    }
    if let Some(before) = before {
        let Ok(bound) = chrono::NaiveDate::parse_from_str(before, "%Y-%m-%d") else {
            return false;
        };
        if value > bound {
            return false;
        }
    }
    true
}

fn numeric_range_ok(value: Option<f64>, min: Option<f64>, max: Option<f64>) -> bool {
    if min.is_none() && max.is_none() {
        return true;
    }
    let Some(value) = value else { return false };

    if let Some(min) = min {
        if value < min {
            return false;
        }
    }
    if let Some(max) = max {
        if value > max {
            return false;
        }
    }
    true
}
