//! Filter-change fingerprint: `sha256(canonical_json).hex[:16]`.
//!
//! Canonical form sorts both object keys (free, since `serde_json::Value`'s
//! map keeps a `BTreeMap` unless the `preserve_order` feature is enabled,
//! which this crate does not turn on) and every list constraint's elements,
//! so semantically equal specs hash identically regardless of YAML
//! authoring order.

use sha2::{Digest, Sha256};

use crate::config::FiltersConfig;

fn sorted(mut values: Vec<String>) -> Vec<String> {
    values.sort();
    values
}

fn canonical_value(filters: &FiltersConfig) -> serde_json::Value {
    let exclude = serde_json::json!({
        "genres": sorted(filters.exclude.genres.clone()),
        "types": sorted(filters.exclude.types.clone()),
        "languages": sorted(filters.exclude.languages.clone()),
        "countries": sorted(filters.exclude.countries.clone()),
        "networks": sorted(filters.exclude.networks.clone()),
    });

    let selections: Vec<serde_json::Value> = filters
        .selections
        .iter()
        .map(|s| {
            serde_json::json!({
                "languages": sorted(s.languages.clone()),
                "countries": sorted(s.countries.clone()),
                "genres": sorted(s.genres.clone()),
                "types": sorted(s.types.clone()),
                "networks": sorted(s.networks.clone()),
                "status": sorted(s.status.clone()),
                "premiered_after": s.premiered_after,
                "premiered_before": s.premiered_before,
                "ended_after": s.ended_after,
                "ended_before": s.ended_before,
                "min_rating": s.min_rating,
                "max_rating": s.max_rating,
                "min_runtime": s.min_runtime,
                "max_runtime": s.max_runtime,
            })
        })
        .collect();

    serde_json::json!({
        "exclude": exclude,
        "selections": selections,
    })
}

/// Computes the 16-hex-character filter fingerprint used to detect changes
/// between runs (`state.last_filter_hash`).
pub fn filter_hash(filters: &FiltersConfig) -> String {
    let canonical = canonical_value(filters);
    let serialized = serde_json::to_vec(&canonical).expect("filter spec serializes");
    let digest = Sha256::digest(&serialized);
    hex_prefix(&digest, 16)
}

fn hex_prefix(bytes: &[u8], chars: usize) -> String {
    let mut out = String::with_capacity(chars);
    for byte in bytes {
        if out.len() >= chars {
            break;
        }
        out.push_str(&format!("{byte:02x}"));
    }
    out.truncate(chars);
    out
}
