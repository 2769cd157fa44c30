//! Groups match results into per-outward-code chunks and per-substation
//! postcode lists.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use substation_map_boundary_models::SubstationBoundary;
use substation_map_postcode::outward_code;
use substation_map_spatial::MatchOutcome;

/// One postcode's entry in a chunk file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkEntry {
    pub substation_id: String,
    pub lat: f64,
    pub lng: f64,
}

/// Postcode to assignment, for a single outward code.
pub type Chunk = BTreeMap<String, ChunkEntry>;

/// Both derived views of a match outcome.
#[derive(Debug, Clone, Default)]
pub struct Lookup {
    /// Outward code to chunk.
    pub chunks: BTreeMap<String, Chunk>,
    /// Sorted, deduplicated postcodes per boundary, indexed by collection
    /// position. Boundaries without matches have an empty list.
    pub postcodes_by_boundary: Vec<Vec<String>>,
    /// Matched postcodes left out of the chunks because they have no
    /// recognizable outward code.
    pub anomalies: u64,
}

impl Lookup {
    /// Total postcodes across all chunks.
    #[must_use]
    pub fn chunked_postcodes(&self) -> usize {
        self.chunks.values().map(BTreeMap::len).sum()
    }
}

/// Builds the chunk and substation views in one pass over matched rows.
///
/// Unmatched postcodes contribute to neither view.
#[must_use]
pub fn build_lookup(boundaries: &[SubstationBoundary], outcome: &MatchOutcome) -> Lookup {
    let mut lookup = Lookup {
        postcodes_by_boundary: vec![Vec::new(); boundaries.len()],
        ..Lookup::default()
    };

    for m in &outcome.matches {
        let Some(position) = m.boundary else {
            continue;
        };
        let Some(boundary) = boundaries.get(position) else {
            log::warn!(
                "{}: match refers to unknown boundary #{position}",
                m.postcode.postcode
            );
            continue;
        };

        lookup.postcodes_by_boundary[position].push(m.postcode.postcode.clone());

        let Some(outward) = outward_code(&m.postcode.postcode) else {
            log::warn!(
                "'{}' has no recognizable outward code, left out of lookup",
                m.postcode.postcode
            );
            lookup.anomalies += 1;
            continue;
        };

        lookup.chunks.entry(outward.to_string()).or_default().insert(
            m.postcode.postcode.clone(),
            ChunkEntry {
                substation_id: boundary.substation_id.clone(),
                lat: m.postcode.lat,
                lng: m.postcode.lng,
            },
        );
    }

    for postcodes in &mut lookup.postcodes_by_boundary {
        postcodes.sort_unstable();
        postcodes.dedup();
    }

    log::info!(
        "Created lookup for {} postcode areas ({} postcodes, {} anomalies)",
        lookup.chunks.len(),
        lookup.chunked_postcodes(),
        lookup.anomalies
    );

    lookup
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{MultiPolygon, polygon};
    use substation_map_postcode::PostcodeRecord;
    use substation_map_spatial::PostcodeMatch;

    fn boundary(id: &str) -> SubstationBoundary {
        SubstationBoundary {
            substation_id: id.to_string(),
            substation_name: id.to_string(),
            dno_id: "UKPN".to_string(),
            dno_name: "UK Power Networks".to_string(),
            license_area: "LPN".to_string(),
            geometry: MultiPolygon(vec![polygon![
                (x: 0.0, y: 0.0),
                (x: 1.0, y: 0.0),
                (x: 1.0, y: 1.0),
                (x: 0.0, y: 0.0),
            ]]),
        }
    }

    fn matched(code: &str, boundary: Option<usize>) -> PostcodeMatch {
        PostcodeMatch {
            postcode: PostcodeRecord {
                postcode: code.to_string(),
                lat: 51.5,
                lng: -0.1,
            },
            boundary,
        }
    }

    fn outcome(matches: Vec<PostcodeMatch>) -> MatchOutcome {
        let matched = matches.iter().filter(|m| m.boundary.is_some()).count() as u64;
        let unmatched = matches.len() as u64 - matched;
        MatchOutcome {
            matches,
            matched,
            unmatched,
        }
    }

    #[test]
    fn groups_by_outward_code() {
        let boundaries = vec![boundary("S1"), boundary("S2")];
        let lookup = build_lookup(
            &boundaries,
            &outcome(vec![
                matched("N15 5QA", Some(0)),
                matched("N15 5QB", Some(1)),
                matched("SW1A 1AA", Some(1)),
            ]),
        );

        assert_eq!(lookup.chunks.len(), 2);
        assert_eq!(lookup.chunks["N15"]["N15 5QA"].substation_id, "S1");
        assert_eq!(lookup.chunks["N15"]["N15 5QB"].substation_id, "S2");
        assert!(lookup.chunks["SW1A"].contains_key("SW1A 1AA"));
        assert!(!lookup.chunks["N15"].contains_key("N155QA"));
    }

    #[test]
    fn unmatched_postcodes_appear_nowhere() {
        let boundaries = vec![boundary("S1")];
        let lookup = build_lookup(
            &boundaries,
            &outcome(vec![matched("N15 5QA", Some(0)), matched("ZE1 0AA", None)]),
        );

        assert!(!lookup.chunks.contains_key("ZE1"));
        assert_eq!(lookup.postcodes_by_boundary, vec![vec!["N15 5QA".to_string()]]);
    }

    #[test]
    fn substation_lists_are_sorted_unique_and_complete() {
        let boundaries = vec![boundary("S1"), boundary("EMPTY")];
        let lookup = build_lookup(
            &boundaries,
            &outcome(vec![
                matched("N15 5QB", Some(0)),
                matched("N15 5QA", Some(0)),
                matched("N15 5QB", Some(0)),
            ]),
        );

        assert_eq!(lookup.postcodes_by_boundary.len(), 2);
        assert_eq!(lookup.postcodes_by_boundary[0], vec!["N15 5QA", "N15 5QB"]);
        assert!(lookup.postcodes_by_boundary[1].is_empty());
    }

    #[test]
    fn unparseable_outward_code_is_an_anomaly() {
        let boundaries = vec![boundary("S1")];
        let lookup = build_lookup(
            &boundaries,
            &outcome(vec![matched("123 ABC", Some(0)), matched("N15 5QA", Some(0))]),
        );

        assert_eq!(lookup.anomalies, 1);
        assert_eq!(lookup.chunked_postcodes(), 1);
        assert_eq!(lookup.postcodes_by_boundary[0].len(), 2);
    }
}
