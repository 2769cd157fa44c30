#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! In-memory spatial index for postcode-to-substation attribution.
//!
//! Bulk-loads an R-tree over the bounding boxes of the unified boundary
//! collection, then answers point-in-polygon queries for every postcode
//! centroid. This is a left join: every postcode comes out the other
//! side, matched or not.

use std::sync::Arc;

use geo::{Intersects, MultiPolygon};
use rstar::{AABB, RTree, RTreeObject};
use substation_map_boundary_models::SubstationBoundary;
use substation_map_postcode::PostcodeRecord;
use substation_map_progress::ProgressCallback;

/// How many postcodes to match between progress updates.
const PROGRESS_STEP: usize = 10_000;

/// Bounding box of one boundary plus its position in the collection.
struct BoundaryEntry {
    position: usize,
    envelope: AABB<[f64; 2]>,
}

impl RTreeObject for BoundaryEntry {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.envelope
    }
}

/// R-tree over a borrowed boundary collection.
pub struct SubstationIndex<'a> {
    boundaries: &'a [SubstationBoundary],
    tree: RTree<BoundaryEntry>,
}

impl<'a> SubstationIndex<'a> {
    /// Builds the index. Boundaries without a bounding box (empty
    /// geometries) are left out and can never match.
    #[must_use]
    pub fn build(boundaries: &'a [SubstationBoundary]) -> Self {
        let entries: Vec<BoundaryEntry> = boundaries
            .iter()
            .enumerate()
            .filter_map(|(position, boundary)| {
                compute_envelope(&boundary.geometry).map(|envelope| BoundaryEntry {
                    position,
                    envelope,
                })
            })
            .collect();

        if entries.len() < boundaries.len() {
            log::warn!(
                "{} boundaries have empty geometry and were not indexed",
                boundaries.len() - entries.len()
            );
        }

        Self {
            boundaries,
            tree: RTree::bulk_load(entries),
        }
    }

    /// Number of indexed boundaries.
    #[must_use]
    pub fn size(&self) -> usize {
        self.tree.size()
    }

    /// Finds the boundary containing a point (interior or edge).
    ///
    /// When several boundaries contain the point (a shared edge, or
    /// overlapping DNO data) the one that comes first in the collection
    /// wins, whatever order the R-tree yields candidates in.
    #[must_use]
    pub fn lookup(&self, lng: f64, lat: f64) -> Option<usize> {
        let point = geo::Point::new(lng, lat);
        let query_env = AABB::from_point([lng, lat]);

        self.tree
            .locate_in_envelope_intersecting(&query_env)
            .filter(|entry| self.boundaries[entry.position].geometry.intersects(&point))
            .map(|entry| entry.position)
            .min()
    }
}

/// A postcode and the position of the boundary it fell in, if any.
#[derive(Debug, Clone)]
pub struct PostcodeMatch {
    pub postcode: PostcodeRecord,
    /// Index into the boundary collection the match was computed against.
    pub boundary: Option<usize>,
}

/// Result of matching every postcode against the boundary collection.
#[derive(Debug, Clone)]
pub struct MatchOutcome {
    /// One entry per input postcode, in input order.
    pub matches: Vec<PostcodeMatch>,
    pub matched: u64,
    pub unmatched: u64,
}

/// Matches each postcode to at most one boundary.
///
/// Every input postcode appears in the outcome; those outside all
/// boundaries carry `boundary: None`.
#[must_use]
pub fn match_postcodes(
    boundaries: &[SubstationBoundary],
    postcodes: Vec<PostcodeRecord>,
    progress: &Arc<dyn ProgressCallback>,
) -> MatchOutcome {
    let index = SubstationIndex::build(boundaries);
    log::info!(
        "Matching {} postcodes against {} indexed substations",
        postcodes.len(),
        index.size()
    );

    progress.set_total(postcodes.len() as u64);

    let mut matches = Vec::with_capacity(postcodes.len());
    let mut matched = 0u64;
    let mut unmatched = 0u64;

    for (i, postcode) in postcodes.into_iter().enumerate() {
        let boundary = index.lookup(postcode.lng, postcode.lat);
        if boundary.is_some() {
            matched += 1;
        } else {
            unmatched += 1;
        }
        matches.push(PostcodeMatch { postcode, boundary });

        if (i + 1) % PROGRESS_STEP == 0 {
            progress.inc(PROGRESS_STEP as u64);
        }
    }

    progress.set_position(matches.len() as u64);
    progress.finish(format!("Matched {matched} postcodes"));

    log::info!("Matched: {matched} postcodes");
    log::info!("Unmatched: {unmatched} postcodes (boundary gaps, offshore or data holes)");

    MatchOutcome {
        matches,
        matched,
        unmatched,
    }
}

/// Compute the bounding box envelope for a [`MultiPolygon`].
fn compute_envelope(mp: &MultiPolygon<f64>) -> Option<AABB<[f64; 2]>> {
    use geo::BoundingRect;

    mp.bounding_rect()
        .map(|rect| AABB::from_corners([rect.min().x, rect.min().y], [rect.max().x, rect.max().y]))
}
