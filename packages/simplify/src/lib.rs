#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Boundary geometry simplification for the served artifact.
//!
//! Geometries are reduced with a tolerance in degrees and their
//! coordinates rounded to a fixed number of decimals. The details artifact
//! is rendered at the first level of an escalation ladder that brings it
//! under a size ceiling.

pub mod geometry;

use thiserror::Error;

pub use geometry::{
    geojson_vertex_count, simplify_geojson, simplify_multipolygon, try_simplify_geojson,
};

/// Artifacts larger than this are too slow for the browser to fetch and
/// parse.
pub const SIZE_CEILING_BYTES: u64 = 25 * 1024 * 1024;

/// A simplification tolerance (degrees) paired with a coordinate
/// precision (decimal places).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimplifyLevel {
    pub name: &'static str,
    pub tolerance: f64,
    pub precision: i32,
}

/// Stage 1: roughly 100 m tolerance, about 10 m precision.
pub const MINIMAL: SimplifyLevel = SimplifyLevel {
    name: "minimal",
    tolerance: 0.001,
    precision: 4,
};

/// Stage 2: roughly 300 m tolerance, about 100 m precision.
pub const AGGRESSIVE: SimplifyLevel = SimplifyLevel {
    name: "aggressive",
    tolerance: 0.003,
    precision: 3,
};

/// Levels tried in order until the artifact fits under the ceiling.
pub const ESCALATION_LADDER: &[SimplifyLevel] = &[MINIMAL, AGGRESSIVE];

/// Errors that can occur during simplification.
#[derive(Debug, Error)]
pub enum SimplifyError {
    /// Only Polygon and `MultiPolygon` geometries are simplified.
    #[error("Cannot simplify a {kind}")]
    UnsupportedGeometry {
        /// Geometry type that was encountered.
        kind: &'static str,
    },

    /// The `GeoJSON` geometry could not be converted.
    #[error("Geometry conversion failed: {0}")]
    Conversion(#[from] geojson::Error),

    /// Neither algorithm produced a valid polygon.
    #[error("No valid simplified geometry")]
    NoValidResult,

    /// The escalation ladder has no levels.
    #[error("Escalation ladder is empty")]
    EmptyLadder,
}

/// Size of the artifact rendered at one level.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Attempt {
    pub level: SimplifyLevel,
    pub size: u64,
}

/// Outcome of walking the escalation ladder.
#[derive(Debug, Clone)]
pub struct Escalation {
    /// Level the returned bytes were rendered at.
    pub level: SimplifyLevel,
    pub bytes: Vec<u8>,
    /// Even the last level could not get under the ceiling.
    pub over_ceiling: bool,
    /// Every level rendered, in ladder order.
    pub attempts: Vec<Attempt>,
}

/// Renders the artifact at each ladder level in turn, stopping at the
/// first one whose output is at most `ceiling` bytes.
///
/// Levels after the first fitting one are never rendered. If no level
/// fits, the last level's output is returned with `over_ceiling` set.
///
/// # Errors
///
/// Returns [`SimplifyError::EmptyLadder`] (converted into `E`) for an
/// empty ladder, or whatever error `render` returns.
pub fn escalate<E, F>(
    ladder: &[SimplifyLevel],
    ceiling: u64,
    mut render: F,
) -> Result<Escalation, E>
where
    E: From<SimplifyError>,
    F: FnMut(&SimplifyLevel) -> Result<Vec<u8>, E>,
{
    let mut attempts = Vec::with_capacity(ladder.len());
    let mut last = None;

    for level in ladder {
        let bytes = render(level)?;
        let size = bytes.len() as u64;
        attempts.push(Attempt {
            level: *level,
            size,
        });

        log::info!(
            "Rendered at '{}' (tolerance {}, {} decimals): {:.2} MB",
            level.name,
            level.tolerance,
            level.precision,
            megabytes(size)
        );

        if size <= ceiling {
            return Ok(Escalation {
                level: *level,
                bytes,
                over_ceiling: false,
                attempts,
            });
        }

        log::warn!(
            "'{}' output is {:.2} MB, over the {:.2} MB ceiling",
            level.name,
            megabytes(size),
            megabytes(ceiling)
        );
        last = Some((*level, bytes));
    }

    let (level, bytes) = last.ok_or(SimplifyError::EmptyLadder)?;
    Ok(Escalation {
        level,
        bytes,
        over_ceiling: true,
        attempts,
    })
}

/// Bytes to mebibytes for log output.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn megabytes(bytes: u64) -> f64 {
    bytes as f64 / (1024.0 * 1024.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sized<'a>(
        sizes: &'a [(&'static str, usize)],
    ) -> impl FnMut(&SimplifyLevel) -> Result<Vec<u8>, SimplifyError> + 'a {
        move |level| {
            let size = sizes
                .iter()
                .find(|(name, _)| *name == level.name)
                .map_or(0, |(_, size)| *size);
            Ok(vec![b'x'; size])
        }
    }

    #[test]
    fn stage_one_under_ceiling_does_not_escalate() {
        let mut rendered = Vec::new();
        let result: Escalation = escalate(ESCALATION_LADDER, 100, |level| {
            rendered.push(level.name);
            Ok::<_, SimplifyError>(vec![0u8; 60])
        })
        .unwrap();

        assert_eq!(rendered, vec!["minimal"]);
        assert_eq!(result.level, MINIMAL);
        assert!(!result.over_ceiling);
        assert_eq!(result.attempts.len(), 1);
    }

    #[test]
    fn stage_one_over_ceiling_escalates_to_aggressive() {
        let result =
            escalate(ESCALATION_LADDER, 100, sized(&[("minimal", 150), ("aggressive", 80)]))
                .unwrap();

        assert_eq!(result.level, AGGRESSIVE);
        assert_eq!(result.bytes.len(), 80);
        assert!(!result.over_ceiling);
        assert_eq!(
            result.attempts,
            vec![
                Attempt {
                    level: MINIMAL,
                    size: 150
                },
                Attempt {
                    level: AGGRESSIVE,
                    size: 80
                },
            ]
        );
    }

    #[test]
    fn every_level_over_ceiling_keeps_last_and_flags_it() {
        let result =
            escalate(ESCALATION_LADDER, 100, sized(&[("minimal", 300), ("aggressive", 200)]))
                .unwrap();

        assert_eq!(result.level, AGGRESSIVE);
        assert_eq!(result.bytes.len(), 200);
        assert!(result.over_ceiling);
    }

    #[test]
    fn exactly_at_ceiling_fits() {
        let result = escalate(ESCALATION_LADDER, 100, sized(&[("minimal", 100)])).unwrap();
        assert_eq!(result.level, MINIMAL);
        assert!(!result.over_ceiling);
    }

    #[test]
    fn empty_ladder_is_an_error() {
        let result = escalate(&[], 100, sized(&[]));
        assert!(matches!(result, Err(SimplifyError::EmptyLadder)));
    }

    #[test]
    fn render_errors_propagate() {
        let result: Result<Escalation, SimplifyError> =
            escalate(ESCALATION_LADDER, 100, |_| Err(SimplifyError::NoValidResult));
        assert!(matches!(result, Err(SimplifyError::NoValidResult)));
    }

    #[test]
    fn ladder_gets_coarser() {
        for pair in ESCALATION_LADDER.windows(2) {
            assert!(pair[1].tolerance > pair[0].tolerance);
            assert!(pair[1].precision < pair[0].precision);
        }
        assert!(SIZE_CEILING_BYTES == 25 * 1024 * 1024);
    }
}
