//! Standalone simplification of an existing details file.
//!
//! The unsimplified backup is the only input ever simplified from. If it
//! does not exist yet, the current details file is copied there first, so
//! running this repeatedly never compounds simplification.

use substation_map_simplify::{SimplifyLevel, escalate, geojson_vertex_count, megabytes};

use crate::GenerateError;
use crate::config::PipelineConfig;
use crate::details::{Details, read_details, render_details, simplify_details};
use crate::output::write_atomic;

/// Outcome of a post-pass run.
#[derive(Debug, Clone)]
pub struct PostPassReport {
    pub substations: usize,
    /// Size of the backup the pass derived from.
    pub original_bytes: u64,
    /// Size of the details file before the pass.
    pub before_bytes: u64,
    pub after_bytes: u64,
    pub original_vertices: usize,
    pub after_vertices: usize,
    pub level: SimplifyLevel,
    pub over_ceiling: bool,
    /// Whether this run created the backup.
    pub created_backup: bool,
}

impl PostPassReport {
    /// Size reduction relative to the original, in percent.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn reduction_percent(&self) -> f64 {
        if self.original_bytes == 0 {
            return 0.0;
        }
        (self.original_bytes as f64 - self.after_bytes as f64) / self.original_bytes as f64 * 100.0
    }

    pub fn log(&self, ceiling: u64) {
        log::info!("Simplified {} substation boundaries", self.substations);
        log::info!("Original size: {:.2} MB", megabytes(self.original_bytes));
        log::info!("Previous size: {:.2} MB", megabytes(self.before_bytes));
        log::info!(
            "New size: {:.2} MB (level '{}')",
            megabytes(self.after_bytes),
            self.level.name
        );
        log::info!("Reduction: {:.1}%", self.reduction_percent());
        log::info!(
            "Vertices: {} -> {}",
            self.original_vertices,
            self.after_vertices
        );

        if self.over_ceiling {
            log::warn!(
                "Details file is still {:.2} MB (over the {:.2} MB ceiling)",
                megabytes(self.after_bytes),
                megabytes(ceiling)
            );
        } else {
            log::info!("Details file is under the {:.2} MB ceiling", megabytes(ceiling));
        }
    }
}

/// Re-simplifies `substations.json` from its backup.
///
/// # Errors
///
/// Returns [`GenerateError::MissingDetails`] if neither the details file
/// nor its backup exists, or any I/O, parse or simplification error.
pub fn run_postpass(config: &PipelineConfig) -> Result<PostPassReport, GenerateError> {
    let details_path = config.details_path();
    let backup_path = config.backup_path();

    let before_bytes = file_size(&details_path);
    let created_backup = !backup_path.exists();

    if created_backup {
        if before_bytes.is_none() {
            return Err(GenerateError::MissingDetails {
                path: details_path.display().to_string(),
            });
        }
        log::info!("Creating backup at {}", backup_path.display());
        std::fs::copy(&details_path, &backup_path).map_err(|source| GenerateError::Io {
            path: backup_path.display().to_string(),
            source,
        })?;
    } else {
        log::info!("Re-deriving from existing backup {}", backup_path.display());
    }

    let original = read_details(&backup_path)?;
    let original_bytes = file_size(&backup_path).unwrap_or_default();
    log::info!("Processing {} substations...", original.len());

    let escalation = escalate(&config.ladder, config.size_ceiling, |level| {
        render_details(&simplify_details(&original, level))
    })?;

    let after_bytes = write_atomic(&details_path, &escalation.bytes)?;
    let simplified: Details = serde_json::from_slice(&escalation.bytes)?;

    Ok(PostPassReport {
        substations: original.len(),
        original_bytes,
        before_bytes: before_bytes.unwrap_or(original_bytes),
        after_bytes,
        original_vertices: total_vertices(&original),
        after_vertices: total_vertices(&simplified),
        level: escalation.level,
        over_ceiling: escalation.over_ceiling,
        created_backup,
    })
}

fn total_vertices(details: &Details) -> usize {
    details
        .values()
        .filter_map(|detail| detail.boundary.as_ref())
        .map(geojson_vertex_count)
        .sum()
}

fn file_size(path: &std::path::Path) -> Option<u64> {
    std::fs::metadata(path).ok().map(|m| m.len())
}
