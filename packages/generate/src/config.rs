//! Fixed pipeline configuration.
//!
//! There are no runtime flags: paths, the DNO registry and the
//! simplification ladder are all set here. Tests build their own
//! [`PipelineConfig`] pointing at temporary directories.

use std::path::{Path, PathBuf};

use substation_map_boundary::registry::all_sources;
use substation_map_boundary_models::DnoSource;
use substation_map_simplify::{ESCALATION_LADDER, SIZE_CEILING_BYTES, SimplifyLevel};

/// Name of the per-outward-code chunk directory inside the output dir.
pub const CHUNKS_DIR: &str = "chunks";

/// Name of the chunk index file.
pub const CHUNKS_INDEX_FILE: &str = "chunks_index.json";

/// Name of the served substation details file.
pub const DETAILS_FILE: &str = "substations.json";

/// Name of the unsimplified details backup.
pub const DETAILS_BACKUP_FILE: &str = "substations_original.json";

/// Everything a pipeline run needs to know.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// DNO sources in collection order.
    pub sources: Vec<DnoSource>,
    /// Directory holding the DNO boundary files.
    pub substations_dir: PathBuf,
    /// Directory holding the postcode CSV.
    pub postcodes_dir: PathBuf,
    /// Directory the artifacts are written to.
    pub output_dir: PathBuf,
    /// Maximum size of any served file, in bytes.
    pub size_ceiling: u64,
    /// Simplification levels, finest first.
    pub ladder: Vec<SimplifyLevel>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::rooted_at(&workspace_root())
    }
}

impl PipelineConfig {
    /// The standard layout (`data/raw/substations`, `data/raw/postcodes`,
    /// `data/output`) under `root`.
    #[must_use]
    pub fn rooted_at(root: &Path) -> Self {
        Self {
            sources: all_sources(),
            substations_dir: root.join("data/raw/substations"),
            postcodes_dir: root.join("data/raw/postcodes"),
            output_dir: root.join("data/output"),
            size_ceiling: SIZE_CEILING_BYTES,
            ladder: ESCALATION_LADDER.to_vec(),
        }
    }

    #[must_use]
    pub fn chunks_dir(&self) -> PathBuf {
        self.output_dir.join(CHUNKS_DIR)
    }

    /// Directory a run writes its chunks into before swapping them in.
    #[must_use]
    pub fn staging_chunks_dir(&self) -> PathBuf {
        self.output_dir.join(format!("{CHUNKS_DIR}.staging"))
    }

    #[must_use]
    pub fn chunk_path(&self, outward: &str) -> PathBuf {
        self.chunks_dir().join(format!("{outward}.json"))
    }

    #[must_use]
    pub fn index_path(&self) -> PathBuf {
        self.output_dir.join(CHUNKS_INDEX_FILE)
    }

    #[must_use]
    pub fn details_path(&self) -> PathBuf {
        self.output_dir.join(DETAILS_FILE)
    }

    #[must_use]
    pub fn backup_path(&self) -> PathBuf {
        self.output_dir.join(DETAILS_BACKUP_FILE)
    }
}

/// Returns the workspace root directory.
///
/// Resolved at compile time from `CARGO_MANIFEST_DIR`, so paths are
/// always relative to the project root regardless of the caller's
/// working directory. Falls back to the current directory if the crate
/// has been moved out of its workspace.
#[must_use]
pub fn workspace_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .ancestors()
        .nth(2)
        .map_or_else(|| PathBuf::from("."), Path::to_path_buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_layout_is_under_workspace_root() {
        let config = PipelineConfig::default();
        let root = workspace_root();
        assert_eq!(config.substations_dir, root.join("data/raw/substations"));
        assert_eq!(config.postcodes_dir, root.join("data/raw/postcodes"));
        assert_eq!(config.output_dir, root.join("data/output"));
        assert!(root.join("Cargo.toml").exists());
    }

    #[test]
    fn default_knobs() {
        let config = PipelineConfig::default();
        assert_eq!(config.size_ceiling, 25 * 1024 * 1024);
        assert_eq!(config.ladder.len(), 2);
        assert_eq!(config.sources.len(), 11);
    }

    #[test]
    fn artifact_paths() {
        let config = PipelineConfig::rooted_at(Path::new("/tmp/x"));
        assert_eq!(config.chunk_path("N15"), Path::new("/tmp/x/data/output/chunks/N15.json"));
        assert_eq!(
            config.index_path(),
            Path::new("/tmp/x/data/output/chunks_index.json")
        );
        assert_eq!(
            config.details_path(),
            Path::new("/tmp/x/data/output/substations.json")
        );
        assert_eq!(
            config.backup_path(),
            Path::new("/tmp/x/data/output/substations_original.json")
        );
    }
}
