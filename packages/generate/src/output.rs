//! Writes the served artifacts.
//!
//! Every file is compact JSON written atomically (`.tmp` then rename).
//! Size problems never stop a write; they are collected and reported once
//! everything is on disk.

use std::path::Path;
use std::sync::Arc;

use serde::Serialize;
use substation_map_progress::ProgressCallback;
use substation_map_simplify::{Escalation, SimplifyLevel, megabytes};

use crate::GenerateError;
use crate::config::PipelineConfig;
use crate::lookup::Chunk;

/// Contents of `chunks_index.json`.
#[derive(Debug, Clone, Serialize)]
pub struct ChunkIndex<'a> {
    pub areas: Vec<&'a str>,
    pub total_areas: usize,
    /// RFC 3339 local timestamp of the run.
    pub generated: String,
}

/// Sizes of everything that was written.
#[derive(Debug, Clone, Default)]
pub struct WriteReport {
    pub chunk_count: usize,
    pub chunk_bytes: u64,
    /// Outward code and size of the largest chunk.
    pub largest_chunk: Option<(String, u64)>,
    /// Chunks larger than the size ceiling.
    pub oversized_chunks: Vec<(String, u64)>,
    pub details_bytes: u64,
    pub backup_bytes: u64,
    /// Level the served details were rendered at.
    pub level: Option<SimplifyLevel>,
    pub details_over_ceiling: bool,
}

impl WriteReport {
    /// Logs the summary, then every size warning.
    pub fn log(&self, ceiling: u64) {
        log::info!(
            "Saved {} chunk files ({:.1} MB total)",
            self.chunk_count,
            megabytes(self.chunk_bytes)
        );
        if let Some((outward, size)) = &self.largest_chunk {
            log::info!("Largest chunk: {outward} ({:.2} MB)", megabytes(*size));
        }
        log::info!("Saved details backup ({:.1} MB)", megabytes(self.backup_bytes));
        if let Some(level) = &self.level {
            log::info!(
                "Saved details ({:.1} MB, simplified at '{}')",
                megabytes(self.details_bytes),
                level.name
            );
        }

        for (outward, size) in &self.oversized_chunks {
            log::warn!(
                "Chunk {outward} is {:.2} MB, over the {:.2} MB ceiling",
                megabytes(*size),
                megabytes(ceiling)
            );
        }
        if self.details_over_ceiling {
            log::warn!(
                "Details file is still {:.2} MB after the coarsest simplification \
                 (ceiling {:.2} MB); written anyway",
                megabytes(self.details_bytes),
                megabytes(ceiling)
            );
        }
    }

    /// Whether any size warning was raised.
    #[must_use]
    pub fn has_warnings(&self) -> bool {
        self.details_over_ceiling || !self.oversized_chunks.is_empty()
    }
}

/// Writes `bytes` to `path` via a sibling `.tmp` file.
///
/// # Errors
///
/// Returns [`GenerateError::Io`] if either the write or the rename fails.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<u64, GenerateError> {
    let io_err = |source| GenerateError::Io {
        path: path.display().to_string(),
        source,
    };

    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(".tmp");
    let tmp_path = Path::new(&tmp_name);

    std::fs::write(tmp_path, bytes).map_err(io_err)?;
    std::fs::rename(tmp_path, path).map_err(io_err)?;
    Ok(bytes.len() as u64)
}

/// Writes one file per outward code plus the index, recording sizes in
/// `report`.
///
/// Chunks go into a fresh staging directory that then replaces
/// `chunks/`, so no chunk from an earlier run survives.
///
/// # Errors
///
/// Returns [`GenerateError`] if a directory or file cannot be written.
pub fn write_chunks<'a>(
    config: &PipelineConfig,
    chunks: impl ExactSizeIterator<Item = (&'a String, &'a Chunk)>,
    generated: String,
    report: &mut WriteReport,
    progress: &Arc<dyn ProgressCallback>,
) -> Result<(), GenerateError> {
    let staging = config.staging_chunks_dir();
    remove_dir_if_present(&staging)?;
    std::fs::create_dir_all(&staging).map_err(|source| GenerateError::Io {
        path: staging.display().to_string(),
        source,
    })?;

    progress.set_total(chunks.len() as u64);
    let mut areas = Vec::with_capacity(chunks.len());

    for (outward, chunk) in chunks {
        let path = staging.join(format!("{outward}.json"));
        let size = write_atomic(&path, &serde_json::to_vec(chunk)?)?;

        report.chunk_count += 1;
        report.chunk_bytes += size;
        if report.largest_chunk.as_ref().is_none_or(|(_, largest)| size > *largest) {
            report.largest_chunk = Some((outward.clone(), size));
        }
        if size > config.size_ceiling {
            report.oversized_chunks.push((outward.clone(), size));
        }

        areas.push(outward.as_str());
        progress.inc(1);
    }

    let dir = config.chunks_dir();
    remove_dir_if_present(&dir)?;
    std::fs::rename(&staging, &dir).map_err(|source| GenerateError::Io {
        path: dir.display().to_string(),
        source,
    })?;

    let index = ChunkIndex {
        total_areas: areas.len(),
        areas,
        generated,
    };
    write_atomic(&config.index_path(), &serde_json::to_vec(&index)?)?;
    progress.finish(format!("Saved {} chunk files", index.total_areas));

    Ok(())
}

fn remove_dir_if_present(dir: &Path) -> Result<(), GenerateError> {
    match std::fs::remove_dir_all(dir) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(GenerateError::Io {
            path: dir.display().to_string(),
            source,
        }),
    }
}

/// Writes the unsimplified details backup.
///
/// # Errors
///
/// Returns [`GenerateError::Io`] if the file cannot be written.
pub fn write_backup(
    config: &PipelineConfig,
    bytes: &[u8],
    report: &mut WriteReport,
) -> Result<(), GenerateError> {
    report.backup_bytes = write_atomic(&config.backup_path(), bytes)?;
    Ok(())
}

/// Writes the served details at whatever level escalation settled on.
///
/// # Errors
///
/// Returns [`GenerateError::Io`] if the file cannot be written.
pub fn write_details(
    config: &PipelineConfig,
    escalation: &Escalation,
    report: &mut WriteReport,
) -> Result<(), GenerateError> {
    report.details_bytes = write_atomic(&config.details_path(), &escalation.bytes)?;
    report.level = Some(escalation.level);
    report.details_over_ceiling = escalation.over_ceiling;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lookup::ChunkEntry;
    use std::collections::BTreeMap;
    use substation_map_progress::null_progress;

    fn chunk(codes: &[&str]) -> Chunk {
        codes
            .iter()
            .map(|code| {
                (
                    (*code).to_string(),
                    ChunkEntry {
                        substation_id: "S1".to_string(),
                        lat: 51.58152,
                        lng: -0.083_085,
                    },
                )
            })
            .collect()
    }

    #[test]
    fn atomic_write_leaves_no_tmp_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.json");
        assert_eq!(write_atomic(&path, b"{}").unwrap(), 2);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "{}");
        assert!(!dir.path().join("a.json.tmp").exists());
    }

    #[test]
    fn writes_every_chunk_even_when_oversized() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = PipelineConfig::rooted_at(dir.path());
        config.size_ceiling = 10;

        let chunks: BTreeMap<String, Chunk> = [
            ("AB1".to_string(), chunk(&["AB1 1AA", "AB1 1AB"])),
            ("N15".to_string(), chunk(&["N15 5QA"])),
        ]
        .into_iter()
        .collect();

        let mut report = WriteReport::default();
        write_chunks(
            &config,
            chunks.iter(),
            "2026-01-01T00:00:00+00:00".to_string(),
            &mut report,
            &null_progress(),
        )
        .unwrap();

        assert!(config.chunk_path("AB1").exists());
        assert!(config.chunk_path("N15").exists());
        assert_eq!(report.chunk_count, 2);
        assert_eq!(report.oversized_chunks.len(), 2);
        assert_eq!(report.largest_chunk.as_ref().map(|(o, _)| o.as_str()), Some("AB1"));
        assert!(report.has_warnings());

        let n15 = std::fs::read_to_string(config.chunk_path("N15")).unwrap();
        assert_eq!(
            n15,
            r#"{"N15 5QA":{"substation_id":"S1","lat":51.58152,"lng":-0.083085}}"#
        );

        let index: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(config.index_path()).unwrap()).unwrap();
        assert_eq!(index["areas"], serde_json::json!(["AB1", "N15"]));
        assert_eq!(index["total_areas"], 2);
        assert_eq!(index["generated"], "2026-01-01T00:00:00+00:00");
    }

    #[test]
    fn rewriting_chunks_drops_areas_from_earlier_runs() {
        let dir = tempfile::tempdir().unwrap();
        let config = PipelineConfig::rooted_at(dir.path());

        let first: BTreeMap<String, Chunk> = [
            ("M1".to_string(), chunk(&["M1 1AA"])),
            ("N15".to_string(), chunk(&["N15 5QA"])),
        ]
        .into_iter()
        .collect();
        write_chunks(
            &config,
            first.iter(),
            "2026-01-01T00:00:00+00:00".to_string(),
            &mut WriteReport::default(),
            &null_progress(),
        )
        .unwrap();
        assert!(config.chunk_path("M1").exists());

        let second: BTreeMap<String, Chunk> = [("N15".to_string(), chunk(&["N15 5QA"]))]
            .into_iter()
            .collect();
        write_chunks(
            &config,
            second.iter(),
            "2026-01-02T00:00:00+00:00".to_string(),
            &mut WriteReport::default(),
            &null_progress(),
        )
        .unwrap();

        assert!(!config.chunk_path("M1").exists());
        assert!(config.chunk_path("N15").exists());
        assert!(!config.staging_chunks_dir().exists());
    }
}
