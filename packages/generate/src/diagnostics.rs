//! Inspection commands run against the inputs or the written artifacts.

use std::collections::BTreeMap;
use std::sync::Arc;

use substation_map_boundary::load_all_boundaries;
use substation_map_boundary_models::SubstationBoundary;
use substation_map_postcode::{
    PostcodeRecord, canonical_postcode, find_postcode_file, outward_code, read_postcode_csv,
};
use substation_map_progress::ProgressCallback;

use crate::GenerateError;
use crate::config::PipelineConfig;
use crate::details::read_details;
use crate::lookup::{Chunk, ChunkEntry};

/// How many chunk keys to show as a sample.
const SAMPLE_SIZE: usize = 5;

/// Where a postcode ended up.
#[derive(Debug, Clone, PartialEq)]
pub struct PostcodeCheck {
    /// Canonical lookup key.
    pub postcode: String,
    pub outward: Option<String>,
    /// Row in the postcode source, if one is available.
    pub source: Option<PostcodeRecord>,
    /// Whether a chunk file exists for the outward code.
    pub chunk_found: bool,
    pub chunk_size: usize,
    pub entry: Option<ChunkEntry>,
    /// Whether the whitespace-free spelling is (wrongly) a key too.
    pub spaceless_key_present: bool,
    /// First few keys of the chunk.
    pub sample: Vec<String>,
}

/// Looks a postcode up in the source data and the written chunks.
///
/// # Errors
///
/// Returns [`GenerateError`] if an existing chunk file cannot be read or
/// parsed.
pub fn check_postcode(config: &PipelineConfig, raw: &str) -> Result<PostcodeCheck, GenerateError> {
    let postcode = canonical_postcode(raw);
    let outward = outward_code(&postcode).map(str::to_string);

    let mut check = PostcodeCheck {
        source: find_in_source(config, &postcode),
        postcode,
        outward,
        chunk_found: false,
        chunk_size: 0,
        entry: None,
        spaceless_key_present: false,
        sample: Vec::new(),
    };

    let Some(outward) = &check.outward else {
        return Ok(check);
    };

    let path = config.chunk_path(outward);
    if !path.exists() {
        return Ok(check);
    }

    let bytes = std::fs::read(&path).map_err(|source| GenerateError::Io {
        path: path.display().to_string(),
        source,
    })?;
    let chunk: Chunk = serde_json::from_slice(&bytes)?;

    let spaceless: String = check.postcode.chars().filter(|c| *c != ' ').collect();
    check.chunk_found = true;
    check.chunk_size = chunk.len();
    check.entry = chunk.get(&check.postcode).cloned();
    check.spaceless_key_present = spaceless != check.postcode && chunk.contains_key(&spaceless);
    check.sample = chunk.keys().take(SAMPLE_SIZE).cloned().collect();

    Ok(check)
}

fn find_in_source(config: &PipelineConfig, postcode: &str) -> Option<PostcodeRecord> {
    let path = match find_postcode_file(&config.postcodes_dir) {
        Ok(path) => path,
        Err(e) => {
            log::warn!("Not checking postcode source: {e}");
            return None;
        }
    };
    match read_postcode_csv(&path) {
        Ok((records, _)) => records.into_iter().find(|r| r.postcode == postcode),
        Err(e) => {
            log::warn!("Not checking postcode source: {e}");
            None
        }
    }
}

/// Identifier health of the unified boundary collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdAudit {
    pub total: usize,
    pub unique: usize,
    /// Blank identifiers.
    pub null: usize,
    /// Identifiers used more than once, most frequent first.
    pub duplicates: Vec<(String, usize)>,
}

impl IdAudit {
    #[must_use]
    pub fn from_boundaries(boundaries: &[SubstationBoundary]) -> Self {
        let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
        for b in boundaries {
            *counts.entry(b.substation_id.as_str()).or_default() += 1;
        }

        let mut duplicates: Vec<(String, usize)> = counts
            .iter()
            .filter(|(_, n)| **n > 1)
            .map(|(id, n)| ((*id).to_string(), *n))
            .collect();
        duplicates.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

        Self {
            total: boundaries.len(),
            unique: counts.len(),
            null: boundaries
                .iter()
                .filter(|b| b.substation_id.trim().is_empty())
                .count(),
            duplicates,
        }
    }

    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.null == 0 && self.duplicates.is_empty()
    }
}

/// Loads every DNO source and audits the identifiers.
///
/// # Errors
///
/// Returns [`GenerateError::Boundary`] if no source loads.
pub fn check_ids(
    config: &PipelineConfig,
    progress: &Arc<dyn ProgressCallback>,
) -> Result<IdAudit, GenerateError> {
    let boundaries = load_all_boundaries(&config.sources, &config.substations_dir, progress)?;
    Ok(IdAudit::from_boundaries(&boundaries))
}

/// Per-DNO totals from the written details file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DnoCoverage {
    pub substations: usize,
    pub postcodes: usize,
    /// Substations no postcode was matched to.
    pub empty_substations: usize,
}

/// Summarizes `substations.json` per DNO display name.
///
/// # Errors
///
/// Returns [`GenerateError`] if the details file cannot be read or parsed.
pub fn coverage(config: &PipelineConfig) -> Result<BTreeMap<String, DnoCoverage>, GenerateError> {
    let path = config.details_path();
    if !path.exists() {
        return Err(GenerateError::MissingDetails {
            path: path.display().to_string(),
        });
    }

    let mut by_dno: BTreeMap<String, DnoCoverage> = BTreeMap::new();
    for detail in read_details(&path)?.values() {
        let entry = by_dno.entry(detail.dno.clone()).or_default();
        entry.substations += 1;
        entry.postcodes += detail.postcode_count;
        if detail.postcode_count == 0 {
            entry.empty_substations += 1;
        }
    }

    Ok(by_dno)
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::MultiPolygon;

    fn boundary(id: &str) -> SubstationBoundary {
        SubstationBoundary {
            substation_id: id.to_string(),
            substation_name: id.to_string(),
            dno_id: "D".to_string(),
            dno_name: "D".to_string(),
            license_area: "L".to_string(),
            geometry: MultiPolygon(vec![]),
        }
    }

    #[test]
    fn audit_counts_blank_and_duplicate_ids() {
        let audit = IdAudit::from_boundaries(&[
            boundary("A"),
            boundary("B"),
            boundary("A"),
            boundary(" "),
            boundary("B"),
            boundary("B"),
        ]);

        assert_eq!(audit.total, 6);
        assert_eq!(audit.unique, 3);
        assert_eq!(audit.null, 1);
        assert_eq!(
            audit.duplicates,
            vec![("B".to_string(), 3), ("A".to_string(), 2)]
        );
        assert!(!audit.is_clean());
        assert!(IdAudit::from_boundaries(&[boundary("A"), boundary("B")]).is_clean());
    }

    #[test]
    fn postcode_check_reads_chunk_and_flags_spaceless_keys() {
        let dir = tempfile::tempdir().unwrap();
        let config = PipelineConfig::rooted_at(dir.path());
        std::fs::create_dir_all(config.chunks_dir()).unwrap();
        std::fs::write(
            config.chunk_path("N15"),
            r#"{"N15 5QA":{"substation_id":"S1","lat":51.58152,"lng":-0.083085},"N155QB":{"substation_id":"S1","lat":51.5,"lng":-0.08}}"#,
        )
        .unwrap();

        let check = check_postcode(&config, "n155qa").unwrap();
        assert_eq!(check.postcode, "N15 5QA");
        assert_eq!(check.outward.as_deref(), Some("N15"));
        assert!(check.chunk_found);
        assert_eq!(check.chunk_size, 2);
        assert_eq!(check.entry.as_ref().map(|e| e.substation_id.as_str()), Some("S1"));
        assert!(!check.spaceless_key_present);
        assert!(check.source.is_none());

        let check = check_postcode(&config, "N15 5QB").unwrap();
        assert!(check.entry.is_none());
        assert!(check.spaceless_key_present);
    }

    #[test]
    fn postcode_check_without_chunk() {
        let dir = tempfile::tempdir().unwrap();
        let config = PipelineConfig::rooted_at(dir.path());
        let check = check_postcode(&config, "ZE1 0AA").unwrap();
        assert!(!check.chunk_found);
        assert!(check.entry.is_none());
    }

    #[test]
    fn coverage_groups_by_dno() {
        let dir = tempfile::tempdir().unwrap();
        let config = PipelineConfig::rooted_at(dir.path());
        std::fs::create_dir_all(&config.output_dir).unwrap();
        std::fs::write(
            config.details_path(),
            r#"{
                "A":{"name":"A","dno":"UK Power Networks","license_area":"LPN","postcode_count":2,"postcodes":["N15 5QA","N15 5QB"],"boundary":null},
                "B":{"name":"B","dno":"UK Power Networks","license_area":"LPN","postcode_count":0,"postcodes":[],"boundary":null},
                "C":{"name":"C","dno":"Electricity North West","license_area":"ENWL","postcode_count":1,"postcodes":["M1 1AA"],"boundary":null}
            }"#,
        )
        .unwrap();

        let coverage = coverage(&config).unwrap();
        assert_eq!(
            coverage["UK Power Networks"],
            DnoCoverage {
                substations: 2,
                postcodes: 2,
                empty_substations: 1,
            }
        );
        assert_eq!(coverage["Electricity North West"].postcodes, 1);
    }
}
