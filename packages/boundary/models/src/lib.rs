#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! DNO boundary source definition types.
//!
//! Defines the TOML schema describing where each distribution network
//! operator's primary substation boundaries live and how their columns
//! are named, plus the normalized [`SubstationBoundary`] produced after
//! loading.

use geo::MultiPolygon;
use serde::{Deserialize, Serialize};

/// Property names probed, in order, for the substation display name when
/// a source does not override them.
pub const DEFAULT_NAME_ALIASES: &[&str] = &[
    "primary",
    "name",
    "substation",
    "site_name",
    "Sub_Name",
    "SUBSTATION_NAME",
];

/// Property names probed, in order, for the substation identifier when a
/// source does not override them.
pub const DEFAULT_ID_ALIASES: &[&str] = &[
    "primary_floc",
    "id",
    "substation_id",
    "site_id",
    "Sub_ID",
    "SUBSTATION_ID",
];

/// A DNO boundary data source, deserialized from TOML.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DnoSource {
    /// Unique DNO identifier (e.g. `"UKPN"`, `"SSEN_SEPD"`). Used as the
    /// prefix of synthesized substation IDs.
    pub id: String,
    /// Operator display name (e.g. "UK Power Networks").
    pub name: String,
    /// License area label (e.g. "EPN/LPN/SPN - East/London/Southeast").
    pub license_area: String,
    /// File name relative to the raw substations directory.
    pub file: String,
    /// Optional per-source override of the probed property names.
    #[serde(default)]
    pub fields: FieldAliases,
}

/// Ordered candidate property names for the logical name and ID fields.
///
/// An empty list means "use the defaults".
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FieldAliases {
    /// Candidates for the substation display name.
    #[serde(default)]
    pub name: Vec<String>,
    /// Candidates for the substation identifier.
    #[serde(default)]
    pub id: Vec<String>,
}

impl FieldAliases {
    /// Name candidates, falling back to [`DEFAULT_NAME_ALIASES`].
    #[must_use]
    pub fn name_candidates(&self) -> Vec<&str> {
        resolve(&self.name, DEFAULT_NAME_ALIASES)
    }

    /// ID candidates, falling back to [`DEFAULT_ID_ALIASES`].
    #[must_use]
    pub fn id_candidates(&self) -> Vec<&str> {
        resolve(&self.id, DEFAULT_ID_ALIASES)
    }
}

fn resolve<'a>(configured: &'a [String], defaults: &'a [&'a str]) -> Vec<&'a str> {
    if configured.is_empty() {
        defaults.to_vec()
    } else {
        configured.iter().map(String::as_str).collect()
    }
}

/// A primary substation service area after normalization.
///
/// Geometry is always WGS84 longitude/latitude by the time a value of
/// this type exists.
#[derive(Debug, Clone)]
pub struct SubstationBoundary {
    /// Identifier, unique within the unified collection.
    pub substation_id: String,
    /// Display name (falls back to the identifier).
    pub substation_name: String,
    /// Owning DNO identifier.
    pub dno_id: String,
    /// Owning DNO display name.
    pub dno_name: String,
    /// License area label.
    pub license_area: String,
    /// Service area in WGS84.
    pub geometry: MultiPolygon<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_aliases_fall_back_to_defaults() {
        let fields = FieldAliases::default();
        assert_eq!(fields.name_candidates(), DEFAULT_NAME_ALIASES);
        assert_eq!(fields.id_candidates(), DEFAULT_ID_ALIASES);
    }

    #[test]
    fn configured_aliases_replace_defaults() {
        let fields = FieldAliases {
            name: vec!["PRIMARY_NAME".to_string()],
            id: vec![],
        };
        assert_eq!(fields.name_candidates(), vec!["PRIMARY_NAME"]);
        assert_eq!(fields.id_candidates(), DEFAULT_ID_ALIASES);
    }

    #[test]
    fn source_parses_without_fields_table() {
        let source: DnoSource = toml::from_str(
            r#"
            id = "UKPN"
            name = "UK Power Networks"
            license_area = "EPN/LPN/SPN"
            file = "ukpn.geojson"
            "#,
        )
        .unwrap();
        assert!(source.fields.name.is_empty());
        assert_eq!(source.id, "UKPN");
    }
}
