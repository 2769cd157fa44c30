//! Compile-time registry of DNO boundary data sources.
//!
//! Each entry is a `(name, toml_content)` pair embedded via `include_str!`.
//! Registry order is significant: it is the iteration order of the unified
//! boundary collection, which decides ties when a postcode falls inside
//! more than one boundary.

use substation_map_boundary_models::DnoSource;

/// Number of registered DNO sources. Enforced by a test.
#[cfg(test)]
const EXPECTED_SOURCE_COUNT: usize = 11;

/// Embedded TOML source definitions.
const SOURCE_TOMLS: &[(&str, &str)] = &[
    ("spen_spd", include_str!("../sources/spen_spd.toml")),
    ("spen_spmw", include_str!("../sources/spen_spmw.toml")),
    ("ssen_sepd", include_str!("../sources/ssen_sepd.toml")),
    ("ssen_shepd", include_str!("../sources/ssen_shepd.toml")),
    ("ngrid_em", include_str!("../sources/ngrid_em.toml")),
    ("ngrid_sw_wales", include_str!("../sources/ngrid_sw_wales.toml")),
    ("ngrid_sw", include_str!("../sources/ngrid_sw.toml")),
    ("ngrid_wm", include_str!("../sources/ngrid_wm.toml")),
    ("ukpn", include_str!("../sources/ukpn.toml")),
    ("npg", include_str!("../sources/npg.toml")),
    ("enwl", include_str!("../sources/enwl.toml")),
];

/// Returns all registered DNO sources in registry order.
///
/// # Panics
///
/// Panics if any embedded TOML file fails to parse. These are
/// compile-time constants, so a parse failure is a development error
/// caught by the tests below.
#[must_use]
pub fn all_sources() -> Vec<DnoSource> {
    SOURCE_TOMLS
        .iter()
        .map(|(name, toml_str)| {
            toml::de::from_str(toml_str)
                .unwrap_or_else(|e| panic!("Failed to parse DNO source '{name}': {e}"))
        })
        .collect()
}
