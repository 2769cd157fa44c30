#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! CLI for generating the postcode-to-substation lookup artifacts.
//!
//! Every subcommand works on the fixed layout under the workspace root
//! (`data/raw/...` in, `data/output/...` out); there are no flags.

use clap::{Parser, Subcommand};
use substation_map_cli_utils::IndicatifProgress;
use substation_map_generate::config::PipelineConfig;
use substation_map_generate::{PipelineProgress, diagnostics, postpass, run_pipeline};

#[derive(Parser)]
#[command(
    name = "substation_map_generate",
    about = "UK postcode to substation matching"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load, match and write every artifact
    Process,
    /// Re-simplify `substations.json` from its unsimplified backup
    Simplify,
    /// Show where a postcode ended up
    CheckPostcode {
        /// Postcode, with or without the space
        postcode: String,
    },
    /// Audit substation identifiers across all DNO files
    CheckIds,
    /// Per-DNO substation and postcode totals
    Coverage,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let multi = substation_map_cli_utils::init_logger();
    let cli = Cli::parse();
    let config = PipelineConfig::default();

    match cli.command {
        Commands::Process => {
            let progress = PipelineProgress {
                sources: IndicatifProgress::steps_bar(
                    &multi,
                    "DNO files",
                    config.sources.len() as u64,
                ),
                matching: IndicatifProgress::records_bar(&multi, "Matching postcodes"),
                chunks: IndicatifProgress::records_bar(&multi, "Saving chunks"),
            };
            let summary = run_pipeline(&config, &progress)?;

            log::info!("=== Processing complete ===");
            log::info!("Substations: {}", summary.substations);
            log::info!(
                "Postcodes: {} ({} matched, {} unmatched, {} without outward code)",
                summary.postcodes,
                summary.matched,
                summary.unmatched,
                summary.anomalies
            );
            log::info!("Output: {}", config.output_dir.display());
        }
        Commands::Simplify => {
            let report = postpass::run_postpass(&config)?;
            report.log(config.size_ceiling);
        }
        Commands::CheckPostcode { postcode } => {
            let check = diagnostics::check_postcode(&config, &postcode)?;
            print_postcode_check(&check);
        }
        Commands::CheckIds => {
            let progress = IndicatifProgress::steps_bar(
                &multi,
                "DNO files",
                config.sources.len() as u64,
            );
            let audit = diagnostics::check_ids(&config, &progress)?;

            println!("Total substations: {}", audit.total);
            println!("Unique substation IDs: {}", audit.unique);
            println!("Substations with null ID: {}", audit.null);
            println!("Duplicated IDs: {}", audit.duplicates.len());
            for (id, count) in audit.duplicates.iter().take(10) {
                println!("  {id}: {count}");
            }
            if !audit.is_clean() {
                return Err("substation identifiers are not unique".into());
            }
        }
        Commands::Coverage => {
            let coverage = diagnostics::coverage(&config)?;
            let mut substations = 0;
            let mut postcodes = 0;
            for (dno, c) in &coverage {
                println!(
                    "{dno}: {} substations ({} without postcodes), {} postcodes",
                    c.substations, c.empty_substations, c.postcodes
                );
                substations += c.substations;
                postcodes += c.postcodes;
            }
            println!("Total: {substations} substations, {postcodes} postcodes");
        }
    }

    Ok(())
}

fn print_postcode_check(check: &diagnostics::PostcodeCheck) {
    println!("Postcode: {}", check.postcode);

    match &check.source {
        Some(record) => println!("In source: yes (LAT {}, LONG {})", record.lat, record.lng),
        None => println!("In source: no"),
    }

    let Some(outward) = &check.outward else {
        println!("No recognizable outward code");
        return;
    };

    if !check.chunk_found {
        println!("{outward} area NOT found in lookup");
        return;
    }

    println!("{outward} area found with {} postcodes", check.chunk_size);
    match &check.entry {
        Some(entry) => println!(
            "  '{}' found: substation {} ({}, {})",
            check.postcode, entry.substation_id, entry.lat, entry.lng
        ),
        None => println!("  '{}' NOT found", check.postcode),
    }
    if check.spaceless_key_present {
        println!("  WARNING: whitespace-free key also present");
    }
    println!("  Sample {outward} postcodes: {:?}", check.sample);
}
