//! Code for loading a venture (system, parameters and cost accounting) from a TOML file.
use crate::accounting::{CostAccounting, CostFactors};
use crate::id::collect_unique;
use crate::input::{input_err_msg, read_toml};
use crate::parameters::VentureParameters;
use crate::system::{FixedCostUnit, Stream, System};
use crate::tea::Tea;
use anyhow::{Context, Result, ensure};
use log::debug;
use serde::Deserialize;
use std::path::Path;

/// The contents of a venture file
#[derive(Debug, Deserialize)]
struct VentureFile {
    /// Name of the system (defaults to the file stem)
    #[serde(default)]
    id: Option<String>,
    parameters: VentureParameters,
    cost_accounting: CostFactors,
    #[serde(default)]
    units: Vec<FixedCostUnit>,
    #[serde(default)]
    streams: Vec<Stream>,
}

/// Read a system from the units and streams of a venture file
fn build_system(id: &str, units: Vec<FixedCostUnit>, streams: Vec<Stream>) -> Result<System> {
    let units = collect_unique(units).context("Invalid units")?;
    ensure!(!units.is_empty(), "A venture must contain at least one unit");

    let mut system = System::new(id);
    for (_, unit) in units {
        system.add_unit(Box::new(unit));
    }
    for stream in streams {
        system.add_stream(stream)?;
    }

    Ok(system)
}

/// Load a venture from the specified TOML file.
///
/// # Arguments
///
/// * `file_path` - Path to the venture file
///
/// # Returns
///
/// A TEA of the venture's system or an error.
pub fn load_venture(file_path: &Path) -> Result<Tea> {
    let venture: VentureFile = read_toml(file_path)?;
    let id = match venture.id {
        Some(id) => id,
        None => file_path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| "venture".to_string()),
    };

    let system = build_system(&id, venture.units, venture.streams)
        .with_context(|| input_err_msg(file_path))?;
    debug!(
        "Read system '{id}' with {} units and {} streams",
        system.units().len(),
        system.streams().count()
    );

    let accounting = CostAccounting::from_factors(venture.cost_accounting);
    let tea = Tea::new(system, venture.parameters, accounting)
        .with_context(|| input_err_msg(file_path))?;

    Ok(tea)
}
