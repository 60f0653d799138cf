//! ERA5 variable classification.

use crate::series::StatKind;

/// Short and long names of variables the archive delivers as running totals.
const ACCUMULATED: &[&str] = &[
    "ssrd",
    "surface_solar_radiation_downwards",
    "ssr",
    "surface_net_solar_radiation",
    "strd",
    "surface_thermal_radiation_downwards",
    "str",
    "surface_net_thermal_radiation",
    "tp",
    "total_precipitation",
    "sf",
    "snowfall",
    "e",
    "total_evaporation",
    "ro",
    "runoff",
];

/// Classify a variable by short (`ssrd`) or long (`total_precipitation`) name.
///
/// Anything not known to be accumulated is treated as instantaneous.
pub fn classify_variable(name: &str) -> StatKind {
    let name = name.trim().to_ascii_lowercase();
    if ACCUMULATED.contains(&name.as_str()) {
        StatKind::IntegratedFlux
    } else {
        StatKind::Instant
    }
}
