//! Aerodynamic calculator contract.

pub mod barrowman;

pub use barrowman::BarrowmanCalculator;

use crate::error::ModelError;
use crate::sim::status::FlightConfiguration;
use crate::sim::warning::WarningSet;

/// Flow conditions seen by the rocket at one instant.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AeroConditions {
    pub mach: f64,
    pub aoa: f64,                 // rad, between nose axis and airflow
    pub airspeed: f64,            // m/s
    pub density: f64,             // kg/m^3
    pub kinematic_viscosity: f64, // m^2/s
    pub pitch_rate: f64,          // rad/s, transverse
    pub roll_rate: f64,           // rad/s
    pub cg: f64,                  // m from the nose tip
    pub thrusting: bool,
}

/// Coefficients based on the configuration's reference area and length.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AerodynamicForces {
    pub cn_alpha: f64,
    pub cp: f64, // m from the nose tip
    pub cn: f64,
    pub cd: f64,
    /// Pitch damping coefficient; the damping moment is
    /// `q·A·L · pitch_damping · (ω·L / V)`.
    pub pitch_damping: f64,
    pub ref_area: f64,
    pub ref_length: f64,
}

impl AerodynamicForces {
    /// Static margin in calibers.
    pub fn stability(&self, cg: f64) -> f64 {
        if self.ref_length > 0.0 {
            (self.cp - cg) / self.ref_length
        } else {
            0.0
        }
    }
}

/// Computes aerodynamic coefficients for a configuration.
///
/// Called up to four times per integration step, so implementations must
/// not keep state between calls. Advisory findings go to `warnings`.
pub trait AerodynamicCalculator: Send + Sync {
    fn name(&self) -> &str;

    fn forces(
        &self,
        configuration: &FlightConfiguration,
        conditions: &AeroConditions,
        warnings: &mut WarningSet,
    ) -> Result<AerodynamicForces, ModelError>;
}
