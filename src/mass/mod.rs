//! Mass calculator contract.

pub mod basic;

pub use basic::BasicMassCalculator;

use nalgebra::Matrix3;

use crate::error::ModelError;
use crate::sim::status::FlightConfiguration;
use crate::sim::warning::WarningSet;

/// Mass properties of the attached stack at one instant.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MassData {
    pub mass: f64,            // kg
    pub cg: f64,              // m from the nose tip
    pub propellant_mass: f64, // kg, remaining in all attached motors
    /// Body-frame inertia tensor about the CG, kg·m².
    pub inertia: Matrix3<f64>,
}

impl MassData {
    pub fn longitudinal_inertia(&self) -> f64 {
        self.inertia[(0, 0)]
    }

    pub fn rotational_inertia(&self) -> f64 {
        self.inertia[(2, 2)]
    }
}

/// Computes mass, CG and inertia for a configuration at a given time.
///
/// Same purity rules as the aerodynamic calculator: repeated calls with the
/// same inputs give the same answer.
pub trait MassCalculator: Send + Sync {
    fn name(&self) -> &str;

    fn mass_data(
        &self,
        configuration: &FlightConfiguration,
        time: f64,
        warnings: &mut WarningSet,
    ) -> Result<MassData, ModelError>;
}
