use nalgebra::Matrix3;

use crate::error::ModelError;
use crate::math::pow2;
use crate::sim::event::TIME_TOLERANCE;
use crate::sim::status::FlightConfiguration;
use crate::sim::warning::WarningSet;
use crate::vehicle::Motor;

use super::{MassCalculator, MassData};

/// Point mass with its own principal inertias, positioned along the axis.
#[derive(Debug, Clone, Copy)]
struct Lump {
    mass: f64,
    x: f64, // m from the nose tip
    longitudinal: f64,
    rotational: f64,
}

/// Stage dry masses plus motors seated at the aft end of their stage,
/// combined with the parallel-axis theorem.
#[derive(Debug, Clone, Default)]
pub struct BasicMassCalculator;

impl BasicMassCalculator {
    pub fn new() -> Self {
        Self
    }

    /// Propellant left in `motor`; exactly zero from burn time on.
    fn remaining_propellant(motor: &Motor, elapsed: Option<f64>) -> f64 {
        match elapsed {
            None => motor.propellant_mass,
            Some(t) if t >= motor.burn_time() - TIME_TOLERANCE => 0.0,
            Some(t) => motor.propellant_at(t),
        }
    }
}

impl MassCalculator for BasicMassCalculator {
    fn name(&self) -> &str {
        "basic"
    }

    fn mass_data(
        &self,
        configuration: &FlightConfiguration,
        time: f64,
        _warnings: &mut WarningSet,
    ) -> Result<MassData, ModelError> {
        let mut lumps = Vec::new();
        let mut propellant_mass = 0.0;

        for (idx, stage) in configuration.active_stages() {
            let offset = configuration.stage_offset(idx);
            lumps.push(Lump {
                mass: stage.dry_mass,
                x: offset + stage.dry_cg,
                longitudinal: stage.longitudinal_inertia,
                rotational: stage.rotational_inertia,
            });

            if let Some(mount) = configuration.mount(idx) {
                let motor = &mount.motor;
                let propellant =
                    Self::remaining_propellant(motor, configuration.burn_elapsed(idx, time));
                propellant_mass += propellant;
                let mass = motor.casing_mass + propellant;
                let radius = motor.diameter / 2.0;
                lumps.push(Lump {
                    mass,
                    x: offset + stage.length() - motor.length / 2.0,
                    longitudinal: mass * (3.0 * pow2(radius) + pow2(motor.length)) / 12.0,
                    rotational: mass * pow2(radius) / 2.0,
                });
            }
        }

        let mass: f64 = lumps.iter().map(|l| l.mass).sum();
        if !(mass > 0.0 && mass.is_finite()) {
            return Err(ModelError::Invalid(format!("total mass {mass} is not positive")));
        }
        let cg = lumps.iter().map(|l| l.mass * l.x).sum::<f64>() / mass;
        let longitudinal: f64 = lumps
            .iter()
            .map(|l| l.longitudinal + l.mass * pow2(l.x - cg))
            .sum();
        let rotational: f64 = lumps.iter().map(|l| l.rotational).sum();
        if !(longitudinal > 0.0 && rotational > 0.0) {
            return Err(ModelError::Invalid("inertia must be positive".into()));
        }

        Ok(MassData {
            mass,
            cg,
            propellant_mass,
            inertia: Matrix3::from_diagonal(&nalgebra::Vector3::new(
                longitudinal,
                longitudinal,
                rotational,
            )),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vehicle::presets;
    use approx::assert_relative_eq;
    use std::sync::Arc;

    fn sounding() -> FlightConfiguration {
        FlightConfiguration::new(Arc::new(presets::sounding_rocket()), "F60").expect("preset configuration")
    }

    #[test]
    fn unlit_motor_is_full() {
        let calc = BasicMassCalculator::new();
        let mut w = WarningSet::new();
        let m = calc.mass_data(&sounding(), 5.0, &mut w).expect("mass");
        assert_relative_eq!(m.mass, 0.35 + 0.05 + 0.07, epsilon = 1e-12);
        assert_relative_eq!(m.propellant_mass, 0.07);
        let expected_cg = (0.35 * 0.40 + 0.12 * 0.69) / 0.47;
        assert_relative_eq!(m.cg, expected_cg, epsilon = 1e-9);
        assert!(m.longitudinal_inertia() > m.rotational_inertia());
    }

    #[test]
    fn propellant_exactly_zero_at_burnout() {
        let calc = BasicMassCalculator::new();
        let mut w = WarningSet::new();
        let mut cfg = sounding();
        cfg.ignite(0, 0.3);
        let burn_time = presets::f60_motor().burn_time();
        let mid = calc.mass_data(&cfg, 0.3 + 1.0, &mut w).expect("mass");
        assert!(mid.propellant_mass > 0.0 && mid.propellant_mass < 0.07);
        let end = calc.mass_data(&cfg, 0.3 + burn_time, &mut w).expect("mass");
        assert_eq!(end.propellant_mass, 0.0);
        let later = calc.mass_data(&cfg, 100.0, &mut w).expect("mass");
        assert_eq!(later.propellant_mass, 0.0);
        assert_relative_eq!(later.mass, 0.40, epsilon = 1e-12);
    }

    #[test]
    fn cg_moves_forward_as_propellant_burns() {
        let calc = BasicMassCalculator::new();
        let mut w = WarningSet::new();
        let mut cfg = sounding();
        cfg.ignite(0, 0.0);
        let full = calc.mass_data(&cfg, 0.0, &mut w).expect("mass");
        let empty = calc.mass_data(&cfg, 3.0, &mut w).expect("mass");
        assert!(empty.cg < full.cg);
        assert!(empty.mass < full.mass);
    }

    #[test]
    fn separated_booster_alone() {
        let calc = BasicMassCalculator::new();
        let mut w = WarningSet::new();
        let mut cfg =
            FlightConfiguration::new(Arc::new(presets::two_stage()), "F60-F60").expect("preset configuration");
        let both = calc.mass_data(&cfg, 0.0, &mut w).expect("mass");
        let booster = cfg.separate(0);
        let upper = calc.mass_data(&cfg, 0.0, &mut w).expect("mass");
        let lower = calc.mass_data(&booster, 0.0, &mut w).expect("mass");
        assert_relative_eq!(upper.mass + lower.mass, both.mass, epsilon = 1e-12);
        assert!(lower.cg < 0.3);
    }
}
