use std::f64::consts::FRAC_PI_3;

use nalgebra::{UnitQuaternion, Vector3};

use crate::error::SimulationError;
use crate::math;
use crate::physics::gravity;
use crate::physics::wind::{ConstantWind, PinkNoiseWind, WindModel};

// ---------------------------------------------------------------------------
// Launch conditions
// ---------------------------------------------------------------------------

/// Launch site and run parameters. Angles are in radians.
///
/// `Clone` is a full deep copy; nothing inside is shared. Equality is
/// tolerant (see [`math::equals`]) so that values which only differ by
/// rounding noise compare equal when checking whether results are stale.
#[derive(Debug, Clone)]
pub struct Conditions {
    pub motor_configuration: Option<String>,
    pub launch_altitude: f64,      // m above sea level
    pub launch_latitude: f64,      // rad
    pub launch_rod_length: f64,    // m
    pub launch_rod_angle: f64,     // rad from vertical
    pub launch_rod_direction: f64, // rad, azimuth the rod leans toward
    pub wind_speed_average: f64,   // m/s
    /// Standard deviation of the wind speed relative to the average.
    pub wind_turbulence_intensity: f64,
    pub wind_direction: f64, // rad, azimuth the wind blows toward
    pub time_step: f64,      // s
    pub max_time: f64,       // s
    pub random_seed: u64,
}

impl Default for Conditions {
    fn default() -> Self {
        Self {
            motor_configuration: None,
            launch_altitude: 0.0,
            launch_latitude: 28.61_f64.to_radians(),
            launch_rod_length: 1.0,
            launch_rod_angle: 0.0,
            launch_rod_direction: 0.0,
            wind_speed_average: 0.0,
            wind_turbulence_intensity: 0.0,
            wind_direction: 0.0,
            time_step: 0.01,
            max_time: 1200.0,
            random_seed: 0,
        }
    }
}

impl PartialEq for Conditions {
    fn eq(&self, other: &Self) -> bool {
        self.motor_configuration == other.motor_configuration
            && self.random_seed == other.random_seed
            && math::equals(self.launch_altitude, other.launch_altitude)
            && math::equals(self.launch_latitude, other.launch_latitude)
            && math::equals(self.launch_rod_length, other.launch_rod_length)
            && math::equals(self.launch_rod_angle, other.launch_rod_angle)
            && math::equals(self.launch_rod_direction, other.launch_rod_direction)
            && math::equals(self.wind_speed_average, other.wind_speed_average)
            && math::equals(self.wind_turbulence_intensity, other.wind_turbulence_intensity)
            && math::equals(self.wind_direction, other.wind_direction)
            && math::equals(self.time_step, other.time_step)
            && math::equals(self.max_time, other.max_time)
    }
}

impl Conditions {
    pub fn with_motor_configuration(mut self, id: impl Into<String>) -> Self {
        self.motor_configuration = Some(id.into());
        self
    }

    /// Overwrite every field with `other`'s values.
    pub fn copy_from(&mut self, other: &Conditions) {
        self.clone_from(other);
    }

    pub fn validate(&self) -> Result<(), SimulationError> {
        let invalid = |msg: &str| -> Result<(), SimulationError> {
            Err(SimulationError::InvalidConditions(msg.to_string()))
        };
        if !(self.time_step.is_finite() && self.time_step > 0.0) {
            return invalid("time step must be positive");
        }
        if !(self.max_time.is_finite() && self.max_time > 0.0) {
            return invalid("maximum time must be positive");
        }
        if self.time_step > self.max_time {
            return invalid("time step exceeds maximum time");
        }
        if !(self.launch_rod_length >= 0.0) {
            return invalid("launch rod length must not be negative");
        }
        if !(0.0..=FRAC_PI_3).contains(&self.launch_rod_angle) {
            return invalid("launch rod angle must be between 0 and 60 degrees");
        }
        if !(self.launch_latitude.abs() <= std::f64::consts::FRAC_PI_2) {
            return invalid("latitude out of range");
        }
        if !(self.wind_speed_average >= 0.0 && self.wind_turbulence_intensity >= 0.0) {
            return invalid("wind speed and turbulence must not be negative");
        }
        if !self.launch_altitude.is_finite() {
            return invalid("launch altitude must be finite");
        }
        Ok(())
    }

    /// Wind model for one run. Turbulence is pre-generated from the seed.
    pub fn wind_model(&self) -> Box<dyn WindModel> {
        if self.wind_turbulence_intensity > 0.0 && self.wind_speed_average > 0.0 {
            Box::new(PinkNoiseWind::new(
                self.wind_speed_average,
                self.wind_speed_average * self.wind_turbulence_intensity,
                self.wind_direction,
                self.random_seed,
                self.max_time + 1.0,
            ))
        } else {
            Box::new(ConstantWind::new(self.wind_speed_average, self.wind_direction))
        }
    }

    /// Unit vector along the launch rod, pointing up and away from the pad.
    pub fn rod_direction(&self) -> Vector3<f64> {
        let (sa, ca) = self.launch_rod_angle.sin_cos();
        let (sd, cd) = self.launch_rod_direction.sin_cos();
        Vector3::new(sa * sd, sa * cd, ca)
    }

    /// Attitude with the nose along the rod.
    pub fn launch_orientation(&self) -> UnitQuaternion<f64> {
        UnitQuaternion::rotation_between(&Vector3::z(), &self.rod_direction())
            .unwrap_or_else(UnitQuaternion::identity)
    }

    /// Gravity magnitude at the launch site.
    pub fn surface_gravity(&self) -> f64 {
        gravity::at_altitude(gravity::surface_gravity(self.launch_latitude), self.launch_altitude)
    }
}
