use std::cell::RefCell;

use nalgebra::{Quaternion, Vector3};

use crate::aero::{AeroConditions, AerodynamicCalculator};
use crate::dynamics::state::{Deriv, State};
use crate::error::ModelError;
use crate::mass::MassCalculator;
use crate::math::{clamp, EPSILON};
use crate::physics::atmosphere;
use crate::physics::gravity::gravity_accel;
use crate::physics::wind::WindModel;
use crate::sim::conditions::Conditions;
use crate::sim::flight_data::FlightSnapshot;
use crate::sim::status::FlightConfiguration;
use crate::sim::warning::WarningSet;

/// Below this airspeed no aerodynamic moments are applied, m/s.
const MIN_AERO_SPEED: f64 = 1.0;

// ---------------------------------------------------------------------------
// 6DOF equations of motion, composed from the pluggable calculators
// ---------------------------------------------------------------------------

/// Everything the derivative function reads during one step.
///
/// Nothing here changes between the stepper's evaluations except the
/// warning sink, which only collects.
pub struct DerivativeContext<'a> {
    pub configuration: &'a FlightConfiguration,
    pub conditions: &'a Conditions,
    pub aerodynamics: &'a dyn AerodynamicCalculator,
    pub mass: &'a dyn MassCalculator,
    pub wind: &'a dyn WindModel,
    pub surface_gravity: f64,
    /// Motion constrained to the launch rod.
    pub on_rod: bool,
    warnings: RefCell<WarningSet>,
}

impl<'a> DerivativeContext<'a> {
    pub fn new(
        configuration: &'a FlightConfiguration,
        conditions: &'a Conditions,
        aerodynamics: &'a dyn AerodynamicCalculator,
        mass: &'a dyn MassCalculator,
        wind: &'a dyn WindModel,
        on_rod: bool,
    ) -> Self {
        Self {
            configuration,
            conditions,
            aerodynamics,
            mass,
            wind,
            surface_gravity: conditions.surface_gravity(),
            on_rod,
            warnings: RefCell::new(WarningSet::new()),
        }
    }

    /// Warnings raised by the calculators so far.
    pub fn take_warnings(&self) -> WarningSet {
        self.warnings.take()
    }

    pub fn evaluate(&self, state: &State) -> Result<Deriv, ModelError> {
        self.evaluate_full(state).map(|(d, _)| d)
    }

    /// Derivative plus the derived quantities recorded with a sample.
    ///
    /// Forces and moments:
    ///   1. Gravity at the current geometric altitude
    ///   2. Thrust along the body axis
    ///   3. Axial drag (body plus deployed recovery devices) against the airflow
    ///   4. Normal force at the CP, opposing the lateral airflow
    ///   5. Pitch damping
    pub fn evaluate_full(&self, state: &State) -> Result<(Deriv, FlightSnapshot), ModelError> {
        let time = state.time;
        let config = self.configuration;
        let mut warnings = self.warnings.borrow_mut();

        let mass = self.mass.mass_data(config, time, &mut warnings)?;
        let altitude = self.conditions.launch_altitude + state.pos.z;
        let atm = atmosphere::isa(altitude);

        // --- Airflow ---
        let v_air = state.vel - self.wind.velocity(time, altitude);
        let airspeed = v_air.norm();
        let axis = state.body_axis();
        let aoa = if airspeed > EPSILON {
            clamp(axis.dot(&v_air) / airspeed, -1.0, 1.0).acos()
        } else {
            0.0
        };
        let mach = airspeed / atm.sound_speed;
        let roll_rate = state.omega.dot(&axis);
        let omega_transverse = state.omega - axis * roll_rate;

        let thrust = config.thrust(time);
        let aero = self.aerodynamics.forces(
            config,
            &AeroConditions {
                mach,
                aoa,
                airspeed,
                density: atm.density,
                kinematic_viscosity: atm.kinematic_viscosity,
                pitch_rate: omega_transverse.norm(),
                roll_rate,
                cg: mass.cg,
                thrusting: thrust > 0.0,
            },
            &mut warnings,
        )?;
        drop(warnings);

        // --- Forces (inertial) ---
        let q_dyn = 0.5 * atm.density * airspeed * airspeed;
        let drag = q_dyn * (aero.cd * aero.ref_area + config.recovery_drag_area());
        let f_drag = if airspeed > EPSILON { -v_air / airspeed * drag } else { Vector3::zeros() };

        let lateral = v_air - axis * axis.dot(&v_air);
        let lateral_speed = lateral.norm();
        let f_normal = if lateral_speed > EPSILON {
            -lateral / lateral_speed * (q_dyn * aero.ref_area * aero.cn)
        } else {
            Vector3::zeros()
        };

        let f_thrust = axis * thrust;
        let f_gravity = gravity_accel(self.surface_gravity, state.pos.z.max(0.0)) * mass.mass;
        let mut accel = (f_gravity + f_thrust + f_drag + f_normal) / mass.mass;

        // --- Torques (inertial) ---
        let mut torque = (axis * (mass.cg - aero.cp)).cross(&f_normal);
        if airspeed > MIN_AERO_SPEED {
            let l = aero.ref_length.max(config.total_length());
            torque -= omega_transverse * (q_dyn * aero.ref_area * l * aero.pitch_damping * l / airspeed);
        }

        // --- Euler's equation in the body frame ---
        let inv_q = state.quat.inverse();
        let omega_b = inv_q * state.omega;
        let torque_b = inv_q * torque;
        let inertia_inv = mass
            .inertia
            .try_inverse()
            .ok_or_else(|| ModelError::Invalid("singular inertia tensor".into()))?;
        let domega_b = inertia_inv * (torque_b - omega_b.cross(&(mass.inertia * omega_b)));
        let mut domega = state.quat * domega_b;

        // --- Quaternion kinematics with ω in the inertial frame: dq/dt = ½ ω ⊗ q ---
        let mut dquat = Quaternion::from_imag(state.omega) * state.quat.quaternion() * 0.5;

        // --- Launch rod: slide along it without rotating ---
        if self.on_rod {
            let rod = self.conditions.rod_direction();
            let mut along = accel.dot(&rod);
            if along < 0.0 && state.pos.dot(&rod) <= EPSILON {
                along = 0.0;
            }
            accel = rod * along;
            domega = Vector3::zeros();
            dquat = Quaternion::new(0.0, 0.0, 0.0, 0.0);
        }

        let deriv = Deriv { dpos: state.vel, dvel: accel, dquat, domega };
        let snapshot = FlightSnapshot {
            mass: mass.mass,
            propellant_mass: mass.propellant_mass,
            cg: mass.cg,
            cp: aero.cp,
            stability: aero.stability(mass.cg),
            aoa,
            mach,
            airspeed,
            thrust,
            drag,
            dynamic_pressure: q_dyn,
            acceleration: accel.norm(),
        };
        Ok((deriv, snapshot))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aero::BarrowmanCalculator;
    use crate::mass::BasicMassCalculator;
    use crate::physics::wind::ConstantWind;
    use crate::vehicle::presets;
    use nalgebra::UnitQuaternion;
    use std::sync::Arc;

    struct Fixture {
        config: FlightConfiguration,
        conditions: Conditions,
        aero: BarrowmanCalculator,
        mass: BasicMassCalculator,
        wind: ConstantWind,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                config: FlightConfiguration::new(Arc::new(presets::sounding_rocket()), "F60")
                    .expect("preset configuration"),
                conditions: Conditions::default(),
                aero: BarrowmanCalculator::new(),
                mass: BasicMassCalculator::new(),
                wind: ConstantWind::calm(),
            }
        }

        fn context(&self, on_rod: bool) -> DerivativeContext<'_> {
            DerivativeContext::new(&self.config, &self.conditions, &self.aero, &self.mass, &self.wind, on_rod)
        }
    }

    fn flying(vel: Vector3<f64>) -> State {
        State {
            time: 10.0,
            pos: Vector3::new(0.0, 0.0, 300.0),
            vel,
            quat: UnitQuaternion::identity(),
            omega: Vector3::zeros(),
        }
    }

    #[test]
    fn rests_on_pad_before_ignition() {
        let fx = Fixture::new();
        let d = fx.context(true).evaluate(&State::at_rest(UnitQuaternion::identity())).expect("deriv");
        assert_eq!(d.dvel, Vector3::zeros());
    }

    #[test]
    fn net_upward_accel_after_ignition() {
        let mut fx = Fixture::new();
        fx.config.ignite(0, 0.0);
        let (d, snap) = fx
            .context(true)
            .evaluate_full(&State::at_rest(UnitQuaternion::identity()))
            .expect("deriv");
        assert!(d.dvel.z > 0.0, "thrust exceeds weight, got {}", d.dvel.z);
        assert_eq!(snap.thrust, 60.0);
        assert!(snap.stability > 1.0);
    }

    #[test]
    fn coasting_decelerates() {
        let fx = Fixture::new();
        let d = fx.context(false).evaluate(&flying(Vector3::new(0.0, 0.0, 100.0))).expect("deriv");
        assert!(d.dvel.z < -9.8, "gravity plus drag, got {}", d.dvel.z);
        assert!(d.domega.norm() < 1e-12);
    }

    #[test]
    fn weathercocks_into_the_airflow() {
        let fx = Fixture::new();
        // Moving up and east with the nose straight up: the nose should turn east.
        let d = fx.context(false).evaluate(&flying(Vector3::new(10.0, 0.0, 100.0))).expect("deriv");
        let turn = d.domega.cross(&Vector3::z());
        assert!(turn.x > 0.0, "nose should rotate toward +x, got {turn:?}");
        assert!(d.dvel.x < 0.0, "normal force pushes against lateral motion");
    }

    #[test]
    fn quat_deriv_zero_without_rotation() {
        let fx = Fixture::new();
        let d = fx.context(false).evaluate(&flying(Vector3::new(0.0, 0.0, 50.0))).expect("deriv");
        let q = d.dquat;
        assert!((q.w.abs() + q.i.abs() + q.j.abs() + q.k.abs()) < 1e-12);
    }

    #[test]
    fn rod_projects_acceleration() {
        let mut fx = Fixture::new();
        fx.conditions.launch_rod_angle = 0.2;
        fx.config.ignite(0, 0.0);
        let mut s = State::at_rest(fx.conditions.launch_orientation());
        s.pos = fx.conditions.rod_direction() * 0.5;
        s.vel = fx.conditions.rod_direction() * 5.0;
        let d = fx.context(true).evaluate(&s).expect("deriv");
        let rod = fx.conditions.rod_direction();
        assert!((d.dvel - rod * d.dvel.dot(&rod)).norm() < 1e-12);
        assert_eq!(d.domega, Vector3::zeros());
    }

    #[test]
    fn deployed_chute_adds_drag() {
        let mut fx = Fixture::new();
        let s = flying(Vector3::new(0.0, 0.0, -20.0));
        let before = fx.context(false).evaluate(&s).expect("deriv");
        fx.config.deploy(crate::sim::status::DeviceRef { stage: 0, index: 0 });
        let after = fx.context(false).evaluate(&s).expect("deriv");
        assert!(after.dvel.z > before.dvel.z + 1.0);
    }
}
