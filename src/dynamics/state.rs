use nalgebra::{Quaternion, UnitQuaternion, Vector3};

// ---------------------------------------------------------------------------
// Kinematic state: position, velocity, attitude, angular rate
// ---------------------------------------------------------------------------

/// Rigid-body state in the inertial East-North-Up frame, origin at the rod base.
#[derive(Debug, Clone, PartialEq)]
pub struct State {
    pub time: f64,                 // s since launch
    pub pos: Vector3<f64>,         // m
    pub vel: Vector3<f64>,         // m/s
    pub quat: UnitQuaternion<f64>, // body→inertial rotation, body +Z is the nose
    pub omega: Vector3<f64>,       // rad/s, inertial frame
}

impl State {
    /// At rest on the pad, nose pointing along `orientation`.
    pub fn at_rest(orientation: UnitQuaternion<f64>) -> Self {
        Self {
            time: 0.0,
            pos: Vector3::zeros(),
            vel: Vector3::zeros(),
            quat: orientation,
            omega: Vector3::zeros(),
        }
    }

    /// Advance by a derivative scaled by dt (Euler substep, also used inside RK4).
    pub fn apply(&self, d: &Deriv, dt: f64) -> State {
        let q_raw = self.quat.quaternion() + d.dquat * dt;
        State {
            time: self.time + dt,
            pos: self.pos + d.dpos * dt,
            vel: self.vel + d.dvel * dt,
            quat: UnitQuaternion::new_normalize(q_raw),
            omega: self.omega + d.domega * dt,
        }
    }

    /// Height above the launch site, m.
    pub fn altitude(&self) -> f64 {
        self.pos.z
    }

    pub fn vertical_speed(&self) -> f64 {
        self.vel.z
    }

    /// Body Z-axis (nose direction) in the inertial frame.
    pub fn body_axis(&self) -> Vector3<f64> {
        self.quat * Vector3::z()
    }

    pub fn is_finite(&self) -> bool {
        let q = self.quat.quaternion();
        self.time.is_finite()
            && self.pos.iter().all(|v| v.is_finite())
            && self.vel.iter().all(|v| v.is_finite())
            && self.omega.iter().all(|v| v.is_finite())
            && [q.w, q.i, q.j, q.k].iter().all(|v| v.is_finite())
    }
}

// ---------------------------------------------------------------------------
// State derivative
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct Deriv {
    pub dpos: Vector3<f64>,
    pub dvel: Vector3<f64>,
    pub dquat: Quaternion<f64>, // raw quaternion rate, not unit
    pub domega: Vector3<f64>,   // inertial frame
}

impl Deriv {
    pub fn zero() -> Self {
        Self {
            dpos: Vector3::zeros(),
            dvel: Vector3::zeros(),
            dquat: Quaternion::new(0.0, 0.0, 0.0, 0.0),
            domega: Vector3::zeros(),
        }
    }

    /// Classical RK4 blend: (k1 + 2·k2 + 2·k3 + k4) / 6.
    pub fn rk4_blend(k1: &Deriv, k2: &Deriv, k3: &Deriv, k4: &Deriv) -> Deriv {
        Deriv {
            dpos: (k1.dpos + 2.0 * k2.dpos + 2.0 * k3.dpos + k4.dpos) / 6.0,
            dvel: (k1.dvel + 2.0 * k2.dvel + 2.0 * k3.dvel + k4.dvel) / 6.0,
            dquat: (k1.dquat + k2.dquat * 2.0 + k3.dquat * 2.0 + k4.dquat) * (1.0 / 6.0),
            domega: (k1.domega + 2.0 * k2.domega + 2.0 * k3.domega + k4.domega) / 6.0,
        }
    }
}
