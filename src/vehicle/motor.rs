use std::collections::BTreeMap;

// ---------------------------------------------------------------------------
// Motor with a tabulated thrust curve
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct Motor {
    pub designation: String,
    pub diameter: f64, // m
    pub length: f64,   // m
    /// `(time, thrust)` points, s and N, strictly increasing in time.
    pub thrust_curve: Vec<(f64, f64)>,
    pub propellant_mass: f64, // kg
    pub casing_mass: f64,     // kg
    /// Ejection charge fires this long after burnout.
    pub ejection_delay: Option<f64>,
}

impl Motor {
    /// Time from ignition to the last thrust point.
    pub fn burn_time(&self) -> f64 {
        self.thrust_curve.last().map(|&(t, _)| t).unwrap_or(0.0)
    }

    /// Thrust at `t` seconds after ignition, linearly interpolated; zero outside the curve.
    pub fn thrust_at(&self, t: f64) -> f64 {
        if t < 0.0 {
            return 0.0;
        }
        let mut prev = (0.0, 0.0);
        for &(tp, f) in &self.thrust_curve {
            if t <= tp {
                let span = tp - prev.0;
                if span <= 0.0 {
                    return f;
                }
                return prev.1 + (f - prev.1) * (t - prev.0) / span;
            }
            prev = (tp, f);
        }
        0.0
    }

    /// Impulse delivered from ignition up to `t`, N·s.
    pub fn impulse_until(&self, t: f64) -> f64 {
        if t <= 0.0 {
            return 0.0;
        }
        let mut total = 0.0;
        let mut prev = (0.0, 0.0);
        for &(tp, f) in &self.thrust_curve {
            if t <= tp {
                let f_t = self.thrust_at(t);
                return total + 0.5 * (prev.1 + f_t) * (t - prev.0);
            }
            total += 0.5 * (prev.1 + f) * (tp - prev.0);
            prev = (tp, f);
        }
        total
    }

    pub fn total_impulse(&self) -> f64 {
        self.impulse_until(self.burn_time())
    }

    pub fn average_thrust(&self) -> f64 {
        let bt = self.burn_time();
        if bt > 0.0 {
            self.total_impulse() / bt
        } else {
            0.0
        }
    }

    /// Propellant left `t` seconds after ignition.
    ///
    /// Burned propellant follows the delivered impulse. Never negative and
    /// exactly zero from burn time on.
    pub fn propellant_at(&self, t: f64) -> f64 {
        if t <= 0.0 {
            return self.propellant_mass;
        }
        if t >= self.burn_time() {
            return 0.0;
        }
        let total = self.total_impulse();
        if total <= 0.0 {
            return self.propellant_mass;
        }
        let burned = self.impulse_until(t) / total;
        (self.propellant_mass * (1.0 - burned)).clamp(0.0, self.propellant_mass)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.thrust_curve.is_empty() {
            return Err(format!("motor {} has an empty thrust curve", self.designation));
        }
        let mut last = 0.0;
        for &(t, f) in &self.thrust_curve {
            if !(t.is_finite() && f.is_finite()) || f < 0.0 || t < last {
                return Err(format!("motor {} has an invalid thrust curve", self.designation));
            }
            last = t;
        }
        if self.propellant_mass < 0.0 || self.casing_mass < 0.0 {
            return Err(format!("motor {} has negative mass", self.designation));
        }
        if self.length <= 0.0 || self.diameter <= 0.0 {
            return Err(format!("motor {} has invalid dimensions", self.designation));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Motor configuration: which motor sits in which stage
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct MotorMount {
    pub motor: Motor,
    /// Delay after the stage's ignition trigger (launch for the bottom stage,
    /// separation of the stage below otherwise).
    pub ignition_delay: f64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MotorConfiguration {
    pub name: Option<String>,
    pub mounts: BTreeMap<usize, MotorMount>,
}

impl MotorConfiguration {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_motor(mut self, stage: usize, motor: Motor, ignition_delay: f64) -> Self {
        self.mounts.insert(stage, MotorMount { motor, ignition_delay });
        self
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}
