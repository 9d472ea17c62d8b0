use crate::dynamics::state::{Deriv, State};
use crate::error::ModelError;

// ---------------------------------------------------------------------------
// Integration steppers
// ---------------------------------------------------------------------------

/// The derivative function handed to a stepper.
pub type DerivativeFn<'a> = dyn Fn(&State) -> Result<Deriv, ModelError> + 'a;

#[derive(Debug, Clone, PartialEq)]
pub struct StepOutcome {
    pub state: State,
    /// Position difference against a lower-order solution over the same step, m.
    pub error_estimate: f64,
}

/// Advances the state by one caller-chosen step.
///
/// Steppers hold no state between calls and may be shared between runs.
pub trait Stepper: Send + Sync {
    fn name(&self) -> &str;

    fn step(&self, state: &State, f: &DerivativeFn<'_>, dt: f64) -> Result<StepOutcome, ModelError>;
}

/// Classical fourth-order Runge-Kutta.
#[derive(Debug, Clone, Copy, Default)]
pub struct Rk4Stepper;

impl Stepper for Rk4Stepper {
    fn name(&self) -> &str {
        "rk4"
    }

    fn step(&self, state: &State, f: &DerivativeFn<'_>, dt: f64) -> Result<StepOutcome, ModelError> {
        let k1 = f(state)?;
        let k2 = f(&state.apply(&k1, dt * 0.5))?;
        let k3 = f(&state.apply(&k2, dt * 0.5))?;
        let k4 = f(&state.apply(&k3, dt))?;

        let next = state.apply(&Deriv::rk4_blend(&k1, &k2, &k3, &k4), dt);
        // k2 alone over the full step is the explicit midpoint method.
        let midpoint = state.apply(&k2, dt);
        Ok(StepOutcome {
            error_estimate: (next.pos - midpoint.pos).norm(),
            state: next,
        })
    }
}

/// Forward Euler, first order. Mostly useful as a baseline.
#[derive(Debug, Clone, Copy, Default)]
pub struct EulerStepper;

impl Stepper for EulerStepper {
    fn name(&self) -> &str {
        "euler"
    }

    fn step(&self, state: &State, f: &DerivativeFn<'_>, dt: f64) -> Result<StepOutcome, ModelError> {
        let k1 = f(state)?;
        let next = state.apply(&k1, dt);
        // Half the position change between the start and end slopes (Heun).
        let k2 = f(&next)?;
        let error_estimate = 0.5 * dt * (k2.dpos - k1.dpos).norm();
        Ok(StepOutcome { state: next, error_estimate })
    }
}
