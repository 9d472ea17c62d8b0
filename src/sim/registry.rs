use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::aero::{AerodynamicCalculator, BarrowmanCalculator};
use crate::error::{ListenerError, SimulationError, StrategyKind};
use crate::mass::{BasicMassCalculator, MassCalculator};

use super::integrator::{EulerStepper, Rk4Stepper, Stepper};
use super::listener::{EventLogListener, SimulationListener, StopAtApogee};

pub type StepperFactory = Arc<dyn Fn() -> Box<dyn Stepper> + Send + Sync>;
pub type AerodynamicsFactory = Arc<dyn Fn() -> Box<dyn AerodynamicCalculator> + Send + Sync>;
pub type MassFactory = Arc<dyn Fn() -> Box<dyn MassCalculator> + Send + Sync>;
pub type ListenerFactory =
    Arc<dyn Fn() -> Result<Box<dyn SimulationListener>, ListenerError> + Send + Sync>;

/// Identifiers of the strategies one run uses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StrategySelection {
    pub stepper: String,
    pub aerodynamics: String,
    pub mass: String,
}

impl Default for StrategySelection {
    fn default() -> Self {
        Self {
            stepper: "rk4".into(),
            aerodynamics: "barrowman".into(),
            mass: "basic".into(),
        }
    }
}

/// Maps stable identifiers to factories. All lookups happen before a run starts.
#[derive(Clone, Default)]
pub struct Registry {
    steppers: BTreeMap<String, StepperFactory>,
    aerodynamics: BTreeMap<String, AerodynamicsFactory>,
    mass: BTreeMap<String, MassFactory>,
    listeners: BTreeMap<String, ListenerFactory>,
}

impl Registry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// The reference implementations plus the built-in listeners.
    pub fn with_defaults() -> Self {
        let mut r = Self::new();
        r.register_stepper("rk4", || Box::new(Rk4Stepper));
        r.register_stepper("euler", || Box::new(EulerStepper));
        r.register_aerodynamics("barrowman", || Box::new(BarrowmanCalculator::new()));
        r.register_mass("basic", || Box::new(BasicMassCalculator::new()));
        r.register_listener("log-events", || Ok(Box::new(EventLogListener)));
        r.register_listener("stop-at-apogee", || Ok(Box::new(StopAtApogee)));
        r
    }

    pub fn register_stepper<F>(&mut self, id: impl Into<String>, factory: F)
    where
        F: Fn() -> Box<dyn Stepper> + Send + Sync + 'static,
    {
        self.steppers.insert(id.into(), Arc::new(factory));
    }

    pub fn register_aerodynamics<F>(&mut self, id: impl Into<String>, factory: F)
    where
        F: Fn() -> Box<dyn AerodynamicCalculator> + Send + Sync + 'static,
    {
        self.aerodynamics.insert(id.into(), Arc::new(factory));
    }

    pub fn register_mass<F>(&mut self, id: impl Into<String>, factory: F)
    where
        F: Fn() -> Box<dyn MassCalculator> + Send + Sync + 'static,
    {
        self.mass.insert(id.into(), Arc::new(factory));
    }

    pub fn register_listener<F>(&mut self, id: impl Into<String>, factory: F)
    where
        F: Fn() -> Result<Box<dyn SimulationListener>, ListenerError> + Send + Sync + 'static,
    {
        self.listeners.insert(id.into(), Arc::new(factory));
    }

    fn unknown(kind: StrategyKind, id: &str) -> SimulationError {
        SimulationError::UnknownStrategy { kind, id: id.to_string() }
    }

    pub fn stepper(&self, id: &str) -> Result<Box<dyn Stepper>, SimulationError> {
        self.steppers
            .get(id)
            .map(|f| f())
            .ok_or_else(|| Self::unknown(StrategyKind::Stepper, id))
    }

    pub fn aerodynamics(&self, id: &str) -> Result<Box<dyn AerodynamicCalculator>, SimulationError> {
        self.aerodynamics
            .get(id)
            .map(|f| f())
            .ok_or_else(|| Self::unknown(StrategyKind::AerodynamicCalculator, id))
    }

    pub fn mass(&self, id: &str) -> Result<Box<dyn MassCalculator>, SimulationError> {
        self.mass
            .get(id)
            .map(|f| f())
            .ok_or_else(|| Self::unknown(StrategyKind::MassCalculator, id))
    }

    pub fn listener(&self, id: &str) -> Result<Box<dyn SimulationListener>, SimulationError> {
        let factory = self
            .listeners
            .get(id)
            .ok_or_else(|| Self::unknown(StrategyKind::Listener, id))?;
        factory().map_err(|source| SimulationError::ListenerInstantiation { id: id.to_string(), source })
    }

    /// Instantiate every listener or none.
    pub fn listeners(&self, ids: &[String]) -> Result<Vec<Box<dyn SimulationListener>>, SimulationError> {
        ids.iter().map(|id| self.listener(id)).collect()
    }

    pub fn stepper_ids(&self) -> impl Iterator<Item = &str> {
        self.steppers.keys().map(String::as_str)
    }

    pub fn listener_ids(&self) -> impl Iterator<Item = &str> {
        self.listeners.keys().map(String::as_str)
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("steppers", &self.steppers.keys().collect::<Vec<_>>())
            .field("aerodynamics", &self.aerodynamics.keys().collect::<Vec<_>>())
            .field("mass", &self.mass.keys().collect::<Vec<_>>())
            .field("listeners", &self.listeners.keys().collect::<Vec<_>>())
            .finish()
    }
}
