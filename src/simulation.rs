use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard};
use std::time::Instant;

use tracing::debug;

use crate::error::SimulationError;
use crate::sim::conditions::Conditions;
use crate::sim::engine::{SimulationEngine, SimulationSetup};
use crate::sim::flight_data::FlightData;
use crate::sim::listener::SimulationListener;
use crate::sim::registry::StrategySelection;
use crate::sim::warning::WarningSet;
use crate::vehicle::Rocket;

/// A rocket shared between the records that simulate it and whoever edits it.
pub type SharedRocket = Arc<RwLock<Rocket>>;

// ---------------------------------------------------------------------------
// Simulation record
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// Simulated in this session with the current rocket and conditions.
    UpToDate,
    /// Restored from storage; assumed current until something changes.
    Loaded,
    /// The rocket or the conditions changed since the last run.
    Outdated,
    /// Imported from another program. Cannot be re-simulated.
    External,
    NotSimulated,
}

/// A named simulation of one rocket: conditions, strategy choices and the last result.
///
/// The record never shares its conditions. [`Simulation::copy`] and
/// [`Simulation::duplicate_for_rocket`] deep-copy them, share nothing else but the
/// rocket handle (copy) or nothing at all (duplicate), and drop any result.
///
/// Calls to [`Simulation::simulate`] on one record must be serialized by the caller;
/// `&mut self` enforces this within safe code.
#[derive(Debug)]
pub struct Simulation {
    rocket: SharedRocket,
    name: String,
    status: Status,
    conditions: Conditions,
    listeners: Vec<String>,
    strategies: StrategySelection,

    simulated_conditions: Option<Conditions>,
    simulated_motors: Option<String>,
    simulated_revision: Option<u64>,
    simulated_data: Option<FlightData>,
}

fn read(rocket: &SharedRocket) -> RwLockReadGuard<'_, Rocket> {
    rocket.read().unwrap_or_else(PoisonError::into_inner)
}

impl Simulation {
    /// A fresh, unsimulated record using the rocket's default motor configuration.
    pub fn new(rocket: SharedRocket) -> Self {
        let mut conditions = Conditions::default();
        conditions.motor_configuration = read(&rocket).default_motor_configuration().map(str::to_string);
        Self {
            rocket,
            name: "Simulation".into(),
            status: Status::NotSimulated,
            conditions,
            listeners: vec![],
            strategies: StrategySelection::default(),
            simulated_conditions: None,
            simulated_motors: None,
            simulated_revision: None,
            simulated_data: None,
        }
    }

    /// Rebuild a record from storage.
    ///
    /// A stored `UpToDate` becomes `Loaded`, and anything without data becomes
    /// `NotSimulated`. A loaded record treats the current rocket and conditions as
    /// the ones it was simulated with.
    pub fn from_stored(
        rocket: SharedRocket,
        status: Status,
        name: impl Into<String>,
        conditions: Conditions,
        listeners: Vec<String>,
        data: Option<FlightData>,
    ) -> Self {
        let status = match (status, &data) {
            (Status::UpToDate, _) => Status::Loaded,
            (_, None) => Status::NotSimulated,
            (s, Some(_)) => s,
        };
        let mut sim = Self::new(rocket);
        sim.name = name.into();
        sim.status = status;
        sim.conditions = conditions;
        sim.listeners = listeners;

        if status != Status::NotSimulated {
            sim.simulated_data = data;
            if status == Status::Loaded {
                sim.simulated_conditions = Some(sim.conditions.clone());
                sim.simulated_revision = Some(read(&sim.rocket).revision());
            }
        }
        sim
    }

    pub fn rocket(&self) -> &SharedRocket {
        &self.rocket
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn conditions(&self) -> &Conditions {
        &self.conditions
    }

    /// Editing the conditions makes a simulated record read as outdated.
    pub fn conditions_mut(&mut self) -> &mut Conditions {
        &mut self.conditions
    }

    /// Registry ids of the listeners attached to every run.
    pub fn listeners(&self) -> &[String] {
        &self.listeners
    }

    pub fn listeners_mut(&mut self) -> &mut Vec<String> {
        &mut self.listeners
    }

    pub fn strategies(&self) -> &StrategySelection {
        &self.strategies
    }

    pub fn strategies_mut(&mut self) -> &mut StrategySelection {
        &mut self.strategies
    }

    /// The status as last set, without checking for staleness.
    pub fn stored_status(&self) -> Status {
        self.status
    }

    /// The current status. A simulated record whose rocket revision or conditions
    /// no longer match the last run reads as `Outdated`.
    pub fn status(&self) -> Status {
        match self.status {
            Status::UpToDate | Status::Loaded => {
                let revision = read(&self.rocket).revision();
                let same_conditions = self.simulated_conditions.as_ref() == Some(&self.conditions);
                if self.simulated_revision != Some(revision) || !same_conditions {
                    Status::Outdated
                } else {
                    self.status
                }
            }
            other => other,
        }
    }

    /// Run the engine on a snapshot of the rocket and the conditions.
    ///
    /// On failure the record is left exactly as it was.
    pub fn simulate(
        &mut self,
        engine: &SimulationEngine,
        extra: Vec<Box<dyn SimulationListener>>,
    ) -> Result<&FlightData, SimulationError> {
        if self.status == Status::External {
            return Err(SimulationError::ExternalData);
        }

        let rocket = read(&self.rocket).clone();
        let revision = rocket.revision();
        let motors = self
            .conditions
            .motor_configuration
            .as_deref()
            .and_then(|id| rocket.motor_configuration_description(id));
        let setup = SimulationSetup {
            rocket: Arc::new(rocket),
            conditions: self.conditions.clone(),
            strategies: self.strategies.clone(),
            listeners: self.listeners.clone(),
        };

        debug!(simulation = %self.name, "calling simulation engine");
        let started = Instant::now();
        let data = engine.simulate(&setup, extra)?;
        debug!(
            simulation = %self.name,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "simulation engine returned"
        );

        self.simulated_conditions = Some(setup.conditions);
        self.simulated_motors = motors;
        self.simulated_revision = Some(revision);
        self.status = Status::UpToDate;
        let data: &FlightData = self.simulated_data.insert(data);
        Ok(data)
    }

    /// Conditions of the last successful run.
    pub fn simulated_conditions(&self) -> Option<&Conditions> {
        self.simulated_conditions.as_ref()
    }

    pub fn simulated_warnings(&self) -> Option<&WarningSet> {
        self.simulated_data.as_ref().map(FlightData::warnings)
    }

    pub fn simulated_motor_description(&self) -> Option<&str> {
        self.simulated_motors.as_deref()
    }

    pub fn simulated_data(&self) -> Option<&FlightData> {
        self.simulated_data.as_ref()
    }

    /// Same rocket, copied conditions and settings, no result.
    pub fn copy(&self) -> Self {
        Self {
            rocket: Arc::clone(&self.rocket),
            name: self.name.clone(),
            status: Status::NotSimulated,
            conditions: self.conditions.clone(),
            listeners: self.listeners.clone(),
            strategies: self.strategies.clone(),
            simulated_conditions: None,
            simulated_motors: None,
            simulated_revision: None,
            simulated_data: None,
        }
    }

    /// An unsimulated record for `rocket` with this record's name, conditions,
    /// listeners and strategy selection.
    pub fn duplicate_for_rocket(&self, rocket: SharedRocket) -> Self {
        let mut copy = Self::new(rocket);
        copy.name = self.name.clone();
        copy.conditions.copy_from(&self.conditions);
        copy.listeners = self.listeners.clone();
        copy.strategies = self.strategies.clone();
        copy
    }
}
