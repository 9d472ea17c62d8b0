use std::fmt;

use thiserror::Error;

use crate::sim::flight_data::FlightData;

/// Failure of a physical model: a calculator or stepper produced something unusable.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ModelError {
    #[error("non-finite {quantity} at t={time:.4} s")]
    NonFinite { quantity: &'static str, time: f64 },
    #[error("{0}")]
    Invalid(String),
}

/// Failure raised by a listener hook or factory.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{message}")]
pub struct ListenerError {
    pub message: String,
}

impl ListenerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrategyKind {
    Stepper,
    AerodynamicCalculator,
    MassCalculator,
    Listener,
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StrategyKind::Stepper => "stepper",
            StrategyKind::AerodynamicCalculator => "aerodynamic calculator",
            StrategyKind::MassCalculator => "mass calculator",
            StrategyKind::Listener => "listener",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Caller or programmer error; retrying with the same input fails again.
    Configuration,
    /// The numerical model broke down; may succeed with adjusted parameters.
    PhysicalModel,
}

#[derive(Debug, Error)]
pub enum SimulationError {
    #[error("cannot simulate externally provided flight data")]
    ExternalData,

    #[error("no motor configuration selected")]
    NoMotorConfiguration,

    #[error("motor configuration {0:?} does not exist")]
    MissingMotorConfiguration(String),

    #[error("invalid conditions: {0}")]
    InvalidConditions(String),

    #[error("invalid rocket: {0}")]
    InvalidRocket(String),

    #[error("unknown {kind} {id:?}")]
    UnknownStrategy { kind: StrategyKind, id: String },

    #[error("listener {id:?} could not be instantiated: {source}")]
    ListenerInstantiation {
        id: String,
        #[source]
        source: ListenerError,
    },

    #[error("model failure at t={time:.4} s: {source}")]
    Model {
        time: f64,
        #[source]
        source: ModelError,
        partial: Box<FlightData>,
    },

    #[error("listener {listener} failed at t={time:.4} s: {source}")]
    Listener {
        listener: String,
        time: f64,
        #[source]
        source: ListenerError,
        partial: Box<FlightData>,
    },
}

impl SimulationError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            SimulationError::Model { .. } => ErrorCategory::PhysicalModel,
            _ => ErrorCategory::Configuration,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.category() == ErrorCategory::PhysicalModel
    }

    /// Flight data recorded up to the last completed step of a failed run.
    pub fn partial_data(&self) -> Option<&FlightData> {
        match self {
            SimulationError::Model { partial, .. } | SimulationError::Listener { partial, .. } => {
                Some(partial)
            }
            _ => None,
        }
    }
}
