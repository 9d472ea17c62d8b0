pub mod aero;
pub mod dynamics;
pub mod error;
pub mod mass;
pub mod math;
pub mod physics;
pub mod sim;
pub mod simulation;
pub mod vehicle;

pub use error::{ErrorCategory, ListenerError, ModelError, SimulationError};
pub use sim::{Conditions, FlightData, SimulationEngine, SimulationListener, SimulationSetup};
pub use simulation::{SharedRocket, Simulation, Status};
pub use vehicle::{presets, Rocket};
