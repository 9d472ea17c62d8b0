pub mod conditions;
pub mod engine;
pub mod event;
pub mod flight_data;
pub mod integrator;
pub mod listener;
pub mod registry;
pub mod status;
pub mod warning;

pub use conditions::Conditions;
pub use engine::{SimulationEngine, SimulationSetup};
pub use event::{EventQueue, EventSource, FlightEvent, FlightEventKind};
pub use flight_data::{FlightData, FlightDataBranch, FlightSnapshot, FlightSummary, Sample, TerminationReason};
pub use integrator::{EulerStepper, Rk4Stepper, StepOutcome, Stepper};
pub use listener::{HookResult, SimulationListener};
pub use registry::{Registry, StrategySelection};
pub use status::{FlightConfiguration, SimulationStatus};
pub use warning::{Warning, WarningKind, WarningSet};
