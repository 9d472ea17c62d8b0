pub mod component;
pub mod motor;
pub mod rocket;
pub mod stage;

pub use component::{BodyComponent, DeployTrigger, FinSet, NoseShape, RecoveryDevice};
pub use motor::{Motor, MotorConfiguration, MotorMount};
pub use rocket::{presets, Rocket, RocketBuilder};
pub use stage::{SeparationEvent, SeparationTrigger, Stage, StageBuilder};
