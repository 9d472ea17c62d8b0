pub mod atmosphere;
pub mod gravity;
pub mod wind;

pub use atmosphere::{isa, Atmosphere};
pub use wind::{ConstantWind, PinkNoiseWind, WindModel};
