pub mod derivatives;
pub mod state;

pub use derivatives::DerivativeContext;
pub use state::{Deriv, State};
