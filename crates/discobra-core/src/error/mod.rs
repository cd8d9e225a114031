//! Domain errors - error types for the domain layer

mod model_error;

pub use model_error::ModelError;
