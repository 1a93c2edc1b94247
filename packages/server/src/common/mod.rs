pub mod errors;
pub mod sanitize;

pub use errors::ApiError;
