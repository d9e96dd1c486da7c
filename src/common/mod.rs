//! Common types, errors and traits shared across the crate

pub mod channels;
pub mod clock;
pub mod errors;
pub mod timestamp;
pub mod traits;
pub mod types;
