//! Turns host window queries into observations and decides which of them are worth a row.

pub mod change;
pub mod sampler;
