// Daily price history
pub mod market;

// Pipeline building blocks (normalization, windows, model spec, lifecycle)
pub mod ml;

// Forecast and chart output
pub mod prediction;

// Port interfaces
pub mod ports;

// Domain-specific error types
pub mod errors;
