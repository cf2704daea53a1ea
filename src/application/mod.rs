// Numeric pipeline: normalization through inference, with scoped buffer accounting
pub mod ml;

// Per-session request handling
pub mod prediction_service;
