//! Utilities shared by the `numasim` binaries

// Modules
pub mod logger;
