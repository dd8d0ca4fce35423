//! Managed resources and their derived state

pub mod registry;
pub mod status;
