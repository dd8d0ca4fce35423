//! Operation audit log and its live broadcast

pub mod channel;
pub mod log;
