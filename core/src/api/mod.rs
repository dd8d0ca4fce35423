//! Inbound API operations, independent of the transport

pub mod execute;
pub mod read;
pub mod write;
