//! Caller authentication

pub mod token;
