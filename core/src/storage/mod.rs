//! Persistence: document collections, the on-disk layout and settings

pub mod collection;
pub mod journal;
pub mod json;
pub mod layout;
pub mod settings;
