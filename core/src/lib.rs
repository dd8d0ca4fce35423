//! Dockhand Core Library
//!
//! Build and deployment orchestration across a fleet of periphery agents.

pub mod actions;
pub mod api;
pub mod app;
pub mod authn;
pub mod errors;
pub mod filesys;
pub mod logs;
pub mod models;
pub mod periphery;
pub mod permissions;
pub mod resources;
pub mod server;
pub mod storage;
pub mod updates;
pub mod utils;
pub mod workers;
