//! Command handlers

pub mod config;
pub mod document;
pub mod maintenance;
pub mod status;
pub mod sync;
