//! Command handlers

pub mod config;
pub mod entry;
pub mod links;
pub mod search;
