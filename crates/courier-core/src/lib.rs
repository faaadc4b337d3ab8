//! # courier-core
//!
//! Core types, traits, configuration, and error handling for the courier relay.

pub mod config;
pub mod error;
pub mod filter;
pub mod message;
pub mod traits;
