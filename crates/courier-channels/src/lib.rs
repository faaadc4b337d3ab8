//! # courier-channels
//!
//! Platform integrations for the courier relay.

pub mod dispatch;
pub mod telegram;
pub mod twilio;
