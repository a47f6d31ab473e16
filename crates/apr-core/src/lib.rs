//! Core of the affiliate promo relay.
//!
//! Framework-agnostic: the chat platform lives behind [`messaging::port::MessagingPort`]
//! and is implemented in an adapter crate.

pub mod affiliate;
pub mod config;
pub mod delivery_log;
pub mod domain;
pub mod errors;
pub mod formatting;
pub mod gate;
pub mod links;
pub mod logging;
pub mod messaging;
pub mod pipeline;
pub mod resolver;
pub mod security;

pub use errors::{Error, Result};
