//! LakeChat: chat and data-lake service clients.
//!
//! The crate is organised around two building blocks: [`job`], a generic
//! poller for submit-then-poll remote jobs, and [`session`], an advisory
//! keyed lock over shared conversation state. The service clients
//! ([`chat`], [`query`], [`discovery`], [`extract`]) are built on top of
//! them.

pub mod chat;
pub mod config;
pub mod discovery;
pub mod error;
pub mod extract;
pub mod job;
pub mod query;
pub mod session;

pub use error::{Error, Result};
