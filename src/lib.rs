pub mod auth;
pub mod config;
pub mod core;
pub mod error;
pub mod events;
pub mod log;
pub mod orchestration;
pub mod pagination;
pub mod resolver;
pub mod state;
pub mod store;
pub mod validation;

pub use error::{Error, ErrorKind, Result};
pub use orchestration::{Orchestrator, Transaction, TxContext};
