#![warn(clippy::all)]

pub mod chat;
pub mod cli;
pub mod config;
pub mod conversation;
pub mod error;
pub mod evolution;
pub mod gateway;
pub mod llm;
pub mod persona;
pub mod prompt;

pub use config::Config;
pub use error::{GeistError, Result};
