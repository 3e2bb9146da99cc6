pub mod action;
pub mod auth;
pub mod cli;
pub mod commands;
pub mod config;
pub mod driver;
mod error;
pub mod juju;
pub mod kubeconfig;
pub mod manifest;
pub mod poll;
pub mod release;
#[cfg(test)]
mod testing;
pub mod utils;

pub use cli::{Cli, Commands};
pub use error::Error;
