//! vanilla-vault - integrity checks, backups and restores for Mass Effect trilogy installs
//!
//! Knows what every shipped file of each title looks like, refuses to back
//! up anything that isn't exactly that, and puts a live installation back
//! the way it was.

pub mod backup;
pub mod catalog;
pub mod config;
pub mod context;
pub mod copy;
pub mod games;
pub mod hash;
pub mod host;
pub mod installation;
pub mod manifest;
pub mod operation;
pub mod paths;
pub mod platform;
pub mod restore;
pub mod validate;

#[cfg(test)]
mod testutil;

pub use context::Vault;
pub use games::Game;
