//! Utilities shared by asmref tests.
//!
//! [`AssemblyBuilder`] writes small but structurally valid PE32/CLI images so
//! the metadata reader and the resolvers can be exercised against real files
//! instead of mocks. [`EnvVarGuard`] serializes and restores process
//! environment mutations.

pub mod assembly;
pub mod env;

pub use assembly::AssemblyBuilder;
pub use env::{env_lock, EnvVarGuard};
