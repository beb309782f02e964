//! Library wrapper around the `asmref` CLI implementation.
//!
//! Compiling the binary crate root as a module lets `cargo test -p asmref-cli --lib`
//! typecheck the CLI without building the integration test binaries.

#[allow(dead_code)]
#[path = "main.rs"]
mod main_bin;
