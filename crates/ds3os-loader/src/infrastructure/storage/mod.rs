//! Storage infrastructure: configuration and server import files.
//!
//! - `config` reads and writes the TOML configuration file from the
//!   platform-appropriate directory, with defaults on first run.
//! - `import` loads the `.ds3osconfig` files server operators hand out.

pub mod config;
pub mod import;
