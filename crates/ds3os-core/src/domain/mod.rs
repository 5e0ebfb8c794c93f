//! Domain entities for the DS3OS loader.
//!
//! Pure business logic with no infrastructure dependencies: no file system,
//! no sockets, no OS process APIs.  Code in the loader's application and
//! infrastructure layers depends on this module, never the other way round.
//!
//! - **`server`** – the [`server::ServerEntry`] entity and the import file format.
//! - **`registry`** – the [`registry::ServerRegistry`] that merges directory
//!   refreshes with manual imports.
//! - **`sort`** – list filtering and the smart/ascending/descending sort modes.
//! - **`address`** – picking public hostname, private hostname, or loopback.

pub mod address;
pub mod registry;
pub mod server;
pub mod sort;
