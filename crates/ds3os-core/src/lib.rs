//! # ds3os-core
//!
//! Shared library for the DS3OS loader containing the server registry, the
//! network-aware address resolver, and the connection descriptor codec.
//!
//! It has zero dependencies on OS APIs, UI frameworks, or network sockets.
//!
//! # Architecture overview
//!
//! The loader lets a player start the game pointed at a community-run server
//! instead of the official one.  Doing that takes three pieces of logic that
//! live in this crate:
//!
//! - **`domain::registry`** – The list of known servers.  Directory refreshes
//!   and the user's own imports are merged into one deduplicated list that
//!   the UI can filter and sort.
//!
//! - **`domain::address`** – Which hostname the game should actually dial:
//!   the public one, the server's LAN hostname, or loopback.
//!
//! - **`descriptor`** – The encrypted, fixed-size block describing the
//!   connection target that gets written into the game's memory.
//!
//! Process creation and the memory write itself belong to the loader crate.

pub mod descriptor;
pub mod domain;

pub use descriptor::{DescriptorCipher, DescriptorCodec, DescriptorError};
pub use domain::address::{
    resolve_connection_hostname, HostLookup, MachineAddresses, StaticHostLookup,
    LOOPBACK_HOSTNAME,
};
pub use domain::registry::{MergeSummary, RegistryError, ServerRegistry};
pub use domain::server::{export_import, parse_import, ImportError, ServerBadge, ServerEntry};
pub use domain::sort::{ServerFilter, ServerSorter, SortColumn, SortOrder};
