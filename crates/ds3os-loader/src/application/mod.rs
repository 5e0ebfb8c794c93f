//! Application layer use cases for the loader.
//!
//! Use cases in this layer orchestrate domain objects from `ds3os_core` and
//! depend on infrastructure only through traits, so every path can be unit
//! tested with mocks.
//!
//! # Sub-modules
//!
//! - **`launch`**  – The launch pipeline: acquire the server key, work out
//!   which hostname to dial, build the connection descriptor, then create the
//!   game suspended, patch it, and resume it.
//!
//! - **`session`** – The foreground owner of the server list and the
//!   pipeline.  Directory refreshes and address resolution run in the
//!   background and report back through tickets so stale answers are
//!   discarded.

pub mod launch;
pub mod session;

/// Coarse classification of every failure the loader reports to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// The executable or settings are wrong; nothing was attempted.
    Configuration,
    /// The directory or name resolution did not answer.
    Network,
    /// The connection descriptor could not be built.
    Encoding,
    /// The OS refused to create, patch, or resume the game.
    Process,
    /// The requested change to the server list is invalid.
    Data,
}
