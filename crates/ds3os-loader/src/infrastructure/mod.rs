//! Infrastructure layer for the loader.
//!
//! Contains OS-facing adapters: process creation and patching, the master
//! directory client seam, executable recognition, name resolution, and
//! file-system storage.
//!
//! **Dependency rule**: this layer may depend on `ds3os_core`, but MUST NOT
//! import the `application` layer.

pub mod master_server;
pub mod network;
pub mod process;
pub mod recognizer;
pub mod storage;
