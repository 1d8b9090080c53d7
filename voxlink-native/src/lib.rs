//! Runtime loader for the VoxLink native client module.
//!
//! The native module (`voxclient`) is a pre-built shared library that
//! implements all connection and voice handling. This crate finds a suitable
//! binary for the host, opens it, and resolves the exported entry points the
//! SDK binds against:
//!
//! 1. [`platform::detect`] proposes an ordered list of candidate file names.
//! 2. [`loader::Library::open`] probes them in order; first success wins.
//! 3. [`loader::Library::symbol`] resolves each required entry point once,
//!    so the SDK can build its fixed call table at startup.
//! 4. Dropping (or explicitly closing) the [`loader::Library`] unloads the
//!    module.
//!
//! Everything here is synchronous and runs on the caller's thread; the
//! underlying platform calls are fast, local, and not cancellable.

pub mod error;
pub mod loader;
pub mod platform;

pub use error::NativeError;
pub use loader::Library;
pub use platform::{Detected, PlatformKind, detect};
