//! Client SDK over the VoxLink native voice module.
//!
//! The native module does all connection and voice handling; this crate
//! binds its C entry points (resolved once at startup into a fixed call
//! table) and exposes an object model on top: [`connection::Connection`],
//! [`event::Channel`], [`event::Client`], and an [`event::Event`] stream
//! delivered over a tokio channel. Native callbacks arrive on the module's
//! own threads and are marshaled into events without blocking.

pub mod api;
pub mod connection;
pub mod error;
pub mod event;

pub use api::NativeModule;
pub use connection::{ConnectConfig, Connection, Target, connect};
pub use error::SdkError;
pub use event::{Channel, Client, Event};
