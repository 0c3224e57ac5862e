//! Domain layer for the static identity service plugin.

pub mod client;
pub mod service;

pub use service::Service;
