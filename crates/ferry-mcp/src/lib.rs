//! Remote tools over the Model Context Protocol.
//!
//! [`McpClientManager`] holds one client connection per configured server.
//! [`McpToolProvider`] merges their tool catalogs and routes each call to the
//! server that advertised the tool.

mod client;
mod handler;
mod provider;

pub use client::McpClientManager;
pub use handler::FerryClientHandler;
pub use provider::{McpToolProvider, NoRemoteTools};
