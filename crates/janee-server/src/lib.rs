// SPDX-License-Identifier: MIT OR Apache-2.0
//! janee-server
//!
//! The server side of the Janee credential broker: the MCP dispatch core,
//! the origin-pinned HTTP forwarder, the exec forwarder, and the transport
//! bindings behind the `janeed` binary.

#![deny(unsafe_code)]

/// Request-mediation engine and tool operations.
pub mod dispatch;
/// Whitelisted subprocess execution with credential scrubbing.
pub mod exec;
/// Origin-pinned outbound HTTP.
pub mod forward;
/// MCP tool schemas and handler.
pub mod mcp;
/// stdio and Streamable-HTTP transports.
pub mod transport;

pub use dispatch::{Dispatcher, DispatcherOptions, ExecParams, ExecuteParams, RevokeParams};
pub use mcp::JaneeMcpServer;
