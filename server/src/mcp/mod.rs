//! JSON-RPC tool server
//!
//! Exposes listing search to tool-using clients over newline-delimited
//! JSON-RPC 2.0 on stdin/stdout.
//!
//! ```bash
//! listing-server --dataset listings.jsonl --artifacts artifacts serve
//! ```

pub mod protocol;
pub mod server;
pub mod tools;
pub mod transport;

pub use protocol::*;
pub use server::McpServer;
