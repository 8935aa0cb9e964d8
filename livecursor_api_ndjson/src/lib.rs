//! Newline-delimited JSON over TCP.
//!
//! [`NdjsonServer`] exposes a [`MemorySource`](livecursor_proto::MemorySource)
//! and [`NdjsonTransport`] subscribes to it as a
//! [`LiveTransport`](livecursor_proto::LiveTransport).

mod client;
mod server;
mod stream;
mod wire;

pub use client::NdjsonTransport;
pub use server::NdjsonServer;
pub use stream::TerminatingStream;
