//! # Chat Relay Server Library
//!
//! This library implements the central relay of a text chat service. Clients
//! connect over TCP, negotiate a display name, and then exchange public
//! messages (delivered to everyone, author included) and private messages
//! (delivered to the recipient and a copy to the author).
//!
//! ## Architecture
//!
//! ### Registry (`registry`)
//! The single source of truth for who is online: display name to connection,
//! guarded by one lock. A name is held by at most one live connection, and
//! membership snapshots are always consistent.
//!
//! ### Router (`router`)
//! Decides where each message goes and performs the sends. Dispatch is
//! serialized, so every client sees messages in the same relative order.
//! Membership changes are announced with a text notice followed by a fresh
//! user list. A connection whose send fails is evicted without disturbing
//! delivery to anyone else.
//!
//! ### Sessions (`session`)
//! One task per client. It reads the name negotiation frame, registers the
//! connection through the router, then decodes frames one at a time. Leave,
//! EOF, transport errors and malformed frames all end the session through the
//! same cleanup path, which runs once per connection even when the router has
//! already evicted it.
//!
//! ### Connections (`connection`)
//! A negotiated client: its name, its `Active -> Closing -> Closed` state, and
//! the outgoing queue drained by a dedicated writer task, so concurrent
//! senders never interleave frames on one socket.
//!
//! ### Listener (`listener`)
//! Binds the TCP socket and spawns a session per accepted client. Failing to
//! accept is the only fatal error.
//!
//! ## Wire Protocol
//!
//! Frames are length-prefixed bincode packets; see the `shared` crate.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::listener::Server;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let server = Server::new("127.0.0.1:12435").await?;
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

pub mod connection;
pub mod error;
pub mod listener;
pub mod registry;
pub mod router;
pub mod session;
