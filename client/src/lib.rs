//! # Chat Client Library
//!
//! Client-side access to the chat relay, for front-ends that want to show a
//! chat log and a user list without speaking the wire protocol themselves.
//!
//! A front-end calls [`ChatClient::connect`] with a display name, then drives
//! the returned handle (`send_public`, `send_private`, `leave`) while
//! consuming the ordered stream of [`ClientEvent`]s. The relay echoes the
//! author's own public and private messages back as ordinary chat lines, so
//! a front-end does not need a local echo.
//!
//! Choosing a new name after a `Rejected` event is left to the front-end:
//! the relay closes the connection, and the front-end connects again.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use client::{ChatClient, ClientEvent};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let (mut chat, mut events) = ChatClient::connect("127.0.0.1:12435", "alice").await?;
//!     chat.send_public("hi").await?;
//!
//!     while let Some(event) = events.recv().await {
//!         match event {
//!             ClientEvent::ChatLine(line) => println!("{}", line),
//!             ClientEvent::Disconnected => break,
//!             _ => {}
//!         }
//!     }
//!     Ok(())
//! }
//! ```

pub mod network;

pub use network::{ChatClient, ClientError, ClientEvent};
