//! A negotiated client connection as seen by the rest of the relay
//!
//! The transport itself is owned by the session task; everything else talks to
//! a connection through its outgoing queue, which a single writer task drains.
//! That keeps frames from different senders from interleaving on the socket.
//!
//! The queue is bounded. A client that stops reading while staying connected
//! fills it up, and the next send fails just like a send to a broken
//! transport, so the router evicts it.

use crate::error::ChatError;
use shared::Packet;
use std::net::SocketAddr;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch};

/// Packets a connection may have waiting for its writer before it counts as gone
pub const OUTBOUND_QUEUE_LEN: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Active,
    Closing,
    Closed,
}

#[derive(Debug)]
pub struct Connection {
    name: String,
    addr: SocketAddr,
    state: watch::Sender<ConnectionState>,
    outbound: mpsc::Sender<Packet>,
}

impl Connection {
    /// Creates an active connection whose outgoing packets go to `outbound`
    pub fn new(name: String, addr: SocketAddr, outbound: mpsc::Sender<Packet>) -> Self {
        let (state, _) = watch::channel(ConnectionState::Active);
        Self {
            name,
            addr,
            state,
            outbound,
        }
    }

    /// Negotiated display name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Remote address of the client
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Current lifecycle state
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// True while the connection may still be sent to
    pub fn is_active(&self) -> bool {
        self.state() == ConnectionState::Active
    }

    /// Queues a packet for the writer task.
    ///
    /// Fails once the connection has left `Active`, its writer has gone away
    /// (the transport broke) or its queue is full. Callers treat all three as
    /// a peer disconnect.
    pub fn send(&self, packet: Packet) -> Result<(), ChatError> {
        if !self.is_active() {
            return Err(self.disconnected());
        }
        self.outbound.try_send(packet).map_err(|e| match e {
            TrySendError::Full(_) => ChatError::Backlogged {
                name: self.name.clone(),
            },
            TrySendError::Closed(_) => self.disconnected(),
        })
    }

    /// Moves `Active -> Closing`. Only the first caller gets `true`; that
    /// caller owns cleanup for this connection.
    pub fn begin_close(&self) -> bool {
        self.state.send_if_modified(|state| {
            if *state == ConnectionState::Active {
                *state = ConnectionState::Closing;
                true
            } else {
                false
            }
        })
    }

    /// Final state, set by the session once its socket is gone
    pub fn mark_closed(&self) {
        self.state.send_replace(ConnectionState::Closed);
    }

    /// Resolves once the connection has left `Active`, whoever moved it.
    pub async fn closing(&self) {
        let mut rx = self.state.subscribe();
        // The sender lives in `self`, so the channel cannot close under us.
        let _ = rx.wait_for(|state| *state != ConnectionState::Active).await;
    }

    fn disconnected(&self) -> ChatError {
        ChatError::PeerDisconnected {
            name: self.name.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    fn test_addr() -> SocketAddr {
        "127.0.0.1:8080".parse().unwrap()
    }

    fn test_connection(name: &str) -> (Connection, mpsc::Receiver<Packet>) {
        let (tx, rx) = mpsc::channel(OUTBOUND_QUEUE_LEN);
        (Connection::new(name.to_string(), test_addr(), tx), rx)
    }

    #[test]
    fn test_connection_creation() {
        let (conn, _rx) = test_connection("alice");

        assert_eq!(conn.name(), "alice");
        assert_eq!(conn.addr(), test_addr());
        assert_eq!(conn.state(), ConnectionState::Active);
    }

    #[test]
    fn test_send_queues_packet() {
        let (conn, mut rx) = test_connection("alice");

        conn.send(Packet::Chat {
            line: "hello".to_string(),
        })
        .unwrap();

        assert_eq!(
            rx.try_recv().unwrap(),
            Packet::Chat {
                line: "hello".to_string()
            }
        );
    }

    #[test]
    fn test_send_fails_when_writer_gone() {
        let (conn, rx) = test_connection("alice");
        drop(rx);

        let err = conn.send(Packet::Leave).unwrap_err();
        assert!(matches!(err, ChatError::PeerDisconnected { name } if name == "alice"));
    }

    #[test]
    fn test_send_fails_when_queue_full() {
        let (tx, mut rx) = mpsc::channel(2);
        let conn = Connection::new("alice".to_string(), test_addr(), tx);

        conn.send(Packet::Leave).unwrap();
        conn.send(Packet::Leave).unwrap();
        let err = conn.send(Packet::Leave).unwrap_err();
        assert!(matches!(err, ChatError::Backlogged { name } if name == "alice"));

        rx.try_recv().unwrap();
        assert!(conn.send(Packet::Leave).is_ok());
    }

    #[test]
    fn test_send_fails_after_close_begins() {
        let (conn, mut rx) = test_connection("alice");
        assert!(conn.begin_close());

        assert!(conn.send(Packet::Leave).is_err());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_begin_close_only_once() {
        let (conn, _rx) = test_connection("alice");

        assert!(conn.begin_close());
        assert!(!conn.begin_close());
        assert_eq!(conn.state(), ConnectionState::Closing);

        conn.mark_closed();
        assert!(!conn.begin_close());
        assert_eq!(conn.state(), ConnectionState::Closed);
    }

    #[test]
    fn test_begin_close_races_have_one_winner() {
        let (conn, _rx) = test_connection("alice");
        let conn = Arc::new(conn);

        let winners: usize = (0..8)
            .map(|_| {
                let conn = Arc::clone(&conn);
                std::thread::spawn(move || conn.begin_close())
            })
            .collect::<Vec<_>>()
            .into_iter()
            .map(|handle| handle.join().unwrap() as usize)
            .sum();

        assert_eq!(winners, 1);
    }

    #[tokio::test]
    async fn test_closing_wakes_on_eviction() {
        let (conn, _rx) = test_connection("alice");
        let conn = Arc::new(conn);

        let waiter = {
            let conn = Arc::clone(&conn);
            tokio::spawn(async move { conn.closing().await })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!waiter.is_finished());

        conn.begin_close();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("closing() did not resolve")
            .unwrap();
    }

    #[tokio::test]
    async fn test_closing_resolves_immediately_when_already_closed() {
        let (conn, _rx) = test_connection("alice");
        conn.begin_close();
        conn.mark_closed();

        tokio::time::timeout(Duration::from_secs(1), conn.closing())
            .await
            .expect("closing() did not resolve");
    }
}
