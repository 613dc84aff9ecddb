//! Message routing for the chat relay
//!
//! The router turns decoded envelopes into sends: every registered connection
//! for a broadcast, the recipient plus the sender for a private message, the
//! sender alone when the recipient is offline. It also announces membership
//! changes, each one as a text notice followed by a fresh user list.
//!
//! Dispatch is serialized by a single mutex. Sends only enqueue onto each
//! connection's outgoing queue, so holding the mutex across a fan-out is
//! cheap. It also means every connection sees dispatched messages in the
//! same relative order.
//!
//! A failed send means the connection's writer is gone. The router evicts
//! that connection (removes it, announces the departure, pushes the user
//! list) and keeps delivering to everyone else.

use crate::connection::Connection;
use crate::error::ChatError;
use crate::registry::Registry;
use log::{debug, info, warn};
use shared::{
    broadcast_line, not_found_notice, private_line, Packet, MAX_BODY_LEN, MAX_NAME_BYTES,
};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Where an envelope goes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    Broadcast,
    Direct { recipient: String },
}

/// One chat message on its way through the router
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub sender: String,
    pub route: Route,
    pub body: String,
}

impl Envelope {
    /// A message for everyone online
    pub fn broadcast(sender: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            sender: sender.into(),
            route: Route::Broadcast,
            body: body.into(),
        }
    }

    /// A private message for `recipient`
    pub fn direct(
        sender: impl Into<String>,
        recipient: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            sender: sender.into(),
            route: Route::Direct {
                recipient: recipient.into(),
            },
            body: body.into(),
        }
    }

    /// Builds an envelope from a chat packet received on `sender`'s connection.
    ///
    /// The sender is always the negotiated name, never anything the client
    /// put in the packet. Packets that are not chat messages, bodies over
    /// [`MAX_BODY_LEN`] bytes and recipients longer than any valid name are
    /// malformed: relaying them could produce a line too large to frame.
    pub fn from_packet(sender: &str, packet: Packet) -> Result<Self, ChatError> {
        let envelope = match packet {
            Packet::Public { body } => Self::broadcast(sender, body),
            Packet::Private { recipient, body } => {
                if recipient.len() > MAX_NAME_BYTES {
                    return Err(malformed(format!(
                        "recipient name of {} bytes",
                        recipient.len()
                    )));
                }
                Self::direct(sender, recipient, body)
            }
            _ => return Err(malformed("not a chat message".to_string())),
        };

        if envelope.body.len() > MAX_BODY_LEN {
            return Err(malformed(format!(
                "body of {} bytes exceeds {}",
                envelope.body.len(),
                MAX_BODY_LEN
            )));
        }
        Ok(envelope)
    }
}

fn malformed(message: String) -> ChatError {
    ChatError::MalformedFrame { message }
}

/// Why a connection left the registry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Departure {
    /// The client sent the leave frame
    Left,
    /// The transport failed, a frame was malformed, or a send failed
    Dropped,
}

impl Departure {
    fn notice(self, name: &str) -> String {
        match self {
            Departure::Left => format!("{} has left the chat.", name),
            Departure::Dropped => format!("{} left the chat!", name),
        }
    }
}

/// Delivers envelopes and membership announcements to registered connections
pub struct Router {
    registry: Arc<Registry>,
    dispatch_lock: Mutex<()>,
}

impl Router {
    /// Creates a router delivering to the connections in `registry`
    pub fn new(registry: Arc<Registry>) -> Self {
        Self {
            registry,
            dispatch_lock: Mutex::new(()),
        }
    }

    /// The registry this router delivers to
    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Registers a freshly negotiated connection and announces it.
    ///
    /// The new client receives its welcome before anything else, then
    /// everyone (newcomer included) gets the arrival notice and the new
    /// user list.
    pub async fn join(&self, connection: Arc<Connection>) -> Result<(), ChatError> {
        let _guard = self.dispatch_lock.lock().await;

        let name = connection.name().to_string();
        self.registry.add(&name, Arc::clone(&connection)).await?;
        info!("{} joined from {}", name, connection.addr());

        let mut failed = Vec::new();
        if connection
            .send(Packet::Welcome { name: name.clone() })
            .is_err()
        {
            failed.push(Arc::clone(&connection));
        }
        failed.extend(
            self.fan_out(Packet::Chat {
                line: format!("{} joined the chat!", name),
            })
            .await,
        );
        failed.extend(self.push_user_list().await);

        self.evict(failed).await;
        Ok(())
    }

    /// Routes one envelope.
    ///
    /// Returns `RecipientNotFound` after notifying the sender when a private
    /// message has nowhere to go. Nothing else is reported to the caller:
    /// delivery failures are handled here by evicting the broken connection.
    pub async fn dispatch(&self, envelope: Envelope) -> Result<(), ChatError> {
        let _guard = self.dispatch_lock.lock().await;

        match envelope.route {
            Route::Broadcast => {
                debug!("{} broadcasts {} bytes", envelope.sender, envelope.body.len());
                let line = broadcast_line(&envelope.sender, &envelope.body);
                let failed = self.fan_out(Packet::Chat { line }).await;
                self.evict(failed).await;
                Ok(())
            }
            Route::Direct { recipient } => {
                self.route_direct(&envelope.sender, &recipient, &envelope.body)
                    .await
            }
        }
    }

    /// Removes a connection whose session is ending and announces the departure.
    ///
    /// Only the first caller for a given connection does anything; later
    /// calls (a session noticing an eviction the router already performed,
    /// say) return `false`.
    pub async fn depart(&self, connection: &Arc<Connection>, departure: Departure) -> bool {
        let _guard = self.dispatch_lock.lock().await;

        if !connection.begin_close() {
            return false;
        }

        let name = connection.name().to_string();
        if let Err(e) = self.registry.remove(&name).await {
            warn!("Departing connection was not registered: {}", e);
        }
        info!("{} departed ({:?})", name, departure);

        let mut failed = self
            .fan_out(Packet::Chat {
                line: departure.notice(&name),
            })
            .await;
        failed.extend(self.push_user_list().await);
        self.evict(failed).await;
        true
    }

    async fn route_direct(
        &self,
        sender: &str,
        recipient: &str,
        body: &str,
    ) -> Result<(), ChatError> {
        let target = match self.registry.lookup(recipient).await {
            Ok(target) => target,
            Err(_) => {
                debug!("{} -> {}: recipient offline", sender, recipient);
                self.notify_not_found(sender, recipient).await;
                return Err(ChatError::RecipientNotFound {
                    name: recipient.to_string(),
                });
            }
        };

        debug!("{} -> {}: {} bytes", sender, recipient, body.len());
        let line = private_line(sender, recipient, body);

        if let Err(e) = target.send(Packet::Chat { line: line.clone() }) {
            warn!("Private message to {} failed: {}", recipient, e);
            self.evict(vec![target]).await;
            self.notify_not_found(sender, recipient).await;
            return Ok(());
        }

        if target.name() != sender {
            self.send_to(sender, Packet::Chat { line }).await;
        }
        Ok(())
    }

    async fn notify_not_found(&self, sender: &str, recipient: &str) {
        self.send_to(
            sender,
            Packet::RecipientNotFound {
                recipient: recipient.to_string(),
                notice: not_found_notice(recipient),
            },
        )
        .await;
    }

    /// Sends to one named connection, evicting it if the send fails.
    /// A name that is no longer registered is skipped.
    async fn send_to(&self, name: &str, packet: Packet) {
        let Ok(connection) = self.registry.lookup(name).await else {
            return;
        };
        if let Err(e) = connection.send(packet) {
            warn!("Send to {} failed: {}", name, e);
            self.evict(vec![connection]).await;
        }
    }

    /// Sends a packet to every registered connection, returning the ones
    /// whose send failed. Delivery to the rest is unaffected.
    async fn fan_out(&self, packet: Packet) -> Vec<Arc<Connection>> {
        let mut failed = Vec::new();
        for connection in self.registry.connections().await {
            if let Err(e) = connection.send(packet.clone()) {
                warn!("Broadcast to {} failed: {}", connection.name(), e);
                failed.push(connection);
            }
        }
        failed
    }

    async fn push_user_list(&self) -> Vec<Arc<Connection>> {
        let names = self.registry.snapshot().await;
        self.fan_out(Packet::UserList { names }).await
    }

    /// Removes connections whose sends failed and announces each departure.
    ///
    /// Announcing can itself hit more broken connections, so this repeats
    /// until a round evicts nobody new. Each round ends with a single user
    /// list push.
    async fn evict(&self, mut failed: Vec<Arc<Connection>>) {
        while !failed.is_empty() {
            let mut departed = Vec::new();
            for connection in failed.drain(..) {
                if connection.begin_close() {
                    if let Err(e) = self.registry.remove(connection.name()).await {
                        warn!("Evicted connection was not registered: {}", e);
                    }
                    info!("{} evicted after a failed send", connection.name());
                    departed.push(connection);
                }
            }

            if departed.is_empty() {
                break;
            }

            for connection in &departed {
                failed.extend(
                    self.fan_out(Packet::Chat {
                        line: Departure::Dropped.notice(connection.name()),
                    })
                    .await,
                );
            }
            failed.extend(self.push_user_list().await);
        }
    }
}
