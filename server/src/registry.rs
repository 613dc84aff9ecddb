//! Display-name registry for the chat relay
//!
//! This module owns the answer to "who is online". It maps each negotiated
//! display name to its live connection and is shared between the listener,
//! every session task and the router.
//!
//! All access goes through one `RwLock`. Membership changes take the write
//! half, lookups and snapshots the read half, and no lock is held across an
//! await point, so every critical section is short and bounded. A name can
//! therefore never be registered twice, and a snapshot never shows a
//! half-applied change.

use crate::connection::Connection;
use crate::error::ChatError;
use log::info;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Debug, Default)]
pub struct Registry {
    /// Live connections keyed by display name, kept sorted for snapshots
    connections: RwLock<BTreeMap<String, Arc<Connection>>>,
}

impl Registry {
    /// Creates an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a connection under `name`.
    ///
    /// Fails with `NameTaken` if any live connection already holds the name.
    /// Checking and inserting happen under one write lock, so two concurrent
    /// negotiations for the same name cannot both succeed.
    pub async fn add(&self, name: &str, connection: Arc<Connection>) -> Result<(), ChatError> {
        let mut connections = self.connections.write().await;
        if connections.contains_key(name) {
            return Err(ChatError::NameTaken {
                name: name.to_string(),
            });
        }

        info!("{} registered from {}", name, connection.addr());
        connections.insert(name.to_string(), connection);
        Ok(())
    }

    /// Removes the mapping for `name`, returning the connection it held.
    ///
    /// Removing a name that is already gone reports `NotFound` and changes
    /// nothing.
    pub async fn remove(&self, name: &str) -> Result<Arc<Connection>, ChatError> {
        let mut connections = self.connections.write().await;
        match connections.remove(name) {
            Some(connection) => {
                info!("{} unregistered", name);
                Ok(connection)
            }
            None => Err(ChatError::NotFound {
                name: name.to_string(),
            }),
        }
    }

    /// Returns the live connection registered as `name`
    pub async fn lookup(&self, name: &str) -> Result<Arc<Connection>, ChatError> {
        let connections = self.connections.read().await;
        connections
            .get(name)
            .cloned()
            .ok_or_else(|| ChatError::NotFound {
                name: name.to_string(),
            })
    }

    /// Point-in-time list of registered names in lexicographic order
    pub async fn snapshot(&self) -> Vec<String> {
        let connections = self.connections.read().await;
        connections.keys().cloned().collect()
    }

    /// Point-in-time list of registered connections, in name order.
    ///
    /// Used as the recipient set of a broadcast; sends happen after the lock
    /// is released.
    pub async fn connections(&self) -> Vec<Arc<Connection>> {
        let connections = self.connections.read().await;
        connections.values().cloned().collect()
    }

    /// Number of registered connections
    pub async fn len(&self) -> usize {
        self.connections.read().await.len()
    }

    /// True when nobody is online
    pub async fn is_empty(&self) -> bool {
        self.connections.read().await.is_empty()
    }
}
