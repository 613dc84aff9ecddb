//! TCP listener accepting chat clients

use crate::error::ChatError;
use crate::registry::Registry;
use crate::router::Router;
use crate::session;
use log::{debug, error, info, warn};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;

/// The relay: one accept loop, one session task per client
pub struct Server {
    listener: TcpListener,
    router: Arc<Router>,
}

impl Server {
    /// Binds the listening socket on `addr`; port 0 picks a free port
    pub async fn new(addr: &str) -> Result<Self, ChatError> {
        let listener = TcpListener::bind(addr).await?;
        info!("Server listening on {}", listener.local_addr()?);

        let registry = Arc::new(Registry::new());
        Ok(Server {
            listener,
            router: Arc::new(Router::new(registry)),
        })
    }

    /// Address the relay is actually listening on
    pub fn local_addr(&self) -> Result<SocketAddr, ChatError> {
        Ok(self.listener.local_addr()?)
    }

    /// Shared registry of everyone currently online
    pub fn registry(&self) -> Arc<Registry> {
        Arc::clone(self.router.registry())
    }

    /// Accepts clients until the listening socket fails, which is the only
    /// error this returns.
    pub async fn run(self) -> Result<(), ChatError> {
        info!("Server started successfully");

        loop {
            let (stream, addr) = match self.listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    error!("Failed to accept connection: {}", e);
                    return Err(e.into());
                }
            };
            debug!("Accepted connection from {}", addr);

            if let Err(e) = stream.set_nodelay(true) {
                warn!("Could not set TCP_NODELAY for {}: {}", addr, e);
            }

            let router = Arc::clone(&self.router);
            tokio::spawn(async move {
                if let Err(e) = session::run(stream, addr, router).await {
                    info!("Session from {} ended before joining: {}", addr, e);
                }
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_bind_ephemeral_port() {
        let server = Server::new("127.0.0.1:0").await.unwrap();
        let addr = server.local_addr().unwrap();

        assert!(addr.ip().is_loopback());
        assert_ne!(addr.port(), 0);
        assert!(server.registry().is_empty().await);
    }

    #[tokio::test]
    async fn test_bind_invalid_address() {
        let result = Server::new("not an address").await;
        assert!(matches!(result, Err(ChatError::Io(_))));
    }

    #[tokio::test]
    async fn test_address_in_use() {
        let first = Server::new("127.0.0.1:0").await.unwrap();
        let addr = first.local_addr().unwrap().to_string();

        let second = Server::new(&addr).await;
        assert!(second.is_err());
    }
}
