//! Client side of the relay protocol
//!
//! [`ChatClient::connect`] opens the TCP connection, proposes a display name
//! and hands back a handle for sending plus a receiver of [`ClientEvent`]s,
//! in the order the relay sent them.

use futures::{SinkExt, StreamExt};
use log::{debug, warn};
use shared::{CodecError, Packet, PacketCodec, RejectReason, MAX_BODY_LEN};
use std::io;
use thiserror::Error;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_util::codec::{FramedRead, FramedWrite};

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("connection failed: {0}")]
    Io(#[from] io::Error),

    #[error("protocol error: {0}")]
    Codec(#[from] CodecError),

    #[error("message of {len} bytes is longer than {} bytes", MAX_BODY_LEN)]
    BodyTooLong { len: usize },
}

fn check_body(body: &str) -> Result<(), ClientError> {
    if body.len() > MAX_BODY_LEN {
        return Err(ClientError::BodyTooLong { len: body.len() });
    }
    Ok(())
}

/// Something the relay told us
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    /// The proposed name was accepted
    Joined { name: String },
    /// A line for the chat log: public and private messages, join and leave notices
    ChatLine(String),
    /// Everyone currently online, in name order
    UserListUpdated(Vec<String>),
    /// The proposed name was refused; the relay closes the connection
    Rejected { name: String, reason: RejectReason },
    /// A private message could not be delivered
    Error(String),
    /// The relay closed the connection or it broke
    Disconnected,
}

impl ClientEvent {
    /// Maps a server packet to an event, ignoring packets only a server accepts.
    pub fn from_packet(packet: Packet) -> Option<Self> {
        match packet {
            Packet::Welcome { name } => Some(ClientEvent::Joined { name }),
            Packet::Chat { line } => Some(ClientEvent::ChatLine(line)),
            Packet::UserList { names } => Some(ClientEvent::UserListUpdated(names)),
            Packet::Rejected { name, reason } => Some(ClientEvent::Rejected { name, reason }),
            Packet::RecipientNotFound { notice, .. } => Some(ClientEvent::Error(notice)),
            Packet::Join { .. } | Packet::Public { .. } | Packet::Private { .. } | Packet::Leave => {
                None
            }
        }
    }
}

pub struct ChatClient {
    name: String,
    writer: FramedWrite<OwnedWriteHalf, PacketCodec>,
}

impl ChatClient {
    /// Connects to the relay at `addr` and proposes `name`.
    ///
    /// Whether the name was accepted arrives as the first event:
    /// `Joined` or `Rejected`.
    pub async fn connect(
        addr: &str,
        name: &str,
    ) -> Result<(Self, mpsc::UnboundedReceiver<ClientEvent>), ClientError> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        let (read_half, write_half) = stream.into_split();

        let mut writer = FramedWrite::new(write_half, PacketCodec::new());
        writer
            .send(Packet::Join {
                name: name.to_string(),
            })
            .await?;

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        tokio::spawn(read_loop(
            FramedRead::new(read_half, PacketCodec::new()),
            events_tx,
        ));

        Ok((
            ChatClient {
                name: name.to_string(),
                writer,
            },
            events_rx,
        ))
    }

    /// The name this client proposed
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Sends a message to everyone online.
    ///
    /// Bodies over [`MAX_BODY_LEN`] bytes are refused without sending; the
    /// relay would close the connection over them.
    pub async fn send_public(&mut self, body: impl Into<String>) -> Result<(), ClientError> {
        let body = body.into();
        check_body(&body)?;
        self.writer.send(Packet::Public { body }).await?;
        Ok(())
    }

    /// Sends a private message to `recipient`, with the same size limit as
    /// [`ChatClient::send_public`].
    pub async fn send_private(
        &mut self,
        recipient: impl Into<String>,
        body: impl Into<String>,
    ) -> Result<(), ClientError> {
        let body = body.into();
        check_body(&body)?;
        self.writer
            .send(Packet::Private {
                recipient: recipient.into(),
                body,
            })
            .await?;
        Ok(())
    }

    /// Tells the relay we are leaving. The event stream ends with
    /// `Disconnected` once the relay closes the connection.
    pub async fn leave(mut self) -> Result<(), ClientError> {
        self.writer.send(Packet::Leave).await?;
        self.writer.close().await?;
        Ok(())
    }
}

async fn read_loop(
    mut reader: FramedRead<OwnedReadHalf, PacketCodec>,
    events: mpsc::UnboundedSender<ClientEvent>,
) {
    while let Some(frame) = reader.next().await {
        match frame {
            Ok(packet) => match ClientEvent::from_packet(packet) {
                Some(event) => {
                    if events.send(event).is_err() {
                        debug!("Event receiver dropped, stopping reader");
                        return;
                    }
                }
                None => warn!("Ignoring client-only packet from server"),
            },
            Err(e) => {
                warn!("Connection to server failed: {}", e);
                break;
            }
        }
    }

    let _ = events.send(ClientEvent::Disconnected);
}
