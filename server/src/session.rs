//! Per-connection session: name negotiation, then the read loop
//!
//! A session owns its socket. The read half stays with the session task and
//! is decoded one frame at a time; the write half goes to a writer task that
//! drains the connection's outgoing queue. Whatever ends the session (leave
//! frame, EOF, transport error, malformed frame, eviction by the router)
//! goes through `Router::depart`, which cleans up at most once per connection.

use crate::connection::{Connection, OUTBOUND_QUEUE_LEN};
use crate::error::ChatError;
use crate::router::{Departure, Envelope, Router};
use futures::{SinkExt, StreamExt};
use log::{debug, info, warn};
use shared::{normalize_name, CodecError, Packet, PacketCodec, RejectReason};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::AsyncWrite;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_util::codec::{FramedRead, FramedWrite};

type PacketReader = FramedRead<OwnedReadHalf, PacketCodec>;
type PacketWriter = FramedWrite<OwnedWriteHalf, PacketCodec>;

/// Runs one client from its first frame until the connection is closed.
///
/// Returns an error only when negotiation fails; once the client has joined,
/// every way the session can end is handled locally.
pub async fn run(
    stream: TcpStream,
    addr: SocketAddr,
    router: Arc<Router>,
) -> Result<(), ChatError> {
    let (read_half, write_half) = stream.into_split();
    let mut reader = FramedRead::new(read_half, PacketCodec::new());
    let mut writer = FramedWrite::new(write_half, PacketCodec::new());

    let name = read_proposed_name(&mut reader, addr).await?;
    let Some(name) = normalize_name(&name) else {
        warn!("Rejected invalid name {:?} from {}", name, addr);
        reject(&mut writer, &name, RejectReason::InvalidName).await;
        return Err(ChatError::InvalidName { name });
    };

    let (outbound, rx) = mpsc::channel(OUTBOUND_QUEUE_LEN);
    let connection = Arc::new(Connection::new(name.clone(), addr, outbound));

    if let Err(e) = router.join(Arc::clone(&connection)).await {
        warn!("Rejected {} from {}: {}", name, addr, e);
        reject(&mut writer, &name, RejectReason::NameTaken).await;
        return Err(e);
    }

    let writer_task = tokio::spawn(write_loop(writer, rx, name.clone()));

    let departure = read_loop(&mut reader, &connection, &router).await;
    if !router.depart(&connection, departure).await {
        debug!("{} was already removed by the router", name);
    }

    writer_task.abort();
    let _ = writer_task.await;
    drop(reader);
    connection.mark_closed();
    info!("Connection for {} from {} closed", name, addr);

    Ok(())
}

async fn read_proposed_name(
    reader: &mut PacketReader,
    addr: SocketAddr,
) -> Result<String, ChatError> {
    match reader.next().await {
        Some(Ok(Packet::Join { name })) => Ok(name),
        Some(Ok(other)) => {
            warn!("Expected a join frame from {}, got {:?}", addr, other);
            Err(ChatError::MalformedFrame {
                message: "first frame must be a join".to_string(),
            })
        }
        Some(Err(e)) => Err(e.into()),
        None => Err(ChatError::PeerDisconnected {
            name: addr.to_string(),
        }),
    }
}

async fn reject(writer: &mut PacketWriter, name: &str, reason: RejectReason) {
    let packet = Packet::Rejected {
        name: name.to_string(),
        reason,
    };
    if let Err(e) = writer.send(packet).await {
        debug!("Could not deliver rejection for {}: {}", name, e);
    }
}

/// Reads frames until the session has to end and says why.
async fn read_loop(
    reader: &mut PacketReader,
    connection: &Arc<Connection>,
    router: &Router,
) -> Departure {
    let name = connection.name();

    loop {
        tokio::select! {
            frame = reader.next() => match frame {
                Some(Ok(Packet::Leave)) => {
                    info!("{} is leaving", name);
                    return Departure::Left;
                }
                Some(Ok(packet)) => {
                    let envelope = match Envelope::from_packet(name, packet) {
                        Ok(envelope) => envelope,
                        Err(e) => {
                            warn!("Closing {}: {}", name, e);
                            return Departure::Dropped;
                        }
                    };
                    if !connection.is_active() {
                        return Departure::Dropped;
                    }
                    if let Err(e) = router.dispatch(envelope).await {
                        debug!("Message from {} not delivered: {}", name, e);
                    }
                }
                Some(Err(e)) if e.is_malformed() => {
                    warn!("Malformed frame from {}: {}", name, e);
                    return Departure::Dropped;
                }
                Some(Err(e)) => {
                    info!("Read from {} failed: {}", name, e);
                    return Departure::Dropped;
                }
                None => {
                    info!("{} closed the connection", name);
                    return Departure::Dropped;
                }
            },
            _ = connection.closing() => {
                debug!("{} was evicted", name);
                return Departure::Dropped;
            }
        }
    }
}

/// Drains the outgoing queue onto the socket.
///
/// A packet that cannot be encoded is skipped. Exits on the first transport
/// error, which drops the queue and makes further sends to this connection fail.
async fn write_loop<W>(
    mut writer: FramedWrite<W, PacketCodec>,
    mut rx: mpsc::Receiver<Packet>,
    name: String,
) where
    W: AsyncWrite + Unpin,
{
    while let Some(packet) = rx.recv().await {
        match writer.send(packet).await {
            Ok(()) => {}
            Err(CodecError::Io(e)) => {
                warn!("Write to {} failed: {}", name, e);
                break;
            }
            Err(e) => warn!("Dropped an outgoing packet for {}: {}", name, e),
        }
    }
}
