use serde::{Deserialize, Serialize};
use std::fmt;

pub mod codec;

pub use codec::{CodecError, PacketCodec};

pub const DEFAULT_PORT: u16 = 12435;
pub const MAX_NAME_LEN: usize = 32;
pub const MAX_FRAME_LEN: usize = 64 * 1024;
/// Longest name in bytes: [`MAX_NAME_LEN`] characters of up to four bytes each
pub const MAX_NAME_BYTES: usize = MAX_NAME_LEN * 4;
/// Largest message body in bytes the relay accepts.
///
/// Leaves room in an outgoing frame for the longest sender and recipient
/// names, the line formatting around them and the packet encoding.
pub const MAX_BODY_LEN: usize = MAX_FRAME_LEN - 1024;

/// Every message exchanged between relay and clients, one per frame.
///
/// The first four variants travel client → server, the rest server → client.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub enum Packet {
    Join {
        name: String,
    },
    Public {
        body: String,
    },
    Private {
        recipient: String,
        body: String,
    },
    Leave,

    Welcome {
        name: String,
    },
    Chat {
        line: String,
    },
    UserList {
        names: Vec<String>,
    },
    Rejected {
        name: String,
        reason: RejectReason,
    },
    RecipientNotFound {
        recipient: String,
        notice: String,
    },
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    NameTaken,
    InvalidName,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::NameTaken => write!(f, "name is already taken"),
            RejectReason::InvalidName => write!(
                f,
                "name must be 1 to {} printable characters",
                MAX_NAME_LEN
            ),
        }
    }
}

/// Trims a proposed display name and checks it is usable.
///
/// Returns `None` for empty names, names longer than [`MAX_NAME_LEN`]
/// characters, and names containing control characters.
pub fn normalize_name(raw: &str) -> Option<String> {
    let name = raw.trim();
    if name.is_empty() || name.chars().count() > MAX_NAME_LEN {
        return None;
    }
    if name.chars().any(char::is_control) {
        return None;
    }
    Some(name.to_string())
}

pub fn broadcast_line(sender: &str, body: &str) -> String {
    format!("{} to all: {}", sender, body)
}

pub fn private_line(sender: &str, recipient: &str, body: &str) -> String {
    format!("[private] {} to {}: {}", sender, recipient, body)
}

pub fn not_found_notice(recipient: &str) -> String {
    format!("User {} not found or offline.", recipient)
}
