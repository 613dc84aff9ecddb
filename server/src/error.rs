use shared::CodecError;
use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("name {name} is already taken")]
    NameTaken { name: String },

    #[error("name {name:?} is not a valid display name")]
    InvalidName { name: String },

    #[error("no connection registered as {name}")]
    NotFound { name: String },

    #[error("user {name} not found or offline")]
    RecipientNotFound { name: String },

    #[error("peer {name} disconnected")]
    PeerDisconnected { name: String },

    #[error("outgoing queue for {name} is full")]
    Backlogged { name: String },

    #[error("malformed frame: {message}")]
    MalformedFrame { message: String },

    #[error("listener failed: {0}")]
    Io(#[from] io::Error),
}

impl From<CodecError> for ChatError {
    fn from(e: CodecError) -> Self {
        match e {
            CodecError::Io(io) => ChatError::Io(io),
            other => ChatError::MalformedFrame {
                message: other.to_string(),
            },
        }
    }
}
