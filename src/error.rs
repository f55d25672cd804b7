use crate::coordination::ErrorCode;
use crate::records::{CodecError, Version};
use std::time::Duration;
use thiserror::Error;

/// Store-level failures surfaced to the resource manager.
///
/// `Fenced` is terminal: a peer controller has taken exclusive create-delete
/// authority on the root znode and this store must not write again.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("state store fenced: this controller no longer holds create-delete authority on the root znode")]
    Fenced,
    #[error("timed out after {0:?} waiting for an active coordination session")]
    ConnectionWaitTimeout(Duration),
    #[error("unable to connect to the coordination service at {address}")]
    Connection { address: String },
    #[error("coordination operation failed with {code} after {attempts} attempts")]
    Coordination { code: ErrorCode, attempts: usize },
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error("no coordination service address configured for the state store")]
    MissingAddress,
    #[error("znode name {node} does not match the embedded application id {embedded}")]
    IdMismatch { node: String, embedded: String },
    #[error("blob for {path} is {size} bytes, over the {limit}-byte znode limit")]
    NodeSizeExceeded {
        path: String,
        size: usize,
        limit: usize,
    },
    #[error("persisted version {loaded} is incompatible with current version {current}")]
    VersionMismatch { loaded: Version, current: Version },
}
