//! Typed failures for the two demo units
//!
//! Application code propagates these through `anyhow` with added context;
//! the enums exist so callers and tests can tell a transport failure from an
//! allocation failure without string matching.

use std::time::Duration;
use thiserror::Error;

/// Buffer allocation failed in the array pipeline
#[derive(Error, Debug)]
#[error("Failed to allocate memory for {elements} elements ({bytes} bytes)")]
pub struct AllocationError {
    pub elements: usize,
    pub bytes: usize,
}

/// Exchange transport failures
///
/// Every variant is fatal for the participant that observes it.
#[derive(Error, Debug)]
pub enum TransportError {
    /// Destination or source ordinal outside [0, size)
    #[error("Invalid rank {rank} for group of size {size}")]
    InvalidRank { rank: usize, size: usize },

    /// Participant tried to talk to itself
    #[error("Rank {0} cannot exchange messages with itself")]
    SelfMessage(usize),

    /// No channel exists between this participant and the peer
    #[error("No channel from rank {from} to rank {to}")]
    NoChannel { from: usize, to: usize },

    /// Could not bind or connect the rendezvous address
    #[error("Failed to establish channel with {addr}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// Read or write on an established channel failed
    #[error("Channel I/O failed")]
    Io(#[from] std::io::Error),

    /// Bounded wait expired
    #[error("Timed out after {after:?} waiting for rank {peer}")]
    Timeout { peer: usize, after: Duration },

    /// Peer sent something the protocol does not allow here
    #[error("Protocol violation: {0}")]
    Protocol(String),

    /// Text does not fit the fixed payload capacity
    #[error("Payload of {len} bytes exceeds capacity of {capacity} bytes")]
    PayloadTooLarge { len: usize, capacity: usize },

    /// Frame could not be encoded
    #[error("Failed to encode message")]
    Encode(#[from] rmp_serde::encode::Error),

    /// Frame could not be decoded
    #[error("Failed to decode message")]
    Decode(#[from] rmp_serde::decode::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocation_error_message() {
        let err = AllocationError { elements: 4, bytes: 32 };
        assert_eq!(
            err.to_string(),
            "Failed to allocate memory for 4 elements (32 bytes)"
        );
    }

    #[test]
    fn test_transport_error_messages() {
        let err = TransportError::InvalidRank { rank: 5, size: 3 };
        assert_eq!(err.to_string(), "Invalid rank 5 for group of size 3");

        let err = TransportError::NoChannel { from: 1, to: 2 };
        assert_eq!(err.to_string(), "No channel from rank 1 to rank 2");

        let err = TransportError::PayloadTooLarge { len: 120, capacity: 100 };
        assert!(err.to_string().contains("120"));
    }
}
