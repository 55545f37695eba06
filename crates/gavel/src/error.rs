//! Top-level error type for the Gavel server.

use std::path::PathBuf;

use gavel_protocol::ProtocolError;
use gavel_room::AuctionError;
use gavel_transport::TransportError;

/// Wraps every crate-specific error so `?` works across layers.
#[derive(Debug, thiserror::Error)]
pub enum GavelError {
    /// A transport-level error (bind, accept, send, recv).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A protocol-level error (encode, decode, unexpected message).
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// An auction operation failed.
    #[error(transparent)]
    Auction(#[from] AuctionError),

    /// The lot catalog file could not be read.
    #[error("cannot read catalog {path}: {source}")]
    Catalog {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[cfg(test)]
mod tests {
    use gavel_room::RuleViolation;

    use super::*;

    #[test]
    fn test_from_transport_error() {
        let err: GavelError = TransportError::ConnectionClosed.into();
        assert!(matches!(err, GavelError::Transport(_)));
        assert_eq!(err.to_string(), "connection closed");
    }

    #[test]
    fn test_from_protocol_error() {
        let err: GavelError = ProtocolError::InvalidMessage("bad".into()).into();
        assert!(matches!(err, GavelError::Protocol(_)));
    }

    #[test]
    fn test_from_auction_error_is_transparent() {
        let err: GavelError = AuctionError::from(RuleViolation::AlreadyPassed).into();
        assert!(matches!(err, GavelError::Auction(_)));
        assert_eq!(
            err.to_string(),
            AuctionError::from(RuleViolation::AlreadyPassed).to_string()
        );
    }

    #[test]
    fn test_catalog_error_names_the_file() {
        let err = GavelError::Catalog {
            path: PathBuf::from("/tmp/players.json"),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "missing"),
        };
        assert!(err.to_string().contains("/tmp/players.json"));
    }
}
