use delegated_routing_core::{DecodeError, FramingError, SchemaError, ServiceError};

/// Errors from a delegated routing call.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("invalid endpoint: {0}")]
    Endpoint(#[from] url::ParseError),
    #[error("http: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("unexpected http status {0}")]
    Status(reqwest::StatusCode),
    #[error(transparent)]
    Framing(#[from] FramingError),
    #[error(transparent)]
    Schema(#[from] SchemaError),
    #[error(transparent)]
    Service(#[from] ServiceError),
    #[error("call cancelled")]
    Cancelled,
    #[error("deadline exceeded")]
    DeadlineExceeded,
    #[error("provide needs a signer and a provider identity")]
    MissingIdentity,
    #[error("signing provide request: {0}")]
    Signing(#[from] libp2p_identity::SigningError),
    #[error("selecting record: {0}")]
    Selection(#[source] crate::records::InvalidRecord),
}

impl From<DecodeError> for ClientError {
    fn from(e: DecodeError) -> Self {
        match e {
            DecodeError::Framing(e) => ClientError::Framing(e),
            DecodeError::Schema(e) => ClientError::Schema(e),
        }
    }
}

impl ClientError {
    /// Low-cardinality name of the failure, suitable as a metric label.
    pub fn label(&self) -> &'static str {
        match self {
            ClientError::Cancelled => "Canceled",
            ClientError::DeadlineExceeded => "DeadlineExceeded",
            ClientError::Schema(_) => "Schema",
            ClientError::Framing(_) => "Proto",
            ClientError::Service(_) => "Service",
            ClientError::Transport(e) if e.is_timeout() => "NetTimeout",
            ClientError::Transport(_) => "Net",
            ClientError::Status(_) => "Status",
            _ => "Other",
        }
    }

    /// Whether the call ended because its token was cancelled or timed out.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, ClientError::Cancelled | ClientError::DeadlineExceeded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_are_stable() {
        assert_eq!(ClientError::Cancelled.label(), "Canceled");
        assert_eq!(ClientError::DeadlineExceeded.label(), "DeadlineExceeded");
        assert_eq!(ClientError::from(ServiceError::new("boom")).label(), "Service");
        assert_eq!(
            ClientError::Status(reqwest::StatusCode::NOT_FOUND).label(),
            "Status"
        );
        assert_eq!(ClientError::MissingIdentity.label(), "Other");
    }

    #[test]
    fn decode_errors_split_by_layer() {
        let schema = DecodeError::Schema(SchemaError::EmptyUnion { type_name: "Response" });
        assert_eq!(ClientError::from(schema).label(), "Schema");

        let framing = DecodeError::Framing(FramingError::Truncated(3));
        assert_eq!(ClientError::from(framing).label(), "Proto");
    }
}
