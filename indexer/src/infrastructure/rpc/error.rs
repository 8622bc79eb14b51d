use std::error::Error;
use std::fmt;

/// Error type for node RPC operations
#[derive(Debug)]
pub enum RpcError {
    /// Transport level failure
    Http(String),
    /// Non-success HTTP status with the raw error body
    Status { code: u16, body: String },
    /// The node cannot marshal a message type in this block; triggers the
    /// parser fallback rather than a retry
    TypeUrlUnresolvable(String),
    /// The node has pruned this height ("lowest height is ...")
    HeightNotAvailable(String),
    /// The JSON-RPC envelope carried an error object
    Node(String),
    /// The response body could not be decoded
    Malformed(String),
}

impl fmt::Display for RpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RpcError::Http(msg) => write!(f, "http error: {}", msg),
            RpcError::Status { code, body } => write!(f, "http status {}: {}", code, body),
            RpcError::TypeUrlUnresolvable(msg) => {
                write!(f, "unable to resolve type URL: {}", msg)
            }
            RpcError::HeightNotAvailable(msg) => write!(f, "height not available: {}", msg),
            RpcError::Node(msg) => write!(f, "node error: {}", msg),
            RpcError::Malformed(msg) => write!(f, "malformed response: {}", msg),
        }
    }
}

impl Error for RpcError {}

impl From<reqwest::Error> for RpcError {
    fn from(error: reqwest::Error) -> Self {
        RpcError::Http(error.to_string())
    }
}

impl RpcError {
    /// Classify a node error body into the special-cased variants
    pub fn classify(code: u16, body: String) -> Self {
        if body.contains("unable to resolve type URL") {
            RpcError::TypeUrlUnresolvable(body)
        } else if body.contains("is not available, lowest height is") {
            RpcError::HeightNotAvailable(body)
        } else {
            RpcError::Status { code, body }
        }
    }

    /// Classify an error carried inside a JSON-RPC envelope (the transport
    /// succeeded, so there is no meaningful status code)
    pub fn classify_envelope(body: String) -> Self {
        if body.contains("unable to resolve type URL") {
            RpcError::TypeUrlUnresolvable(body)
        } else if body.contains("is not available, lowest height is") {
            RpcError::HeightNotAvailable(body)
        } else {
            RpcError::Node(body)
        }
    }

    /// True when this error represents pruned node history
    pub fn is_pruned_height(&self) -> bool {
        matches!(self, RpcError::HeightNotAvailable(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_type_url_errors() {
        let err = RpcError::classify(
            500,
            "unable to resolve type URL /osmosis.gamm.v1beta1.MsgSwapExactAmountIn".to_string(),
        );
        assert!(matches!(err, RpcError::TypeUrlUnresolvable(_)));
    }

    #[test]
    fn classifies_pruned_heights() {
        let err = RpcError::classify(
            500,
            "height 5 is not available, lowest height is 100".to_string(),
        );
        assert!(err.is_pruned_height());
    }

    #[test]
    fn other_errors_keep_their_status() {
        let err = RpcError::classify(503, "service unavailable".to_string());
        match err {
            RpcError::Status { code, .. } => assert_eq!(code, 503),
            other => panic!("unexpected classification: {:?}", other),
        }
    }
}
