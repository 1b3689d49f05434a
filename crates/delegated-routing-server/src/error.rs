use delegated_routing_core::Method;

/// A service refused a request before producing any response.
#[derive(Debug, thiserror::Error)]
pub enum Rejection {
    #[error("{0} not supported")]
    NotSupported(Method),
    #[error("{0}")]
    Failed(String),
}

impl Rejection {
    /// The service does not implement `method`.
    pub fn not_supported(method: Method) -> Self {
        Rejection::NotSupported(method)
    }

    /// The service could not start answering.
    pub fn failed(reason: impl Into<String>) -> Self {
        Rejection::Failed(reason.into())
    }
}
