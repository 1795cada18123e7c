use crate::models::BinId;

/// Errors surfaced by the browsing engine.
///
/// None of them is fatal: every failure leaves the previously cached state in
/// place, possibly stale but never half-merged.
#[derive(Debug)]
pub enum BrowseError {
    /// The fetch collaborator rejected the request or timed out.
    NetworkFailure(anyhow::Error),
    /// A batch response did not contain a bin that was asked for.
    MissingBinData { bin: BinId },
    /// Rejected before reaching the network.
    InvalidRequestShape(String),
}

impl BrowseError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidRequestShape(msg.into())
    }

    /// Short label used in log fields and user notifications.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NetworkFailure(_) => "network_failure",
            Self::MissingBinData { .. } => "missing_bin_data",
            Self::InvalidRequestShape(_) => "invalid_request_shape",
        }
    }
}

impl std::fmt::Display for BrowseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NetworkFailure(e) => write!(f, "network failure: {:#}", e),
            Self::MissingBinData { bin } => {
                write!(f, "response is missing data for bin {} ({})", bin, bin.label())
            }
            Self::InvalidRequestShape(msg) => write!(f, "invalid request: {}", msg),
        }
    }
}

impl std::error::Error for BrowseError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::NetworkFailure(e) => Some(&**e),
            _ => None,
        }
    }
}

impl From<anyhow::Error> for BrowseError {
    fn from(e: anyhow::Error) -> Self {
        Self::NetworkFailure(e)
    }
}

pub type BrowseResult<T> = Result<T, BrowseError>;
