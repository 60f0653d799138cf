//! Error types for the archive client.

use thiserror::Error;

/// Failure of a single HTTP exchange with the archive.
#[derive(Error, Debug)]
pub enum TransportError {
    /// The archive answered with a non-success status.
    #[error("HTTP {status} from {url}: {body}")]
    Status { status: u16, url: String, body: String },

    /// The request never produced a response (connect, timeout, body read).
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The response body was not what the archive API documents.
    #[error("Unexpected response: {0}")]
    Decode(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl TransportError {
    /// Whether polling again later may succeed.
    ///
    /// Server-side errors, throttling and connection problems are transient;
    /// authorization and other client errors are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            TransportError::Status { status, .. } => {
                *status >= 500 || *status == 429 || *status == 408
            }
            TransportError::Http(e) => !e.is_builder() && !e.is_redirect(),
            TransportError::Decode(_) | TransportError::Io(_) => false,
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            TransportError::Status { status, .. } => Some(*status),
            TransportError::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

/// Submission of a retrieval failed. Submission is never retried internally.
#[derive(Error, Debug)]
pub enum SubmitError {
    /// HTTP 403: the dataset licence has not been accepted for this account.
    #[error("Licence for dataset '{dataset}' not accepted; accept it in the archive web portal")]
    LicenseNotAccepted { dataset: String },

    #[error("Remote archive unavailable: {0}")]
    RemoteUnavailable(String),
}

impl SubmitError {
    pub fn from_transport(dataset: &str, err: TransportError) -> Self {
        match err.status() {
            Some(403) => SubmitError::LicenseNotAccepted {
                dataset: dataset.to_string(),
            },
            _ => SubmitError::RemoteUnavailable(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(code: u16) -> TransportError {
        TransportError::Status {
            status: code,
            url: "https://cds.example/jobs/1".to_string(),
            body: String::new(),
        }
    }

    #[test]
    fn test_retryable_statuses() {
        assert!(status(500).is_retryable());
        assert!(status(503).is_retryable());
        assert!(status(429).is_retryable());
        assert!(!status(401).is_retryable());
        assert!(!status(403).is_retryable());
        assert!(!status(404).is_retryable());
        assert!(!TransportError::Decode("x".into()).is_retryable());
    }

    #[test]
    fn test_submit_error_mapping() {
        assert!(matches!(
            SubmitError::from_transport("reanalysis-era5-land", status(403)),
            SubmitError::LicenseNotAccepted { dataset } if dataset == "reanalysis-era5-land"
        ));
        assert!(matches!(
            SubmitError::from_transport("reanalysis-era5-land", status(502)),
            SubmitError::RemoteUnavailable(_)
        ));
        assert!(matches!(
            SubmitError::from_transport("d", TransportError::Decode("no jobID".into())),
            SubmitError::RemoteUnavailable(_)
        ));
    }
}
