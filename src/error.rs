use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("request to {0} timed out")]
    Timeout(String),
    #[error("connection to {0} failed")]
    Connect(String),
    #[error("request to {0} was cancelled")]
    Cancelled(String),
    #[error("could not resolve {host} to an IPv4 address")]
    Dns { host: String },
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
}

/// Failures of a single scrape step. All of them are contained to the
/// affected query; none aborts the run.
#[derive(Debug, thiserror::Error)]
pub enum ScrapeError {
    #[error("marker not found: {0:?}")]
    MarkerNotFound(&'static str),
    #[error("no session established (status {status}, cookie present: {cookie})")]
    SessionNotEstablished { status: u16, cookie: bool },
    #[error("result page returned status {0}")]
    ResultUnavailable(u16),
    #[error("malformed rent range {0:?}")]
    MalformedRentRange(String),
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Missing or unreadable top-level inputs. These are fatal.
#[derive(Debug, thiserror::Error)]
pub enum InputError {
    #[error("input file missing: {}", .0.display())]
    InputFileMissing(PathBuf),
    #[error("malformed footprint document {}: {reason}", .path.display())]
    MalformedFootprints { path: PathBuf, reason: String },
    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl InputError {
    pub fn from_io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        if source.kind() == std::io::ErrorKind::NotFound {
            InputError::InputFileMissing(path)
        } else {
            InputError::Io { path, source }
        }
    }
}
