use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variables: {}", missing.join(", "))]
    Missing { missing: Vec<String> },
    #[error("invalid value for {name}: {value:?}")]
    Invalid { name: &'static str, value: String },
}

#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("request to {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("unexpected response from {url}: {detail}")]
    Response { url: String, detail: String },
    #[error("rpc error from {url}: {message}")]
    Rpc { url: String, message: String },
}

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("snapshot io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("snapshot format error: {0}")]
    Csv(#[from] csv::Error),
    #[error("snapshot {0} already exists")]
    AlreadyExists(String),
}

#[derive(Debug, Error)]
pub enum PaymentError {
    #[error("wallet configuration failed: {0}")]
    Configure(String),
    #[error("transaction signing failed: {0}")]
    Signing(String),
    #[error("transfer to {to} failed: {source}")]
    Transfer {
        to: String,
        #[source]
        source: UpstreamError,
    },
    #[error("balance lookup failed: {0}")]
    Balance(#[source] UpstreamError),
}
