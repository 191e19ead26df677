use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("credential file I/O failed at {path}: {source}")]
    Io {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("stored value for `{key}` is corrupt: {source}")]
    Corrupt {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("credential file is not a JSON object: {0}")]
    Format(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}
