use thiserror::Error;

#[derive(Error, Debug)]
pub enum VastError {
    #[error("Failed to parse XML: {0}")]
    XmlParseError(#[from] quick_xml::Error),

    #[error("Failed to read file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("URL error: {0}")]
    UrlError(#[from] url::ParseError),

    #[error("Failed to fetch {url}: {reason}")]
    FetchError { url: String, reason: String },

    #[error("Invalid settings: {0}")]
    SettingsError(String),

    #[error("Failed to serialize: {0}")]
    SerializeError(#[from] serde_json::Error),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Unknown error: {0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, VastError>;

impl VastError {
    pub(crate) fn fetch(url: &str, reason: impl std::fmt::Display) -> Self {
        VastError::FetchError {
            url: url.to_string(),
            reason: reason.to_string(),
        }
    }
}
