use thiserror::Error;

#[derive(Error, Debug)]
pub enum SerifuError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Image decode error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Timestamp recognition error: {0}")]
    Recognizer(String),

    #[error("Subtitle track error: {0}")]
    Subtitle(String),

    #[error("Screen capture error: {0}")]
    Capture(String),

    #[error("Pointer control error: {0}")]
    Pointer(String),

    #[error("Speech synthesis error: {0}")]
    Speech(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("External tool error: {0}")]
    Tool(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("File not found: {0}")]
    FileNotFound(String),
}

pub type Result<T> = std::result::Result<T, SerifuError>;
