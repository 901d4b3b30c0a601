use thiserror::Error;

#[derive(Error, Debug)]
pub enum BotError {
    #[error("HTTP request error: {0}")]
    Request(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Discord API error: {0}")]
    Discord(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Captcha solver error: {0}")]
    Solver(String),

    #[error("Engine error: {0}")]
    Engine(String),
}

pub type Result<T> = std::result::Result<T, BotError>;
