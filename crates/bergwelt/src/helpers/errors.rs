use thiserror::Error;

#[derive(Debug, Error)]
pub enum BwError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Tile loading failed: {0}")]
    TileLoading(String),

    #[error("Network failure: {0}")]
    Network(String),

    #[error("Decode failure: {0}")]
    Decode(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Unexpected internal error: {0}")]
    Internal(String),
}

pub trait TileLoadingContext<T> {
    fn tile_loading(self, msg: &str) -> Result<T, BwError>;
}

impl<T, E> TileLoadingContext<T> for Result<T, E>
where
    E: std::fmt::Display,
{
    fn tile_loading(self, msg: &str) -> Result<T, BwError> {
        self.map_err(|e| BwError::TileLoading(format!("{}: {}", msg, e)))
    }
}

pub trait DecodeContext<T> {
    fn decoding(self, msg: &str) -> Result<T, BwError>;
}

impl<T, E> DecodeContext<T> for Result<T, E>
where
    E: std::fmt::Display,
{
    fn decoding(self, msg: &str) -> Result<T, BwError> {
        self.map_err(|e| BwError::Decode(format!("{}: {}", msg, e)))
    }
}
