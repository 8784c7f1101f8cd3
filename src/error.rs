use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid bounding box: {0}")]
    InvalidBbox(String),

    #[error("unknown layer `{0}`")]
    UnknownLayer(String),

    #[error("unknown tile source `{0}`")]
    UnknownTileSource(String),

    #[error("invalid feature document: {0}")]
    FeatureDocument(#[from] serde_json::Error),

    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("http client error: {0}")]
    HttpClient(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
