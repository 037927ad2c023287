use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("pdf parse error: {0}")]
    PdfParse(String),

    #[error("pdf had no readable page text: {0}")]
    EmptyDocument(String),

    #[error("path has no file name: {0}")]
    MissingFileName(String),

    #[error("invalid chunking config: {0}")]
    InvalidChunkConfig(String),
}

#[derive(Debug, Error)]
pub enum ChatError {
    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    #[error("no document has been indexed yet")]
    EmptyIndex,

    #[error("no document is loaded; process a PDF first")]
    NotReady,

    #[error("no PDF has been uploaded")]
    NoUpload,

    #[error("generation failed: {0}")]
    Generation(String),

    #[error("invalid response from {backend}: {details}")]
    BackendResponse { backend: String, details: String },

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),

    #[error("request failed: {0}")]
    Request(String),
}
