use std::path::PathBuf;
use thiserror::Error;

/// An input image could not be opened or decoded.
///
/// Recoverable: the orchestrator skips the offending input and carries on
/// with the rest of the batch.
#[derive(Error, Debug)]
#[error("Failed to decode image {}: {reason}", path.display())]
pub struct DecodeError {
    pub path: PathBuf,
    pub reason: String,
}

impl DecodeError {
    pub fn new(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

/// Writing a PDF failed. The partially written output has already been removed.
#[derive(Error, Debug)]
pub enum EncodeError {
    #[error("No images to assemble")]
    Empty,

    #[error("JPEG encoding failed: {0}")]
    Jpeg(#[from] image::ImageError),

    #[error("PDF generation failed: {0}")]
    Pdf(#[from] oxidize_pdf::PdfError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Whole-request failure surfaced to the caller.
#[derive(Error, Debug)]
pub enum ConversionError {
    #[error("No input images were provided")]
    NoInput,

    #[error("None of the provided images could be converted")]
    NoValidImages,

    #[error("Conversion was cancelled")]
    Cancelled,

    #[error("PDF assembly failed: {0}")]
    Encode(#[from] EncodeError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ConversionError {
    /// Stable, machine-readable classification of the failure.
    pub fn kind(&self) -> &'static str {
        match self {
            ConversionError::NoInput => "no_input",
            ConversionError::NoValidImages => "no_valid_images",
            ConversionError::Cancelled => "cancelled",
            ConversionError::Encode(_) => "encode_error",
            ConversionError::Io(_) => "io_error",
        }
    }
}

/// Bundling individual PDFs into a ZIP failed.
#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("ZIP error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ConversionError>;
