//! # imgpdf
//!
//! Convert images (JPEG, PNG, BMP, GIF, WebP, TIFF) into PDF documents.
//!
//! ## Features
//!
//! - **Normalization**: RGBA, palette and grey+alpha images are composited
//!   over white; every page image is plain RGB
//! - **Quality control**: optional lossy re-encoding to shrink the output
//! - **Merged mode**: all images as pages of a single PDF, in input order
//! - **Individual mode**: one single-page PDF per image, optionally zipped
//! - **Scratch space**: request-scoped temporary directories that clean up
//!   after themselves
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use imgpdf::{ConversionRequest, ConversionResult, ImageConverter, OutputMode, Quality, SourceImage};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let request = ConversionRequest::new(
//!     vec![SourceImage::new("scan-1.png"), SourceImage::new("scan-2.jpg")],
//!     "output",
//! )
//! .with_mode(OutputMode::Merged)
//! .with_base_name("scans")
//! .with_quality(Quality::new(80));
//!
//! match ImageConverter::default().convert(&request)? {
//!     ConversionResult::Merged { pdf, pages } => {
//!         println!("{} pages written to {}", pages, pdf.display());
//!     }
//!     ConversionResult::Individual { pdfs } => {
//!         println!("{} documents written", pdfs.len());
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod archive;
pub mod assemble;
pub mod convert;
pub mod error;
pub mod formats;
pub mod normalize;
pub mod request;
pub mod scratch;

pub use archive::{write_zip, zip_to_vec};
pub use assemble::{AssembleOptions, AssembledPdf, PdfAssembler, DEFAULT_DPI, MIN_EMBED_QUALITY};
pub use convert::{convert_images, ConverterOptions, ImageConverter};
pub use error::{ArchiveError, ConversionError, DecodeError, EncodeError, Result};
pub use normalize::{ImageAsset, ImageNormalizer, NormalizedImage, PixelFormat};
pub use request::{
    sanitize_base_name, CancelFlag, ConversionRequest, ConversionResult, NamedPdf, OutputMode,
    Quality, SourceImage,
};
pub use scratch::ScratchSpace;

/// Current version of imgpdf
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
