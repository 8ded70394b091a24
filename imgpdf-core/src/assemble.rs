//! PDF assembly
//!
//! Turns an ordered run of [`NormalizedImage`]s into one PDF file, one page
//! per image. Pages are sized from the pixel dimensions at a fixed nominal
//! resolution and every page image is embedded as a JPEG (`DCTDecode`).

use crate::error::EncodeError;
use crate::normalize::{encode_jpeg, NormalizedImage};
use crate::request::Quality;
use oxidize_pdf::{Document, Image, Page};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Nominal embedding resolution in dots per inch
pub const DEFAULT_DPI: f64 = 150.0;

/// Page images are never embedded below this JPEG quality
pub const MIN_EMBED_QUALITY: u8 = 85;

const POINTS_PER_INCH: f64 = 72.0;
const PAGE_IMAGE_NAME: &str = "Im1";

/// Options for PDF assembly
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AssembleOptions {
    /// Resolution used to convert pixels into page points
    pub dpi: f64,
    /// Floor applied to the requested quality when encoding page images
    pub min_embed_quality: u8,
}

impl Default for AssembleOptions {
    fn default() -> Self {
        Self {
            dpi: DEFAULT_DPI,
            min_embed_quality: MIN_EMBED_QUALITY,
        }
    }
}

impl AssembleOptions {
    pub fn with_dpi(mut self, dpi: f64) -> Self {
        if dpi.is_finite() && dpi > 0.0 {
            self.dpi = dpi;
        }
        self
    }

    pub fn with_min_embed_quality(mut self, quality: Quality) -> Self {
        self.min_embed_quality = quality.value();
        self
    }

    /// JPEG quality actually used for page images.
    pub fn embed_quality(&self, requested: Quality) -> u8 {
        requested.value().max(self.min_embed_quality)
    }

    /// Page size in points for an image of the given pixel size.
    pub fn page_size(&self, width: u32, height: u32) -> (f64, f64) {
        let scale = POINTS_PER_INCH / self.dpi;
        (f64::from(width) * scale, f64::from(height) * scale)
    }
}

/// A PDF written by the assembler
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssembledPdf {
    pub path: PathBuf,
    pub pages: usize,
    pub bytes: u64,
}

/// Writes normalized images into PDF documents.
#[derive(Debug, Clone, Copy, Default)]
pub struct PdfAssembler {
    options: AssembleOptions,
}

impl PdfAssembler {
    pub fn new(options: AssembleOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &AssembleOptions {
        &self.options
    }

    /// Write `images` to `output_path` as a multi-page PDF, preserving order.
    ///
    /// The parent directory is created if needed. On failure nothing is left
    /// at `output_path`.
    pub fn assemble(
        &self,
        images: &[NormalizedImage],
        output_path: impl AsRef<Path>,
        quality: Quality,
    ) -> Result<AssembledPdf, EncodeError> {
        if images.is_empty() {
            return Err(EncodeError::Empty);
        }

        let output_path = output_path.as_ref();
        if let Some(parent) = output_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            if !parent.exists() {
                fs::create_dir_all(parent)?;
                debug!(dir = %parent.display(), "Created output directory");
            }
        }

        match self.write_pdf(images, output_path, quality) {
            Ok(bytes) => {
                info!(
                    path = %output_path.display(),
                    pages = images.len(),
                    bytes,
                    "PDF written"
                );
                Ok(AssembledPdf {
                    path: output_path.to_path_buf(),
                    pages: images.len(),
                    bytes,
                })
            }
            Err(e) => {
                remove_partial_output(output_path);
                Err(e)
            }
        }
    }

    fn write_pdf(
        &self,
        images: &[NormalizedImage],
        output_path: &Path,
        quality: Quality,
    ) -> Result<u64, EncodeError> {
        let embed_quality = self.options.embed_quality(quality);
        let mut doc = Document::new();
        doc.set_creator("imgpdf");
        doc.set_producer(concat!("imgpdf ", env!("CARGO_PKG_VERSION")));

        for (index, image) in images.iter().enumerate() {
            debug!(
                page = index + 1,
                source = %image.source_path().display(),
                embed_quality,
                "Adding page"
            );
            doc.add_page(self.build_page(image, embed_quality)?);
        }

        doc.save(output_path)?;
        Ok(fs::metadata(output_path)?.len())
    }

    fn build_page(&self, image: &NormalizedImage, embed_quality: u8) -> Result<Page, EncodeError> {
        let jpeg = encode_jpeg(image.pixels(), embed_quality)?;
        let pdf_image = Image::from_jpeg_data(jpeg)?;

        let (width, height) = self.options.page_size(image.width(), image.height());
        let mut page = Page::new(width, height);
        page.add_image(PAGE_IMAGE_NAME, pdf_image);
        page.draw_image(PAGE_IMAGE_NAME, 0.0, 0.0, width, height)?;
        Ok(page)
    }
}

fn remove_partial_output(path: &Path) {
    if path.exists() {
        if let Err(e) = fs::remove_file(path) {
            warn!(path = %path.display(), error = %e, "Failed to remove partial PDF");
        } else {
            debug!(path = %path.display(), "Removed partial PDF");
        }
    }
}
