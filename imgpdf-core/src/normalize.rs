//! Image normalization
//!
//! Every page image handed to the assembler must be plain 8-bit RGB: PDF
//! pages have no notion of a transparent backdrop, so alpha and palette
//! images are composited over white first. Low quality settings also run the
//! pixels through a lossy JPEG round trip here, which is what shrinks the
//! final document.

use crate::error::DecodeError;
use crate::request::Quality;
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ImageFormat, ImageReader, Rgb, RgbImage, RgbaImage};
use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Quality at or above which the lossy round trip is skipped.
pub const REENCODE_THRESHOLD: u8 = 95;

const PNG_SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];
const PNG_COLOR_TYPE_INDEXED: u8 = 3;

/// Pixel layout of a decoded source image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// Three colour channels, no alpha
    Rgb,
    /// Colour with alpha
    Rgba,
    /// Indexed colour (GIF, indexed PNG)
    Palette,
    /// Grey with alpha
    GrayscaleAlpha,
    /// Anything else (plain grey, 16-bit grey, ...)
    Other,
}

impl PixelFormat {
    /// Whether this layout is resolved by compositing over white rather than
    /// a straight channel conversion.
    pub fn needs_compositing(self) -> bool {
        matches!(
            self,
            PixelFormat::Rgba | PixelFormat::Palette | PixelFormat::GrayscaleAlpha
        )
    }

    fn of(image: &DynamicImage) -> Self {
        match image {
            DynamicImage::ImageRgb8(_)
            | DynamicImage::ImageRgb16(_)
            | DynamicImage::ImageRgb32F(_) => PixelFormat::Rgb,
            DynamicImage::ImageRgba8(_)
            | DynamicImage::ImageRgba16(_)
            | DynamicImage::ImageRgba32F(_) => PixelFormat::Rgba,
            DynamicImage::ImageLumaA8(_) | DynamicImage::ImageLumaA16(_) => {
                PixelFormat::GrayscaleAlpha
            }
            _ => PixelFormat::Other,
        }
    }
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PixelFormat::Rgb => "RGB",
            PixelFormat::Rgba => "RGBA",
            PixelFormat::Palette => "P",
            PixelFormat::GrayscaleAlpha => "LA",
            PixelFormat::Other => "other",
        };
        f.write_str(name)
    }
}

/// A decoded source image, before any conversion
#[derive(Debug)]
pub struct ImageAsset {
    image: DynamicImage,
    pixel_format: PixelFormat,
    source_format: Option<ImageFormat>,
    source_path: PathBuf,
}

impl ImageAsset {
    /// Decode the image at `path`.
    ///
    /// The container format is sniffed from the file contents, falling back
    /// to the extension.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, DecodeError> {
        let path = path.as_ref();
        let reader = ImageReader::open(path)
            .map_err(|e| DecodeError::new(path, e))?
            .with_guessed_format()
            .map_err(|e| DecodeError::new(path, e))?;

        let source_format = reader.format();
        if source_format.is_none() {
            return Err(DecodeError::new(path, "unrecognized image format"));
        }

        let image = reader.decode().map_err(|e| DecodeError::new(path, e))?;

        let indexed = match source_format {
            Some(ImageFormat::Gif) => true,
            Some(ImageFormat::Png) => png_file_is_indexed(path),
            _ => false,
        };
        let pixel_format = if indexed {
            PixelFormat::Palette
        } else {
            PixelFormat::of(&image)
        };

        Ok(Self {
            image,
            pixel_format,
            source_format,
            source_path: path.to_path_buf(),
        })
    }

    pub fn pixel_format(&self) -> PixelFormat {
        self.pixel_format
    }

    pub fn source_format(&self) -> Option<ImageFormat> {
        self.source_format
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.image.width(), self.image.height())
    }

    pub fn source_path(&self) -> &Path {
        &self.source_path
    }
}

/// An image guaranteed to be 8-bit RGB and ready for page assembly
#[derive(Debug, Clone)]
pub struct NormalizedImage {
    pixels: RgbImage,
    source_path: PathBuf,
    original_format: PixelFormat,
    reencoded: bool,
}

impl NormalizedImage {
    pub fn pixels(&self) -> &RgbImage {
        &self.pixels
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    pub fn source_path(&self) -> &Path {
        &self.source_path
    }

    /// Pixel layout of the source before normalization.
    pub fn original_format(&self) -> PixelFormat {
        self.original_format
    }

    /// Whether the pixels went through the lossy quality round trip.
    pub fn reencoded(&self) -> bool {
        self.reencoded
    }
}

/// Loads images and converts them into [`NormalizedImage`]s.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImageNormalizer {
    quality: Quality,
}

impl ImageNormalizer {
    pub fn new(quality: Quality) -> Self {
        Self { quality }
    }

    pub fn quality(&self) -> Quality {
        self.quality
    }

    /// Decode and classify an image without converting it.
    pub fn inspect(&self, path: impl AsRef<Path>) -> Result<ImageAsset, DecodeError> {
        ImageAsset::load(path)
    }

    /// Decode the image at `path` and normalize it to RGB.
    pub fn normalize(&self, path: impl AsRef<Path>) -> Result<NormalizedImage, DecodeError> {
        let asset = ImageAsset::load(path)?;
        self.normalize_asset(asset)
    }

    /// Normalize an already decoded image.
    pub fn normalize_asset(&self, asset: ImageAsset) -> Result<NormalizedImage, DecodeError> {
        let ImageAsset {
            image,
            pixel_format,
            source_path,
            ..
        } = asset;

        debug!(
            path = %source_path.display(),
            width = image.width(),
            height = image.height(),
            format = %pixel_format,
            "Loaded image"
        );

        let mut pixels = if pixel_format.needs_compositing() {
            debug!(format = %pixel_format, "Compositing onto white background");
            composite_on_white(&image.to_rgba8())
        } else {
            if pixel_format != PixelFormat::Rgb {
                debug!(format = %pixel_format, "Converting to RGB");
            }
            image.into_rgb8()
        };

        let reencoded = self.quality.value() < REENCODE_THRESHOLD;
        if reencoded {
            debug!(quality = self.quality.value(), "Applying lossy quality round trip");
            pixels = jpeg_round_trip(&pixels, self.quality.value())
                .map_err(|e| DecodeError::new(&source_path, e))?;
        }

        Ok(NormalizedImage {
            pixels,
            source_path,
            original_format: pixel_format,
            reencoded,
        })
    }
}

/// Blend every pixel over an opaque white canvas of the same size.
pub fn composite_on_white(rgba: &RgbaImage) -> RgbImage {
    RgbImage::from_fn(rgba.width(), rgba.height(), |x, y| {
        let [r, g, b, a] = rgba.get_pixel(x, y).0;
        let alpha = u16::from(a);
        let blend = |c: u8| ((u16::from(c) * alpha + 255 * (255 - alpha) + 127) / 255) as u8;
        Rgb([blend(r), blend(g), blend(b)])
    })
}

/// Encode RGB pixels as a baseline JPEG at the given quality.
pub(crate) fn encode_jpeg(pixels: &RgbImage, quality: u8) -> Result<Vec<u8>, image::ImageError> {
    let mut buffer = Vec::new();
    JpegEncoder::new_with_quality(&mut buffer, quality).encode_image(pixels)?;
    Ok(buffer)
}

fn jpeg_round_trip(pixels: &RgbImage, quality: u8) -> Result<RgbImage, image::ImageError> {
    let encoded = encode_jpeg(pixels, quality)?;
    Ok(image::load_from_memory_with_format(&encoded, ImageFormat::Jpeg)?.into_rgb8())
}

fn png_file_is_indexed(path: &Path) -> bool {
    let mut header = [0u8; 26];
    File::open(path)
        .and_then(|mut f| f.read_exact(&mut header))
        .map(|_| png_header_is_indexed(&header))
        .unwrap_or(false)
}

/// Inspect the IHDR chunk of a PNG stream for the indexed colour type.
fn png_header_is_indexed(header: &[u8]) -> bool {
    header.len() >= 26
        && header[..8] == PNG_SIGNATURE
        && &header[12..16] == b"IHDR"
        && header[25] == PNG_COLOR_TYPE_INDEXED
}
