//! Conversion orchestration
//!
//! Runs the normalizer over every input and hands the survivors to the
//! assembler, either as one merged document or as one document per image.
//! Inputs that fail to decode are skipped; the request only fails when
//! nothing at all could be converted.

use crate::assemble::{AssembleOptions, PdfAssembler};
use crate::error::{ConversionError, DecodeError, Result};
use crate::normalize::{ImageNormalizer, NormalizedImage};
use crate::request::{
    CancelFlag, ConversionRequest, ConversionResult, NamedPdf, OutputMode, SourceImage,
};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use tracing::{debug, info, warn};

/// Options for the converter
#[derive(Debug, Clone, Copy)]
pub struct ConverterOptions {
    /// Maximum number of images decoded at the same time
    pub parallelism: usize,
    /// Page layout and embedding options
    pub assemble: AssembleOptions,
}

impl Default for ConverterOptions {
    fn default() -> Self {
        Self {
            parallelism: num_cpus::get().min(8),
            assemble: AssembleOptions::default(),
        }
    }
}

impl ConverterOptions {
    /// Set the number of parallel normalization workers
    pub fn with_parallelism(mut self, parallelism: usize) -> Self {
        self.parallelism = parallelism.max(1);
        self
    }

    pub fn with_assemble_options(mut self, assemble: AssembleOptions) -> Self {
        self.assemble = assemble;
        self
    }
}

/// Image to PDF converter
#[derive(Debug, Clone, Default)]
pub struct ImageConverter {
    options: ConverterOptions,
}

impl ImageConverter {
    pub fn new(options: ConverterOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &ConverterOptions {
        &self.options
    }

    /// Convert the request's images according to its mode.
    ///
    /// Page order follows `request.sources` exactly. On error every PDF
    /// produced so far is deleted before returning.
    pub fn convert(&self, request: &ConversionRequest) -> Result<ConversionResult> {
        if request.sources.is_empty() {
            return Err(ConversionError::NoInput);
        }

        info!(
            mode = %request.mode,
            inputs = request.sources.len(),
            quality = request.quality.value(),
            "Starting conversion"
        );

        let normalizer = ImageNormalizer::new(request.quality);
        let assembler = PdfAssembler::new(self.options.assemble);

        let result = match request.mode {
            OutputMode::Merged => self.convert_merged(request, &normalizer, &assembler),
            OutputMode::Individual => self.convert_individual(request, &normalizer, &assembler),
        }?;

        info!(
            mode = %request.mode,
            converted = result.converted_count(),
            skipped = request.sources.len() - result.converted_count(),
            "Conversion finished"
        );
        Ok(result)
    }

    fn convert_merged(
        &self,
        request: &ConversionRequest,
        normalizer: &ImageNormalizer,
        assembler: &PdfAssembler,
    ) -> Result<ConversionResult> {
        let images: Vec<NormalizedImage> = self
            .normalize_batch(&request.sources, normalizer, &request.cancel)?
            .into_iter()
            .zip(&request.sources)
            .filter_map(|(result, source)| keep_or_skip(result, source))
            .collect();

        if images.is_empty() {
            return Err(ConversionError::NoValidImages);
        }
        ensure_not_cancelled(&request.cancel, &[])?;

        let output = request.merged_output_path();
        let pdf = assembler.assemble(&images, &output, request.quality)?;
        ensure_not_cancelled(&request.cancel, &[pdf.path.clone()])?;

        Ok(ConversionResult::Merged {
            pdf: pdf.path,
            pages: pdf.pages,
        })
    }

    fn convert_individual(
        &self,
        request: &ConversionRequest,
        normalizer: &ImageNormalizer,
        assembler: &PdfAssembler,
    ) -> Result<ConversionResult> {
        let normalized = self.normalize_batch(&request.sources, normalizer, &request.cancel)?;
        let pdfs = assemble_each(request, normalized, assembler)?;

        if pdfs.is_empty() {
            return Err(ConversionError::NoValidImages);
        }
        Ok(ConversionResult::Individual { pdfs })
    }

    /// Normalize every source on a bounded set of scoped workers.
    ///
    /// The returned vector lines up index-for-index with `sources`.
    fn normalize_batch(
        &self,
        sources: &[SourceImage],
        normalizer: &ImageNormalizer,
        cancel: &CancelFlag,
    ) -> Result<Vec<std::result::Result<NormalizedImage, DecodeError>>> {
        let workers = self.options.parallelism.clamp(1, sources.len().max(1));
        let next = AtomicUsize::new(0);
        let mut slots: Vec<Option<std::result::Result<NormalizedImage, DecodeError>>> =
            sources.iter().map(|_| None).collect();

        debug!(inputs = sources.len(), workers, "Normalizing images");

        thread::scope(|scope| {
            let handles: Vec<_> = (0..workers)
                .map(|_| {
                    scope.spawn(|| {
                        let mut done = Vec::new();
                        while !cancel.is_cancelled() {
                            let index = next.fetch_add(1, Ordering::SeqCst);
                            let Some(source) = sources.get(index) else {
                                break;
                            };
                            debug!(
                                position = index + 1,
                                total = sources.len(),
                                source = %source.display_name,
                                "Normalizing"
                            );
                            done.push((index, normalizer.normalize(&source.path)));
                        }
                        done
                    })
                })
                .collect();

            for handle in handles {
                match handle.join() {
                    Ok(done) => {
                        for (index, result) in done {
                            slots[index] = Some(result);
                        }
                    }
                    Err(_) => warn!("Normalization worker panicked"),
                }
            }
        });

        if cancel.is_cancelled() {
            return Err(ConversionError::Cancelled);
        }

        Ok(slots
            .into_iter()
            .zip(sources)
            .map(|(slot, source)| {
                slot.unwrap_or_else(|| {
                    Err(DecodeError::new(&source.path, "normalization worker panicked"))
                })
            })
            .collect())
    }
}

/// Convert with default options.
pub fn convert_images(request: &ConversionRequest) -> Result<ConversionResult> {
    ImageConverter::default().convert(request)
}

/// One single-page PDF per normalized image; decode or assembly failures
/// drop only that image. The cancel flag is checked before every assembly
/// and once more after the last one.
fn assemble_each(
    request: &ConversionRequest,
    normalized: Vec<std::result::Result<NormalizedImage, DecodeError>>,
    assembler: &PdfAssembler,
) -> Result<Vec<NamedPdf>> {
    let mut pdfs: Vec<NamedPdf> = Vec::new();

    for (index, (result, source)) in normalized.into_iter().zip(&request.sources).enumerate() {
        let Some(image) = keep_or_skip(result, source) else {
            continue;
        };
        ensure_not_cancelled(&request.cancel, &output_paths(&pdfs))?;

        let stem = source.display_stem();
        let output = request.output_dir.join(format!("{index:04}-{stem}.pdf"));
        match assembler.assemble(std::slice::from_ref(&image), &output, request.quality) {
            Ok(pdf) => pdfs.push(NamedPdf {
                name: format!("{stem}.pdf"),
                path: pdf.path,
            }),
            Err(e) => warn!(
                source = %source.display_name,
                error = %e,
                "Skipping image: PDF assembly failed"
            ),
        }
    }

    ensure_not_cancelled(&request.cancel, &output_paths(&pdfs))?;
    Ok(pdfs)
}

fn output_paths(pdfs: &[NamedPdf]) -> Vec<PathBuf> {
    pdfs.iter().map(|p| p.path.clone()).collect()
}

fn keep_or_skip(
    result: std::result::Result<NormalizedImage, DecodeError>,
    source: &SourceImage,
) -> Option<NormalizedImage> {
    match result {
        Ok(image) => Some(image),
        Err(e) => {
            warn!(source = %source.display_name, error = %e, "Skipping image");
            None
        }
    }
}

fn ensure_not_cancelled(cancel: &CancelFlag, produced: &[PathBuf]) -> Result<()> {
    if cancel.is_cancelled() {
        discard(produced);
        return Err(ConversionError::Cancelled);
    }
    Ok(())
}

fn discard(paths: &[PathBuf]) {
    for path in paths {
        remove_quietly(path);
    }
}

fn remove_quietly(path: &Path) {
    if let Err(e) = fs::remove_file(path) {
        warn!(path = %path.display(), error = %e, "Failed to remove output");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::Quality;
    use image::{DynamicImage, Rgb, RgbImage};
    use tempfile::TempDir;

    fn write_png(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        DynamicImage::ImageRgb8(RgbImage::from_pixel(12, 8, Rgb([1, 2, 3])))
            .save(&path)
            .unwrap();
        path
    }

    #[test]
    fn test_converter_options_default() {
        let options = ConverterOptions::default();
        assert!(options.parallelism >= 1);
        assert!(options.parallelism <= 8);
        assert_eq!(options.assemble, AssembleOptions::default());
        assert_eq!(ConverterOptions::default().with_parallelism(0).parallelism, 1);
    }

    #[test]
    fn test_empty_request_is_no_input() {
        let out = TempDir::new().unwrap();
        let request = ConversionRequest::new(Vec::new(), out.path());
        let err = ImageConverter::default().convert(&request).unwrap_err();
        assert!(matches!(err, ConversionError::NoInput));
    }

    #[test]
    fn test_normalize_batch_preserves_order() {
        let dir = TempDir::new().unwrap();
        let sources: Vec<SourceImage> = (0..6)
            .map(|i| {
                if i == 2 {
                    SourceImage::new(dir.path().join("missing.png"))
                } else {
                    SourceImage::new(write_png(dir.path(), &format!("{i}.png")))
                }
            })
            .collect();

        let converter = ImageConverter::new(ConverterOptions::default().with_parallelism(3));
        let results = converter
            .normalize_batch(&sources, &ImageNormalizer::default(), &CancelFlag::new())
            .unwrap();

        assert_eq!(results.len(), 6);
        for (i, (result, source)) in results.iter().zip(&sources).enumerate() {
            if i == 2 {
                assert!(result.is_err());
            } else {
                assert_eq!(result.as_ref().unwrap().source_path(), source.path.as_path());
            }
        }
    }

    #[test]
    fn test_assemble_each_checks_cancel_after_loop() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("missing.png");
        let request = ConversionRequest::new(vec![SourceImage::new(&missing)], dir.path())
            .with_mode(OutputMode::Individual);
        request.cancel.cancel();

        // Nothing reaches assembly, so only the final check can notice the flag.
        let normalized = vec![Err(DecodeError::new(&missing, "gone"))];
        let err = assemble_each(&request, normalized, &PdfAssembler::default()).unwrap_err();
        assert!(matches!(err, ConversionError::Cancelled));
    }

    #[test]
    fn test_assemble_each_cancelled_mid_batch_removes_outputs() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("out");
        let request = ConversionRequest::new(
            vec![
                SourceImage::new(write_png(dir.path(), "a.png")),
                SourceImage::new(write_png(dir.path(), "b.png")),
            ],
            &out,
        )
        .with_mode(OutputMode::Individual);

        let converter = ImageConverter::default();
        let normalized = converter
            .normalize_batch(&request.sources, &ImageNormalizer::default(), &request.cancel)
            .unwrap();
        let pdfs = assemble_each(&request, normalized, &PdfAssembler::default()).unwrap();
        assert_eq!(pdfs.len(), 2);
        assert!(pdfs.iter().all(|p| p.path.exists()));

        request.cancel.cancel();
        let err = ensure_not_cancelled(&request.cancel, &output_paths(&pdfs)).unwrap_err();
        assert!(matches!(err, ConversionError::Cancelled));
        assert!(pdfs.iter().all(|p| !p.path.exists()));
    }

    #[test]
    fn test_cancelled_request_produces_nothing() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("out");
        let cancel = CancelFlag::new();
        cancel.cancel();

        let request = ConversionRequest::new(
            vec![SourceImage::new(write_png(dir.path(), "a.png"))],
            &out,
        )
        .with_cancel_flag(cancel)
        .with_quality(Quality::new(90));

        let err = ImageConverter::default().convert(&request).unwrap_err();
        assert!(matches!(err, ConversionError::Cancelled));
        assert!(!out.exists());
    }
}
