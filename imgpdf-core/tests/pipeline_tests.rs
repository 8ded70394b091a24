//! End-to-end tests for the image → PDF pipeline
//!
//! Covers:
//! - Merged and individual conversion
//! - Skipping undecodable inputs
//! - All-failure handling
//! - Scratch space cleanup

use image::{DynamicImage, Rgb, RgbImage, Rgba, RgbaImage};
use imgpdf::{
    write_zip, ConversionError, ConversionRequest, ConversionResult, ConverterOptions,
    ImageConverter, OutputMode, Quality, ScratchSpace, SourceImage,
};
use oxidize_pdf::parser::{PdfDocument, PdfReader};
use pretty_assertions::assert_eq;
use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use zip::ZipArchive;

fn write_rgba_png(dir: &Path, name: &str) -> PathBuf {
    let path = dir.join(name);
    let img = RgbaImage::from_fn(40, 30, |x, _| Rgba([200, 10, 10, (x * 6) as u8]));
    DynamicImage::ImageRgba8(img).save(&path).unwrap();
    path
}

fn write_rgb_jpeg(dir: &Path, name: &str) -> PathBuf {
    let path = dir.join(name);
    let img = RgbImage::from_fn(32, 48, |x, y| Rgb([x as u8 * 4, y as u8 * 4, 128]));
    DynamicImage::ImageRgb8(img).save(&path).unwrap();
    path
}

fn write_gif(dir: &Path, name: &str) -> PathBuf {
    let path = dir.join(name);
    let img = RgbaImage::from_pixel(20, 20, Rgba([0, 128, 0, 255]));
    DynamicImage::ImageRgba8(img).save(&path).unwrap();
    path
}

fn write_garbage(dir: &Path, name: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, b"this is not an image").unwrap();
    path
}

fn page_count(path: &Path) -> u32 {
    let reader = PdfReader::open(path).expect("generated PDF should parse");
    PdfDocument::new(reader)
        .page_count()
        .expect("should get page count")
}

/// Width and height of every page, in document order.
fn page_sizes(path: &Path) -> Vec<(f64, f64)> {
    let document = PdfDocument::new(PdfReader::open(path).expect("generated PDF should parse"));
    let count = document.page_count().expect("should get page count");
    (0..count)
        .map(|index| {
            let page = document.get_page(index).expect("page should load");
            (page.width(), page.height())
        })
        .collect()
}

fn assert_close(actual: (f64, f64), expected: (f64, f64)) {
    assert!(
        (actual.0 - expected.0).abs() < 0.01 && (actual.1 - expected.1).abs() < 0.01,
        "page size {actual:?} != {expected:?}"
    );
}

fn converter() -> ImageConverter {
    ImageConverter::new(ConverterOptions::default().with_parallelism(2))
}

#[test]
fn test_merged_three_formats_in_order() {
    let dir = TempDir::new().unwrap();
    let out = dir.path().join("out");
    let sources = vec![
        SourceImage::new(write_rgba_png(dir.path(), "a.png")),
        SourceImage::new(write_rgb_jpeg(dir.path(), "b.jpg")),
        SourceImage::new(write_gif(dir.path(), "c.gif")),
    ];

    let request = ConversionRequest::new(sources, &out)
        .with_mode(OutputMode::Merged)
        .with_base_name("album")
        .with_quality(Quality::new(80));

    let result = converter().convert(&request).unwrap();
    match &result {
        ConversionResult::Merged { pdf, pages } => {
            assert_eq!(*pages, 3);
            assert_eq!(pdf, &out.join("album.pdf"));
            assert_eq!(page_count(pdf), 3);

            // 40x30, 32x48 and 20x20 pixels at 150 DPI
            let sizes = page_sizes(pdf);
            assert_eq!(sizes.len(), 3);
            assert_close(sizes[0], (19.2, 14.4));
            assert_close(sizes[1], (15.36, 23.04));
            assert_close(sizes[2], (9.6, 9.6));
        }
        other => panic!("Expected merged result, got {other:?}"),
    }
    assert_eq!(result.converted_count(), 3);
}

#[test]
fn test_merged_order_follows_request_not_file_names() {
    let dir = TempDir::new().unwrap();
    let out = dir.path().join("out");
    let sources = vec![
        SourceImage::new(write_gif(dir.path(), "z.gif")),
        SourceImage::new(write_rgba_png(dir.path(), "a.png")),
    ];

    let request = ConversionRequest::new(sources, &out);
    let result = converter().convert(&request).unwrap();

    let sizes = page_sizes(&out.join("converted.pdf"));
    assert_eq!(result.converted_count(), 2);
    assert_close(sizes[0], (9.6, 9.6));
    assert_close(sizes[1], (19.2, 14.4));
}

#[test]
fn test_merged_assembly_failure_is_encode_error() {
    let dir = TempDir::new().unwrap();
    let out = dir.path().join("out");
    // A directory squatting on the output path makes the PDF write fail.
    fs::create_dir_all(out.join("blocked.pdf")).unwrap();

    let sources = vec![
        SourceImage::new(write_rgb_jpeg(dir.path(), "a.jpg")),
        SourceImage::new(write_rgba_png(dir.path(), "b.png")),
    ];
    let request = ConversionRequest::new(sources, &out).with_base_name("blocked");

    let err = converter().convert(&request).unwrap_err();
    assert!(matches!(err, ConversionError::Encode(_)), "got {err:?}");
    assert_eq!(err.kind(), "encode_error");

    let files: Vec<PathBuf> = fs::read_dir(&out)
        .unwrap()
        .map(|entry| entry.unwrap().path())
        .filter(|path| path.is_file())
        .collect();
    assert!(files.is_empty(), "unexpected outputs: {files:?}");
}

#[test]
fn test_merged_skips_undecodable_inputs() {
    let dir = TempDir::new().unwrap();
    let out = dir.path().join("out");
    let sources = vec![
        SourceImage::new(write_garbage(dir.path(), "broken.png")),
        SourceImage::new(write_rgb_jpeg(dir.path(), "ok.jpg")),
        SourceImage::new(dir.path().join("missing.bmp")),
    ];

    let request = ConversionRequest::new(sources, &out);
    let result = converter().convert(&request).unwrap();

    match result {
        ConversionResult::Merged { pdf, pages } => {
            assert_eq!(pages, 1);
            assert_eq!(page_count(&pdf), 1);
        }
        other => panic!("Expected merged result, got {other:?}"),
    }
}

#[test]
fn test_all_inputs_failing_is_no_valid_images() {
    let dir = TempDir::new().unwrap();
    let out = dir.path().join("out");
    let sources = vec![
        SourceImage::new(write_garbage(dir.path(), "one.jpg")),
        SourceImage::new(write_garbage(dir.path(), "two.png")),
    ];

    for mode in [OutputMode::Merged, OutputMode::Individual] {
        let request = ConversionRequest::new(sources.clone(), &out).with_mode(mode);
        let err = converter().convert(&request).unwrap_err();
        assert!(
            matches!(err, ConversionError::NoValidImages),
            "{mode}: unexpected error {err:?}"
        );
        let leftovers = fs::read_dir(&out).map(|d| d.count()).unwrap_or(0);
        assert_eq!(leftovers, 0, "{mode}: no outputs should remain");
    }
}

#[test]
fn test_individual_produces_single_page_pdfs() {
    let dir = TempDir::new().unwrap();
    let out = dir.path().join("out");
    let sources = vec![
        SourceImage::with_name(write_rgba_png(dir.path(), "upload-0.png"), "sunset.png"),
        SourceImage::with_name(write_garbage(dir.path(), "upload-1.jpg"), "corrupt.jpg"),
        SourceImage::with_name(write_rgb_jpeg(dir.path(), "upload-2.jpg"), "beach.jpeg"),
    ];

    let request = ConversionRequest::new(sources, &out)
        .with_mode(OutputMode::Individual)
        .with_quality(Quality::new(60));

    let result = converter().convert(&request).unwrap();
    let pdfs = match result {
        ConversionResult::Individual { pdfs } => pdfs,
        other => panic!("Expected individual result, got {other:?}"),
    };

    let names: Vec<&str> = pdfs.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, vec!["sunset.pdf", "beach.pdf"]);
    for pdf in &pdfs {
        assert_eq!(page_count(&pdf.path), 1);
    }

    let zip_path = dir.path().join("bundle.zip");
    write_zip(&pdfs, &zip_path).unwrap();
    let mut archive = ZipArchive::new(File::open(&zip_path).unwrap()).unwrap();
    assert_eq!(archive.len(), 2);
    let mut header = [0u8; 4];
    archive
        .by_name("sunset.pdf")
        .unwrap()
        .read_exact(&mut header)
        .unwrap();
    assert_eq!(&header, b"%PDF");
}

#[test]
fn test_individual_with_shared_stems_keeps_both() {
    let dir = TempDir::new().unwrap();
    let out = dir.path().join("out");
    let sources = vec![
        SourceImage::with_name(write_rgb_jpeg(dir.path(), "u0.jpg"), "photo.jpg"),
        SourceImage::with_name(write_rgba_png(dir.path(), "u1.png"), "photo.png"),
    ];

    let request = ConversionRequest::new(sources, &out).with_mode(OutputMode::Individual);
    let result = converter().convert(&request).unwrap();
    assert_eq!(result.converted_count(), 2);

    let paths = result.paths();
    assert_ne!(paths[0], paths[1]);
    assert!(paths.iter().all(|p| p.exists()));
}

#[test]
fn test_scratch_space_cleanup_after_conversion() {
    let root = TempDir::new().unwrap();
    let image_dir = TempDir::new().unwrap();
    let png = fs::read(write_rgba_png(image_dir.path(), "a.png")).unwrap();
    let jpg = fs::read(write_rgb_jpeg(image_dir.path(), "b.jpg")).unwrap();

    {
        let mut scratch = ScratchSpace::new_in(root.path()).unwrap();
        let sources = vec![
            scratch.store_upload("a.png", &png).unwrap(),
            scratch.store_upload("b.jpg", &jpg).unwrap(),
        ];
        let request = ConversionRequest::new(sources, scratch.output_dir()).with_base_name("x");
        let result = converter().convert(&request).unwrap();
        assert_eq!(result.converted_count(), 2);
        assert!(result.paths()[0].starts_with(scratch.path()));
    }

    assert_eq!(fs::read_dir(root.path()).unwrap().count(), 0);
}

#[test]
fn test_repeated_conversion_has_same_page_count() {
    let dir = TempDir::new().unwrap();
    let sources = vec![
        SourceImage::new(write_rgb_jpeg(dir.path(), "a.jpg")),
        SourceImage::new(write_gif(dir.path(), "b.gif")),
    ];

    let first = ConversionRequest::new(sources.clone(), dir.path().join("first"));
    let second = ConversionRequest::new(sources, dir.path().join("second"));
    let a = converter().convert(&first).unwrap();
    let b = converter().convert(&second).unwrap();
    assert_eq!(a.converted_count(), b.converted_count());
}
