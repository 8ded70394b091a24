use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use imgpdf::{
    formats, write_zip, AssembleOptions, ConversionRequest, ConversionResult, ConverterOptions,
    ImageConverter, ImageNormalizer, OutputMode, Quality, ScratchSpace, SourceImage,
};
use std::fs;
use std::path::PathBuf;
use tracing::warn;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(
    name = "imgpdf",
    about = "Convert images into PDF documents",
    version,
    author
)]
struct Cli {
    /// Print debug logging to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Convert images into one merged PDF or a ZIP of per-image PDFs
    Convert {
        /// Input image files (JPEG, PNG, BMP, GIF, WebP, TIFF)
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Output path: a PDF in merged mode, a ZIP in individual mode
        #[arg(short, long)]
        output: PathBuf,

        /// Output mode: merged or individual
        #[arg(short, long, default_value = "merged")]
        mode: OutputMode,

        /// Image quality (1-100); values below 95 re-encode lossily
        #[arg(short, long, default_value_t = 95, allow_negative_numbers = true)]
        quality: i64,

        /// Sort inputs by file name before converting
        #[arg(long)]
        sort: bool,

        /// Page resolution used to size each page
        #[arg(long, default_value_t = imgpdf::DEFAULT_DPI)]
        dpi: f64,
    },

    /// Show the pixel format and dimensions of an image
    Inspect {
        /// Input image file
        input: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Convert {
            files,
            output,
            mode,
            quality,
            sort,
            dpi,
        } => {
            let mut sources: Vec<SourceImage> = files
                .into_iter()
                .filter(|path| {
                    let supported = formats::is_supported_path(path);
                    if !supported {
                        warn!(path = %path.display(), "Skipping unsupported file type");
                    }
                    supported
                })
                .map(SourceImage::new)
                .collect();

            if sources.is_empty() {
                bail!("No supported image files given");
            }
            if sort {
                SourceImage::sort_by_display_name(&mut sources);
            }

            let options = ConverterOptions::default()
                .with_assemble_options(AssembleOptions::default().with_dpi(dpi));
            let converter = ImageConverter::new(options);
            let scratch = ScratchSpace::new().context("Failed to create scratch directory")?;

            let base_name = output
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default();
            let request = ConversionRequest::new(sources, scratch.output_dir())
                .with_mode(mode)
                .with_base_name(&base_name)
                .with_quality(Quality::new(quality));

            let result = converter
                .convert(&request)
                .context("Failed to convert images")?;

            if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }

            match result {
                ConversionResult::Merged { pdf, pages } => {
                    fs::copy(&pdf, &output)
                        .with_context(|| format!("Failed to write {}", output.display()))?;
                    println!("✓ Created {} ({} pages)", output.display(), pages);
                }
                ConversionResult::Individual { pdfs } => {
                    write_zip(&pdfs, &output)
                        .with_context(|| format!("Failed to write {}", output.display()))?;
                    println!("✓ Created {} ({} PDFs)", output.display(), pdfs.len());
                }
            }

            scratch
                .close()
                .context("Failed to remove scratch directory")?;
        }

        Commands::Inspect { input } => {
            let asset = ImageNormalizer::default()
                .inspect(&input)
                .with_context(|| format!("Failed to read {}", input.display()))?;
            let (width, height) = asset.dimensions();

            println!("Image Information for: {}", input.display());
            println!("==========================================");
            if let Some(format) = asset.source_format() {
                println!("Format: {:?}", format);
            }
            println!("Pixel format: {}", asset.pixel_format());
            println!("Dimensions: {}x{}", width, height);
            println!(
                "Composited onto white: {}",
                if asset.pixel_format().needs_compositing() {
                    "yes"
                } else {
                    "no"
                }
            );
        }
    }

    Ok(())
}

fn init_tracing(verbose: bool) {
    let default_filter = if verbose {
        "imgpdf=debug,imgpdf_cli=debug"
    } else {
        "imgpdf=info,imgpdf_cli=info"
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
