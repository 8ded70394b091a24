use clap::Parser;
use imgpdf::{ConverterOptions, ImageConverter};
use std::path::PathBuf;
use std::sync::Arc;

const BYTES_PER_MB: usize = 1024 * 1024;

/// Server configuration, from command-line flags or the environment
#[derive(Debug, Clone, Parser)]
#[command(
    name = "imgpdf-api",
    about = "HTTP service that converts uploaded images into PDF documents",
    version
)]
pub struct ServerConfig {
    /// Address to bind
    #[arg(long, env = "IMGPDF_HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Port to listen on
    #[arg(short, long, env = "PORT", default_value_t = 8000)]
    pub port: u16,

    /// Root directory for per-request scratch space (defaults to the system temp dir)
    #[arg(long, env = "IMGPDF_SCRATCH_DIR")]
    pub scratch_dir: Option<PathBuf>,

    /// Maximum request body size in MiB
    #[arg(long, env = "IMGPDF_MAX_UPLOAD_MB", default_value_t = 100)]
    pub max_upload_mb: usize,

    /// Number of images decoded in parallel per request
    #[arg(long, env = "IMGPDF_WORKERS")]
    pub workers: Option<usize>,
}

impl ServerConfig {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn scratch_root(&self) -> PathBuf {
        self.scratch_dir
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join("imgpdf"))
    }

    pub fn max_upload_bytes(&self) -> usize {
        self.max_upload_mb.max(1).saturating_mul(BYTES_PER_MB)
    }

    pub fn converter_options(&self) -> ConverterOptions {
        match self.workers {
            Some(workers) => ConverterOptions::default().with_parallelism(workers),
            None => ConverterOptions::default(),
        }
    }
}

/// Shared handler state
#[derive(Debug, Clone)]
pub struct AppState {
    inner: Arc<StateInner>,
}

#[derive(Debug)]
struct StateInner {
    scratch_root: PathBuf,
    converter: ImageConverter,
    max_upload_bytes: usize,
}

impl AppState {
    /// State with default converter options and a 100 MiB body limit.
    pub fn new(scratch_root: impl Into<PathBuf>) -> Self {
        Self::with_options(scratch_root, ConverterOptions::default(), 100 * BYTES_PER_MB)
    }

    pub fn with_options(
        scratch_root: impl Into<PathBuf>,
        options: ConverterOptions,
        max_upload_bytes: usize,
    ) -> Self {
        Self {
            inner: Arc::new(StateInner {
                scratch_root: scratch_root.into(),
                converter: ImageConverter::new(options),
                max_upload_bytes,
            }),
        }
    }

    pub fn from_config(config: &ServerConfig) -> Self {
        Self::with_options(
            config.scratch_root(),
            config.converter_options(),
            config.max_upload_bytes(),
        )
    }

    pub fn scratch_root(&self) -> &std::path::Path {
        &self.inner.scratch_root
    }

    pub fn converter(&self) -> &ImageConverter {
        &self.inner.converter
    }

    pub fn max_upload_bytes(&self) -> usize {
        self.inner.max_upload_bytes
    }
}
