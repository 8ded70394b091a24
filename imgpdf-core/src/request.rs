//! Conversion request and result types

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Base name used when the requested one is empty after sanitizing.
pub const DEFAULT_BASE_NAME: &str = "converted";

/// Lossy encoding quality, always within `1..=100`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Quality(u8);

impl Quality {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 100;
    pub const DEFAULT: u8 = 95;

    /// Clamp any integer into the valid range: `max(1, min(100, q))`.
    pub fn new(quality: i64) -> Self {
        Self(quality.clamp(Self::MIN as i64, Self::MAX as i64) as u8)
    }

    pub fn value(self) -> u8 {
        self.0
    }
}

impl Default for Quality {
    fn default() -> Self {
        Self(Self::DEFAULT)
    }
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How the inputs are turned into PDFs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputMode {
    /// All images as pages of one document
    #[default]
    Merged,
    /// One single-page document per image
    Individual,
}

impl OutputMode {
    pub fn as_str(self) -> &'static str {
        match self {
            OutputMode::Merged => "merged",
            OutputMode::Individual => "individual",
        }
    }

    /// Lenient parse: anything other than `individual` means merged.
    pub fn from_str_or_default(s: &str) -> Self {
        s.parse().unwrap_or_default()
    }
}

impl FromStr for OutputMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "merged" => Ok(OutputMode::Merged),
            "individual" => Ok(OutputMode::Individual),
            other => Err(format!("Unknown output mode: {other}")),
        }
    }
}

impl fmt::Display for OutputMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One input image: where it is on disk and what the user called it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceImage {
    pub path: PathBuf,
    pub display_name: String,
}

impl SourceImage {
    /// Create a source whose display name is taken from the path.
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        let path = path.into();
        let display_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self { path, display_name }
    }

    /// Create a source stored at `path` but known to the user as `display_name`.
    pub fn with_name<P: Into<PathBuf>>(path: P, display_name: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            display_name: display_name.into(),
        }
    }

    /// File stem of the display name, used to name the per-image PDF.
    pub fn display_stem(&self) -> String {
        Path::new(&self.display_name)
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| DEFAULT_BASE_NAME.to_string())
    }

    /// Stable sort by display name, for callers that want filename order.
    pub fn sort_by_display_name(sources: &mut [SourceImage]) {
        sources.sort_by(|a, b| a.display_name.cmp(&b.display_name));
    }
}

/// Shared flag used to abandon an in-flight conversion
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Everything the converter needs for one request
#[derive(Debug, Clone)]
pub struct ConversionRequest {
    pub sources: Vec<SourceImage>,
    pub mode: OutputMode,
    pub base_name: String,
    pub quality: Quality,
    /// Directory that receives the generated PDFs
    pub output_dir: PathBuf,
    pub cancel: CancelFlag,
}

impl ConversionRequest {
    pub fn new(sources: Vec<SourceImage>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            sources,
            mode: OutputMode::default(),
            base_name: DEFAULT_BASE_NAME.to_string(),
            quality: Quality::default(),
            output_dir: output_dir.into(),
            cancel: CancelFlag::new(),
        }
    }

    pub fn with_mode(mut self, mode: OutputMode) -> Self {
        self.mode = mode;
        self
    }

    /// Set the output base name; it is sanitized on the way in.
    pub fn with_base_name(mut self, base_name: &str) -> Self {
        self.base_name = sanitize_base_name(base_name);
        self
    }

    pub fn with_quality(mut self, quality: Quality) -> Self {
        self.quality = quality;
        self
    }

    pub fn with_cancel_flag(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    /// Path of the merged document.
    pub fn merged_output_path(&self) -> PathBuf {
        self.output_dir.join(format!("{}.pdf", self.base_name))
    }
}

/// A generated single-image PDF and the name it should be delivered under
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamedPdf {
    pub name: String,
    pub path: PathBuf,
}

/// Output of a successful conversion
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConversionResult {
    Merged { pdf: PathBuf, pages: usize },
    Individual { pdfs: Vec<NamedPdf> },
}

impl ConversionResult {
    /// Number of images that made it into the output.
    pub fn converted_count(&self) -> usize {
        match self {
            ConversionResult::Merged { pages, .. } => *pages,
            ConversionResult::Individual { pdfs } => pdfs.len(),
        }
    }

    pub fn mode(&self) -> OutputMode {
        match self {
            ConversionResult::Merged { .. } => OutputMode::Merged,
            ConversionResult::Individual { .. } => OutputMode::Individual,
        }
    }

    /// Every file this result refers to.
    pub fn paths(&self) -> Vec<&Path> {
        match self {
            ConversionResult::Merged { pdf, .. } => vec![pdf.as_path()],
            ConversionResult::Individual { pdfs } => pdfs.iter().map(|p| p.path.as_path()).collect(),
        }
    }
}

/// Keep letters and digits (any script), space, `-` and `_`; trim; fall back
/// to `converted`.
pub fn sanitize_base_name(name: &str) -> String {
    let kept: String = name
        .chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, ' ' | '-' | '_'))
        .collect();
    let trimmed = kept.trim();
    if trimmed.is_empty() {
        DEFAULT_BASE_NAME.to_string()
    } else {
        trimmed.to_string()
    }
}
