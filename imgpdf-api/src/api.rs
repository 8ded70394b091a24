use crate::config::AppState;
use axum::{
    body::Bytes,
    extract::{multipart::MultipartError, DefaultBodyLimit, Json, Multipart, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use imgpdf::{
    formats, zip_to_vec, ArchiveError, CancelFlag, ConversionError, ConversionRequest,
    ConversionResult, ImageConverter, OutputMode, Quality, ScratchSpace, SourceImage,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{debug, error, info, warn};

/// Standard error response structure
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Human-readable error message describing what went wrong
    pub error: String,
    /// Machine-readable classification (`bad_request`, `no_valid_images`, ...)
    pub kind: String,
}

/// Summary sent with every successful conversion in the `X-Conversion-Info` header
#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct ConversionInfo {
    /// `merged` or `individual`
    pub mode: String,
    /// Number of file parts received, including empty ones
    pub files_received: usize,
    /// Number of images that made it into the output
    pub files_converted: usize,
    /// Page count of the merged document
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pages: Option<usize>,
}

/// Response for the health endpoint
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
    pub timestamp: String,
    pub features: Vec<String>,
    pub scratch_dir: String,
}

/// Application-specific error types for the API
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// The upload was rejected before conversion started
    #[error("{0}")]
    BadRequest(String),
    /// The multipart body could not be read
    #[error("Failed to read upload: {0}")]
    Multipart(#[from] MultipartError),
    /// Conversion failed as a whole
    #[error(transparent)]
    Conversion(#[from] ConversionError),
    /// Individual PDFs could not be bundled
    #[error("Failed to build ZIP archive: {0}")]
    Archive(#[from] ArchiveError),
    /// I/O errors (scratch space, reading results)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// Anything else, such as a failed blocking task
    #[error("{0}")]
    Internal(String),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Multipart(e) => e.status(),
            AppError::Conversion(ConversionError::NoInput) => StatusCode::BAD_REQUEST,
            AppError::Conversion(ConversionError::NoValidImages) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            AppError::Conversion(_)
            | AppError::Archive(_)
            | AppError::Io(_)
            | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            AppError::BadRequest(_) => "bad_request",
            AppError::Multipart(_) => "invalid_upload",
            AppError::Conversion(e) => e.kind(),
            AppError::Archive(_) => "archive_error",
            AppError::Io(_) => "io_error",
            AppError::Internal(_) => "internal_error",
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(kind = self.kind(), error = %self, "Conversion request failed");
        } else {
            warn!(kind = self.kind(), error = %self, "Conversion request rejected");
        }

        let error_response = ErrorResponse {
            error: self.to_string(),
            kind: self.kind().to_string(),
        };

        (status, Json(error_response)).into_response()
    }
}

/// Build the application router with all routes configured
pub fn app(state: AppState) -> Router {
    let body_limit = state.max_upload_bytes();
    Router::new()
        .route("/convert", post(convert_images))
        .route("/health", get(health_check))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Health check endpoint for monitoring and load balancing
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "healthy".to_string(),
        service: "imgpdf API".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
        features: ["merged_pdf", "individual_pdf", "zip_download"]
            .iter()
            .map(|f| f.to_string())
            .collect(),
        scratch_dir: state.scratch_root().display().to_string(),
    })
}

/// Convert uploaded images into a merged PDF or a ZIP of individual PDFs
pub async fn convert_images(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Response, AppError> {
    let form = read_form(&mut multipart).await?;

    info!(
        files = form.files_received,
        mode = %form.mode,
        filename = %form.base_name,
        quality = form.quality.value(),
        "Conversion request"
    );

    if form.files_received == 0 {
        return Err(AppError::BadRequest("No files were uploaded".to_string()));
    }
    if form.uploads.is_empty() {
        return Err(AppError::BadRequest(
            "No usable image files were uploaded".to_string(),
        ));
    }

    let cancel = CancelFlag::new();
    let mut guard = CancelOnDrop::new(cancel.clone());
    let converter = state.converter().clone();
    let root = state.scratch_root().to_path_buf();

    let delivery =
        tokio::task::spawn_blocking(move || run_conversion(&converter, &root, form, cancel))
            .await
            .map_err(|e| AppError::Internal(format!("Conversion task failed: {e}")))??;
    guard.disarm();

    let info_header = serde_json::to_string(&delivery.info)
        .map_err(|e| AppError::Internal(format!("Failed to encode conversion info: {e}")))?;

    info!(
        file = %delivery.file_name,
        bytes = delivery.body.len(),
        converted = delivery.info.files_converted,
        "Conversion delivered"
    );

    Ok((
        StatusCode::OK,
        [
            ("Content-Type", delivery.content_type.to_string()),
            (
                "Content-Disposition",
                content_disposition(&delivery.file_name),
            ),
            ("X-Conversion-Info", info_header),
        ],
        delivery.body,
    )
        .into_response())
}

struct Upload {
    file_name: String,
    bytes: Bytes,
}

struct ConvertForm {
    uploads: Vec<Upload>,
    files_received: usize,
    mode: OutputMode,
    base_name: String,
    quality: Quality,
    sort_by_name: bool,
}

impl Default for ConvertForm {
    fn default() -> Self {
        Self {
            uploads: Vec::new(),
            files_received: 0,
            mode: OutputMode::Merged,
            base_name: imgpdf::request::DEFAULT_BASE_NAME.to_string(),
            quality: Quality::default(),
            sort_by_name: false,
        }
    }
}

struct Delivery {
    body: Vec<u8>,
    content_type: &'static str,
    file_name: String,
    info: ConversionInfo,
}

async fn read_form(multipart: &mut Multipart) -> Result<ConvertForm, AppError> {
    let mut form = ConvertForm::default();

    while let Some(field) = multipart.next_field().await? {
        let field_name = field.name().unwrap_or("").to_string();

        match field_name.as_str() {
            "files" | "files[]" | "file" => {
                form.files_received += 1;
                let file_name = field.file_name().unwrap_or("").to_string();
                let content_type = field.content_type().unwrap_or("").to_string();
                validate_upload(&file_name, &content_type)?;

                let bytes = field.bytes().await?;
                if bytes.is_empty() {
                    warn!(file = %file_name, "Skipping empty upload");
                    continue;
                }
                form.uploads.push(Upload { file_name, bytes });
            }
            "convert_type" => form.mode = OutputMode::from_str_or_default(&field.text().await?),
            "filename" => form.base_name = imgpdf::sanitize_base_name(&field.text().await?),
            "quality" => form.quality = parse_quality(&field.text().await?)?,
            "sort" => form.sort_by_name = field.text().await?.trim().eq_ignore_ascii_case("name"),
            other => debug!(field = other, "Ignoring unknown form field"),
        }
    }

    Ok(form)
}

fn validate_upload(file_name: &str, content_type: &str) -> Result<(), AppError> {
    if !formats::is_image_content_type(content_type) {
        return Err(AppError::BadRequest(format!(
            "Unsupported file type: {file_name} ({content_type})"
        )));
    }
    if let Some(ext) = formats::extension_of(file_name) {
        if !formats::is_supported_extension(&ext) {
            return Err(AppError::BadRequest(format!(
                "Unsupported file extension: {file_name}"
            )));
        }
    }
    Ok(())
}

fn parse_quality(value: &str) -> Result<Quality, AppError> {
    let value = value.trim();
    if value.is_empty() {
        return Ok(Quality::default());
    }
    value
        .parse::<i64>()
        .map(Quality::new)
        .map_err(|_| AppError::BadRequest(format!("Quality must be an integer, got '{value}'")))
}

/// Runs on the blocking pool. The scratch directory is removed before this
/// returns, whatever the outcome.
fn run_conversion(
    converter: &ImageConverter,
    root: &Path,
    form: ConvertForm,
    cancel: CancelFlag,
) -> Result<Delivery, AppError> {
    let mut scratch = ScratchSpace::new_in(root)?;
    let outcome = convert_in_scratch(converter, &mut scratch, form, cancel);

    let dir = scratch.path().to_path_buf();
    if let Err(e) = scratch.close() {
        warn!(dir = %dir.display(), error = %e, "Failed to remove scratch directory");
    }
    outcome
}

fn convert_in_scratch(
    converter: &ImageConverter,
    scratch: &mut ScratchSpace,
    form: ConvertForm,
    cancel: CancelFlag,
) -> Result<Delivery, AppError> {
    let mut sources: Vec<SourceImage> = form
        .uploads
        .iter()
        .map(|upload| scratch.store_upload(&upload.file_name, &upload.bytes))
        .collect::<std::io::Result<_>>()?;

    if form.sort_by_name {
        SourceImage::sort_by_display_name(&mut sources);
    }

    let request = ConversionRequest::new(sources, scratch.output_dir())
        .with_mode(form.mode)
        .with_base_name(&form.base_name)
        .with_quality(form.quality)
        .with_cancel_flag(cancel);

    let result = converter.convert(&request)?;
    let info = ConversionInfo {
        mode: result.mode().to_string(),
        files_received: form.files_received,
        files_converted: result.converted_count(),
        pages: match &result {
            ConversionResult::Merged { pages, .. } => Some(*pages),
            ConversionResult::Individual { .. } => None,
        },
    };

    match result {
        ConversionResult::Merged { pdf, .. } => Ok(Delivery {
            body: std::fs::read(&pdf)?,
            content_type: "application/pdf",
            file_name: format!("{}.pdf", request.base_name),
            info,
        }),
        ConversionResult::Individual { pdfs } => Ok(Delivery {
            body: zip_to_vec(&pdfs)?,
            content_type: "application/zip",
            file_name: format!("{}_pdfs.zip", request.base_name),
            info,
        }),
    }
}

/// `attachment` disposition for a sanitized file name.
///
/// Non-ASCII names get an RFC 5987 `filename*` parameter, with a plain
/// `filename` fallback where every non-ASCII character is replaced by `_`.
fn content_disposition(file_name: &str) -> String {
    if file_name.is_ascii() {
        return format!("attachment; filename=\"{file_name}\"");
    }

    let fallback: String = file_name
        .chars()
        .map(|c| if c.is_ascii() { c } else { '_' })
        .collect();
    format!(
        "attachment; filename=\"{fallback}\"; filename*=UTF-8''{}",
        percent_encode_utf8(file_name)
    )
}

/// Percent-encode everything outside the RFC 5987 `attr-char` set.
fn percent_encode_utf8(value: &str) -> String {
    value
        .bytes()
        .map(|b| match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' => (b as char).to_string(),
            b'!' | b'#' | b'$' | b'&' | b'+' | b'-' | b'.' | b'^' | b'_' | b'`' | b'|' | b'~' => {
                (b as char).to_string()
            }
            _ => format!("%{b:02X}"),
        })
        .collect()
}

/// Raises the cancel flag if the handler future is dropped mid-conversion.
struct CancelOnDrop {
    flag: CancelFlag,
    armed: bool,
}

impl CancelOnDrop {
    fn new(flag: CancelFlag) -> Self {
        Self { flag, armed: true }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        if self.armed {
            debug!("Request dropped before completion, cancelling conversion");
            self.flag.cancel();
        }
    }
}
