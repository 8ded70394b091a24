//! # imgpdf-api
//!
//! REST API server for the imgpdf image to PDF converter
//!

mod api;
mod config;

pub use api::{
    app, convert_images, health_check, AppError, ConversionInfo, ErrorResponse, HealthResponse,
};
pub use config::{AppState, ServerConfig};
