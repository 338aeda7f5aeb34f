//! Request body parsing.
//!
//! # Data Flow
//! ```text
//! HttpRequest (Content-Type, BodyReader)
//!     → multipart/form-data:  multipart.rs
//!         → scanner.rs splits sections on the boundary
//!         → plain fields into ArgMap, files into FileStreamFactory streams
//!     → x-www-form-urlencoded: form.rs → ArgMap
//!     → anything else: UnsupportedContentType
//! ```

pub mod file;
pub mod form;
pub mod multipart;
pub mod scanner;

use std::collections::HashMap;

use crate::http::error::{HttpError, HttpResult};
use crate::http::request::HttpRequest;
use crate::routing::args::ArgMap;

pub use file::{FileStream, FileStreamFactory, HttpFile, InMemoryFiles};
pub use multipart::{MultipartParser, SectionOutcome};
pub use scanner::{BoundaryScanner, ScanState};

/// Parse the request body into `args`, returning uploaded files by field name.
///
/// Unsupported content types fail before anything is read or bound.
pub async fn parse_body(
    request: &mut HttpRequest,
    args: &mut ArgMap,
    factory: &dyn FileStreamFactory,
) -> HttpResult<HashMap<String, HttpFile>> {
    let content_type = request.content_type().unwrap_or_default().to_string();
    let essence = content_type.to_ascii_lowercase();

    if essence.starts_with(multipart::MULTIPART_FORM_DATA) {
        multipart::parse_multipart(&content_type, request.body_mut(), args, factory).await
    } else if essence.starts_with(form::FORM_URLENCODED) {
        form::parse_form(request.body_mut(), args).await?;
        Ok(HashMap::new())
    } else {
        Err(HttpError::UnsupportedContentType(content_type))
    }
}

/// `parse_body` with every upload kept in memory.
pub async fn parse_body_in_memory(
    request: &mut HttpRequest,
    args: &mut ArgMap,
) -> HttpResult<HashMap<String, HttpFile>> {
    parse_body(request, args, &InMemoryFiles).await
}
