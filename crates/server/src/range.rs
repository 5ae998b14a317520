use axum::body::Body;
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::Response;
use bytes::Bytes;

use crate::utils::json_error_response;

/// Inclusive byte span within a stored file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeError {
    Invalid,
    Unsatisfiable,
}

/// Parses a single `bytes=` range against a body of `size` bytes. Ends past
/// the body are clamped; multi-range requests are rejected.
pub fn parse_range_header(value: &str, size: u64) -> Result<ByteRange, RangeError> {
    let bounds = value
        .trim()
        .strip_prefix("bytes=")
        .ok_or(RangeError::Invalid)?;
    if bounds.contains(',') {
        return Err(RangeError::Invalid);
    }
    let (first, last) = bounds.split_once('-').ok_or(RangeError::Invalid)?;
    let number = |text: &str| text.trim().parse::<u64>().map_err(|_| RangeError::Invalid);

    if first.trim().is_empty() {
        let suffix = number(last)?;
        if suffix == 0 || size == 0 {
            return Err(RangeError::Unsatisfiable);
        }
        return Ok(ByteRange {
            start: size.saturating_sub(suffix),
            end: size - 1,
        });
    }

    let start = number(first)?;
    let end = if last.trim().is_empty() {
        None
    } else {
        Some(number(last)?)
    };
    if let Some(end) = end {
        if end < start {
            return Err(RangeError::Invalid);
        }
    }
    if start >= size {
        return Err(RangeError::Unsatisfiable);
    }
    let end = end.map_or(size - 1, |end| end.min(size - 1));
    Ok(ByteRange { start, end })
}

/// Builds the response for a stored file, honoring an optional `Range`
/// header. Unparseable ranges fall back to the whole body.
pub fn file_response(data: Vec<u8>, mime: &str, range_header: Option<&str>) -> Response {
    let size = data.len() as u64;
    let range = match range_header.map(|value| parse_range_header(value, size)) {
        None | Some(Err(RangeError::Invalid)) => None,
        Some(Ok(range)) => Some(range),
        Some(Err(RangeError::Unsatisfiable)) => {
            let mut response =
                json_error_response(StatusCode::RANGE_NOT_SATISFIABLE, "range not satisfiable");
            if let Ok(value) = HeaderValue::from_str(&format!("bytes */{}", size)) {
                response.headers_mut().insert(header::CONTENT_RANGE, value);
            }
            return response;
        }
    };

    let bytes = Bytes::from(data);
    let (status, body, content_range) = match range {
        Some(range) => (
            StatusCode::PARTIAL_CONTENT,
            bytes.slice(range.start as usize..=range.end as usize),
            Some(format!("bytes {}-{}/{}", range.start, range.end, size)),
        ),
        None => (StatusCode::OK, bytes, None),
    };

    let length = body.len();
    let mut response = Response::new(Body::from(body));
    *response.status_mut() = status;
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(mime)
            .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream")),
    );
    headers.insert(header::ACCEPT_RANGES, HeaderValue::from_static("bytes"));
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(length));
    if let Some(value) = content_range.and_then(|v| HeaderValue::from_str(&v).ok()) {
        headers.insert(header::CONTENT_RANGE, value);
    }
    response
}
