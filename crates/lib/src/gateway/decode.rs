//! Request decoding for the HTTP ingress: destination id + raw message body.
//!
//! Two encodings are accepted. A plain body is taken verbatim with the destination in the
//! URL path (`POST /42`). A multipart body carries `to` and `msg` parts; when `to` is missing
//! or zero the path is used as a fallback.

use axum::body::{to_bytes, Body, Bytes};
use axum::http::{header, HeaderMap, Method, Request, StatusCode};
use thiserror::Error;

/// Upper bound on a request body, raw or multipart.
pub const MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("method not allowed: {0}")]
    MethodNotAllowed(Method),
    #[error("malformed request: {0}")]
    MalformedRequest(String),
    #[error("no msg part")]
    MissingBody,
    #[error("invalid path: {0}")]
    InvalidPath(String),
    #[error("reading body: {0}")]
    BodyUnreadable(String),
    #[error("timed out reading request")]
    ReadTimeout,
}

impl DecodeError {
    /// HTTP status reported to the client.
    pub fn status(&self) -> StatusCode {
        match self {
            DecodeError::BodyUnreadable(_) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_REQUEST,
        }
    }
}

/// Destination and body of an accepted request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedRequest {
    pub destination: i64,
    pub body: Bytes,
}

/// How the request body is encoded; selected once from the Content-Type header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BodyEncoding {
    Raw,
    Multipart { boundary: String },
}

impl BodyEncoding {
    /// A `multipart/*` media type with a non-empty boundary is multipart; anything else,
    /// including an unparsable header, is treated as a raw body.
    pub fn detect(headers: &HeaderMap) -> Self {
        headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .and_then(multipart_boundary)
            .map(|boundary| BodyEncoding::Multipart { boundary })
            .unwrap_or(BodyEncoding::Raw)
    }
}

fn multipart_boundary(content_type: &str) -> Option<String> {
    let mut parts = content_type.split(';');
    let media_type = parts.next()?.trim().to_ascii_lowercase();
    if !media_type.starts_with("multipart/") {
        return None;
    }
    parts
        .filter_map(|p| p.split_once('='))
        .find(|(k, _)| k.trim().eq_ignore_ascii_case("boundary"))
        .map(|(_, v)| v.trim().trim_matches('"').to_string())
        .filter(|b| !b.is_empty())
}

/// Destination from the URL path: exactly one non-empty segment holding a decimal integer.
pub fn path_destination(path: &str) -> Result<i64, DecodeError> {
    let segments: Vec<&str> = path.trim_matches('/').split('/').collect();
    match segments.as_slice() {
        [segment] => segment
            .parse::<i64>()
            .map_err(|_| DecodeError::InvalidPath(path.to_string())),
        _ => Err(DecodeError::InvalidPath(path.to_string())),
    }
}

async fn decode_raw(body: Body) -> Result<Bytes, DecodeError> {
    to_bytes(body, MAX_BODY_BYTES)
        .await
        .map_err(|e| DecodeError::BodyUnreadable(e.to_string()))
}

/// Walk the parts in arrival order. Returns (destination or 0, msg bytes).
///
/// Any `multipart/*` subtype is read with the detected boundary; parts are matched by their
/// Content-Disposition name.
async fn decode_multipart(body: Body, boundary: &str) -> Result<(i64, Bytes), DecodeError> {
    let constraints = multer::Constraints::new()
        .size_limit(multer::SizeLimit::new().whole_stream(MAX_BODY_BYTES as u64));
    let mut multipart =
        multer::Multipart::with_constraints(body.into_data_stream(), boundary, constraints);
    let mut destination = 0;
    let mut body = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| DecodeError::MalformedRequest(e.to_string()))?
    {
        let name = field.name().unwrap_or_default().to_string();
        let data = field
            .bytes()
            .await
            .map_err(|e| DecodeError::MalformedRequest(e.to_string()))?;
        match name.as_str() {
            "" => return Err(DecodeError::MalformedRequest("empty part name".to_string())),
            "to" => {
                destination = std::str::from_utf8(&data)
                    .ok()
                    .and_then(|s| s.trim().parse::<i64>().ok())
                    .ok_or_else(|| {
                        DecodeError::MalformedRequest(format!(
                            "invalid destination: {:?}",
                            String::from_utf8_lossy(&data)
                        ))
                    })?;
            }
            "msg" => body = Some(data),
            other => {
                return Err(DecodeError::MalformedRequest(format!(
                    "unknown part name: {}",
                    other
                )))
            }
        }
    }
    let body = body.ok_or(DecodeError::MissingBody)?;
    Ok((destination, body))
}

/// Decode an ingress request. Only POST is accepted. Has no side effects beyond reading the body.
pub async fn decode_request(req: Request<Body>) -> Result<DecodedRequest, DecodeError> {
    if req.method() != Method::POST {
        return Err(DecodeError::MethodNotAllowed(req.method().clone()));
    }
    let path = req.uri().path().to_string();
    let (destination, body) = match BodyEncoding::detect(req.headers()) {
        BodyEncoding::Raw => (0, decode_raw(req.into_body()).await?),
        BodyEncoding::Multipart { boundary } => decode_multipart(req.into_body(), &boundary).await?,
    };
    let destination = if destination != 0 {
        destination
    } else {
        path_destination(&path)?
    };
    Ok(DecodedRequest { destination, body })
}
