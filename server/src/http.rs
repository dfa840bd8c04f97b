//! Minimal HTTP/1.1 framing for the embedded server.
//!
//! Only what a single embedded viewer needs: a request line, headers that are
//! read and discarded, and `Connection: close` responses with an exact
//! `Content-Length`. Request bodies are never read.

use std::collections::BTreeMap;
use std::io;

use docview_types::DocumentRequest;
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use url::form_urlencoded;

use crate::respond::ContentResult;

/// Upper bound on the request line plus headers.
const MAX_HEAD_BYTES: usize = 16 * 1024;

const MAX_HEADERS: usize = 100;

#[derive(Debug, Error)]
pub enum HttpError {
    #[error("malformed request: {0}")]
    Malformed(String),
    #[error("request head exceeds {MAX_HEAD_BYTES} bytes")]
    TooLarge,
    #[error("connection closed mid-request")]
    UnexpectedEof,
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Head,
    Other,
}

#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub method_name: String,
    pub target: String,
}

/// Read one request head.
///
/// Returns `Ok(None)` when the peer closes before sending anything.
pub async fn read_request<R: AsyncBufRead + Unpin>(
    reader: &mut R,
) -> Result<Option<HttpRequest>, HttpError> {
    let mut line = String::new();
    let mut consumed = 0usize;

    let n = read_head_line(reader, &mut line, &mut consumed).await?;
    if n == 0 {
        return Ok(None);
    }
    let request_line = line.trim_end().to_string();

    let mut parts = request_line.split(' ');
    let (Some(method_name), Some(target), Some(version), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(HttpError::Malformed(format!(
            "bad request line: {}",
            request_line.escape_debug()
        )));
    };
    if !version.starts_with("HTTP/1.") {
        return Err(HttpError::Malformed(format!("unsupported version {version}")));
    }
    if method_name.is_empty() || !method_name.bytes().all(|b| b.is_ascii_uppercase()) {
        return Err(HttpError::Malformed(format!("bad method {method_name}")));
    }

    let mut headers = 0usize;
    loop {
        line.clear();
        if read_head_line(reader, &mut line, &mut consumed).await? == 0 {
            return Err(HttpError::UnexpectedEof);
        }
        if line.trim().is_empty() {
            break;
        }
        headers += 1;
        if headers > MAX_HEADERS {
            return Err(HttpError::TooLarge);
        }
    }

    let method = match method_name {
        "GET" => Method::Get,
        "HEAD" => Method::Head,
        _ => Method::Other,
    };
    Ok(Some(HttpRequest {
        method,
        method_name: method_name.to_string(),
        target: target.to_string(),
    }))
}

async fn read_head_line<R: AsyncBufRead + Unpin>(
    reader: &mut R,
    line: &mut String,
    consumed: &mut usize,
) -> Result<usize, HttpError> {
    let budget = (MAX_HEAD_BYTES + 1).saturating_sub(*consumed) as u64;
    let n = (&mut *reader).take(budget).read_line(line).await?;
    *consumed += n;
    if *consumed > MAX_HEAD_BYTES {
        return Err(HttpError::TooLarge);
    }
    Ok(n)
}

/// Split an origin-form request target into a [`DocumentRequest`].
///
/// The path stays percent-encoded; the resolver decodes it. Query pairs are
/// form-decoded, and on duplicate keys the first occurrence wins.
pub fn parse_target(target: &str) -> Result<DocumentRequest, HttpError> {
    if !target.starts_with('/') {
        return Err(HttpError::Malformed(format!(
            "request target must be origin-form: {}",
            target.escape_debug()
        )));
    }
    let without_fragment = target.split_once('#').map_or(target, |(t, _)| t);
    let (path, query) = without_fragment
        .split_once('?')
        .unwrap_or((without_fragment, ""));

    let mut params = BTreeMap::new();
    for (key, value) in form_urlencoded::parse(query.as_bytes()) {
        params
            .entry(key.into_owned())
            .or_insert_with(|| value.into_owned());
    }
    Ok(DocumentRequest::new(path, params))
}

/// Write `response`; with `head_only` the body is omitted but its length kept.
pub async fn write_response<W: AsyncWrite + Unpin>(
    writer: &mut W,
    response: &ContentResult,
    head_only: bool,
) -> io::Result<()> {
    let mut head = format!(
        "HTTP/1.1 {} {}\r\nContent-Type: {}\r\nContent-Length: {}\r\n",
        response.status.code(),
        response.status.reason(),
        response.content_type,
        response.body.len()
    );
    for (name, value) in &response.headers {
        head.push_str(name);
        head.push_str(": ");
        head.push_str(value);
        head.push_str("\r\n");
    }
    head.push_str("Connection: close\r\n\r\n");

    writer.write_all(head.as_bytes()).await?;
    if !head_only {
        writer.write_all(&response.body).await?;
    }
    writer.flush().await
}
