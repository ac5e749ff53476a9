//! `gopher:`, `finger:` and `spartan:` transports: a TCP socket, a
//! tiny scheme-specific handshake, then a streamed body until the
//! peer closes the connection.

use gem_core::status::GmStatusCode;
use regex::Regex;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::error::{NetError, NetResult};
use crate::request::GmRequest;

/// Open a Gopher (or, identically at the wire level, Finger) TCP
/// connection, send the selector, and stream whatever comes back
/// verbatim as the body. Gopher directory-listing translation to
/// Gemini is left to the caller/renderer; this engine only fetches
/// bytes, matching the "acquisition not presentation" scope.
pub async fn gopher(req: &GmRequest, host: &str, port: u16, selector: &str) -> NetResult<()> {
    let mut stream = TcpStream::connect((host, port))
        .await
        .map_err(|e| NetError::Connection(e.to_string()))?;
    stream
        .write_all(format!("{selector}\r\n").as_bytes())
        .await
        .map_err(|e| NetError::Connection(e.to_string()))?;

    req.begin_body(GmStatusCode::Success, String::new());

    let mut buf = [0u8; 8192];
    loop {
        let n = stream
            .read(&mut buf)
            .await
            .map_err(|e| NetError::Connection(e.to_string()))?;
        if n == 0 {
            break;
        }
        req.append_body(&buf[..n]);
    }
    req.finish_success();
    Ok(())
}

fn spartan_status_line() -> &'static Regex {
    static RE: std::sync::OnceLock<Regex> = std::sync::OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^([0-9]) (.*)").unwrap())
}

/// Open a Spartan connection: send `host path size\r\n` (plus any
/// upload payload), then parse the single `<digit> <meta>\r\n` reply
/// line and map it to a Gemini status code.
pub async fn spartan(
    req: &GmRequest,
    host: &str,
    port: u16,
    path: &str,
    query: Option<&str>,
    upload: Option<&[u8]>,
) -> NetResult<()> {
    let mut stream = TcpStream::connect((host, port))
        .await
        .map_err(|e| NetError::Connection(e.to_string()))?;

    let data: Vec<u8> = if let Some(payload) = upload {
        payload.to_vec()
    } else if let Some(q) = query {
        percent_encoding::percent_decode_str(q).collect()
    } else {
        Vec::new()
    };

    let request_path = if path.is_empty() { "/" } else { path };
    let header = format!("{host} {request_path} {}\r\n", data.len());
    stream
        .write_all(header.as_bytes())
        .await
        .map_err(|e| NetError::Connection(e.to_string()))?;
    if !data.is_empty() {
        stream
            .write_all(&data)
            .await
            .map_err(|e| NetError::Connection(e.to_string()))?;
    }

    let mut raw = Vec::new();
    let mut buf = [0u8; 4096];
    let crlf_at = loop {
        let n = stream
            .read(&mut buf)
            .await
            .map_err(|e| NetError::Connection(e.to_string()))?;
        if n == 0 {
            return Err(NetError::Connection("connection closed before reply line".to_string()));
        }
        raw.extend_from_slice(&buf[..n]);
        if let Some(pos) = find_crlf(&raw) {
            break pos;
        }
        if raw.len() > 8192 {
            return Err(NetError::ReplyTooLong);
        }
    };

    let line = String::from_utf8_lossy(&raw[..crlf_at]).into_owned();
    let body_start = &raw[crlf_at + 2..];

    let Some(caps) = spartan_status_line().captures(&line) else {
        req.fail_invalid_header();
        return Ok(());
    };
    let digit: u32 = caps[1].parse().unwrap_or(0);
    let meta = caps[2].to_string();

    match digit {
        2 => {
            req.begin_body(GmStatusCode::Success, meta);
            if !body_start.is_empty() {
                req.append_body(body_start);
            }
            let mut buf = [0u8; 8192];
            loop {
                let n = stream
                    .read(&mut buf)
                    .await
                    .map_err(|e| NetError::Connection(e.to_string()))?;
                if n == 0 {
                    break;
                }
                req.append_body(&buf[..n]);
            }
            req.finish_success();
        }
        3 => req.finish_with(GmStatusCode::RedirectTemporary, meta),
        4 => req.finish_with(GmStatusCode::BadRequest, meta),
        5 => req.finish_with(GmStatusCode::PermanentFailure, meta),
        _ => req.fail_invalid_header(),
    }
    Ok(())
}

fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == b"\r\n")
}
