//! The request pipeline: `GmRequest`, the centerpiece state machine that
//! every scheme transport drives to completion.

use std::ops::Deref;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use gem_core::status::GmStatusCode;
use gem_core::types::{CertFlags, Identity, Response};
use gem_core::GemUrl;
use gem_store::identity::IdentityStore;
use gem_store::sitespec::SiteSpecStore;
use gem_store::trust::TrustStore;
use tokio::sync::watch;

use crate::error::{NetError, NetResult};
use crate::transport::{line, local, tls};

/// A filter a completed response's body may be passed through before
/// **finished** fires. `gem-net::filters::MimeHooks` is the production
/// implementation; tests can stub this trivially.
pub trait ResponseFilter: Send + Sync {
    /// Attempt to replace `(meta, body)` for a response whose MIME is
    /// `mime`. `None` means "no hook matched, leave the body as is."
    fn try_filter(&self, mime: &str, body: &[u8], request_url: &str) -> Option<(String, Vec<u8>)>;
}

/// The stores and shared configuration every request consults: trust
/// decisions, identity resolution/attachment, and per-site settings.
pub struct RequestContext {
    pub trust: Arc<TrustStore>,
    pub identities: Arc<IdentityStore>,
    pub site_spec: Arc<SiteSpecStore>,
    pub filters: Option<Arc<dyn ResponseFilter>>,
    /// Whether a user-configured proxy should carry every scheme (the
    /// original client's "use Gemini proxy for all protocols" toggle).
    pub proxy: Option<(String, u16)>,
}

impl RequestContext {
    #[must_use]
    pub fn new(trust: Arc<TrustStore>, identities: Arc<IdentityStore>, site_spec: Arc<SiteSpecStore>) -> Self {
        Self { trust, identities, site_spec, filters: None, proxy: None }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Initialized,
    ReceivingHeader,
    ReceivingBody,
    Finished,
    Failure,
}

struct Upload {
    mime: String,
    payload: Vec<u8>,
    token: Option<String>,
}

struct State {
    url: Option<GemUrl>,
    identity: Option<Identity>,
    upload: Option<Upload>,
    response: Response,
    phase: Phase,
    header_buf: Vec<u8>,
}

/// One in-flight or completed Gemini-family request.
pub struct GmRequest {
    ctx: Arc<RequestContext>,
    state: Mutex<State>,
    updated_tx: watch::Sender<u64>,
    finished_tx: watch::Sender<bool>,
}

/// Scoped exclusive read access to a request's response, acquired via
/// [`GmRequest::lock_response`]. Update notifications are suppressed
/// for the lifetime of the guard (mirroring the paired
/// `lock_response`/`unlock_response` calls the pipeline replaces with
/// RAII).
pub struct ResponseGuard<'a> {
    guard: std::sync::MutexGuard<'a, State>,
}

impl Deref for ResponseGuard<'_> {
    type Target = Response;
    fn deref(&self) -> &Response {
        &self.guard.response
    }
}

impl GmRequest {
    #[must_use]
    pub fn new(ctx: Arc<RequestContext>) -> Self {
        let (updated_tx, _) = watch::channel(0);
        let (finished_tx, _) = watch::channel(false);
        Self {
            ctx,
            state: Mutex::new(State {
                url: None,
                identity: None,
                upload: None,
                response: Response::new(Utc::now()),
                phase: Phase::Initialized,
                header_buf: Vec::new(),
            }),
            updated_tx,
            finished_tx,
        }
    }

    /// A receiver that changes (coalesced: only the latest value is
    /// ever observed) each time the response body grows or its header
    /// is parsed.
    #[must_use]
    pub fn subscribe_updated(&self) -> watch::Receiver<u64> {
        self.updated_tx.subscribe()
    }

    /// A receiver that flips to `true` exactly once, when the request
    /// reaches `FINISHED` or `FAILURE`.
    #[must_use]
    pub fn subscribe_finished(&self) -> watch::Receiver<bool> {
        self.finished_tx.subscribe()
    }

    /// Canonicalize and store `url`. Also resolves (but does not yet
    /// attach) the identity this URL's prefix is already in use with.
    pub fn set_url(&self, url: &str) -> NetResult<()> {
        let parsed = GemUrl::parse(url).map_err(|_| NetError::InvalidUrl(url.to_string()))?;
        let resolved_identity = self.ctx.identities.identity_for_url(&parsed.to_string()).map(|(_, id)| id);
        let mut state = self.state.lock().unwrap();
        state.identity = resolved_identity;
        state.url = Some(parsed);
        Ok(())
    }

    /// Override whatever identity auto-resolution picked.
    pub fn set_identity(&self, identity: Identity) {
        self.state.lock().unwrap().identity = Some(identity);
    }

    /// Attach a Titan upload payload to this request.
    pub fn set_upload(&self, mime: String, payload: Vec<u8>, token: Option<String>) {
        self.state.lock().unwrap().upload = Some(Upload { mime, payload, token });
    }

    /// Idempotently transition to `FAILURE`. Safe to call from any
    /// thread, including while a transport is mid-flight; the transport
    /// notices via [`Self::is_finished`] and stops driving the socket.
    pub fn cancel(&self) {
        let mut state = self.state.lock().unwrap();
        if matches!(state.phase, Phase::Finished | Phase::Failure) {
            return;
        }
        state.phase = Phase::Failure;
        state.response.status_code = Some(GmStatusCode::TlsFailure);
        state.response.meta = "cancelled".to_string();
        state.response.when = Utc::now();
        drop(state);
        let _ = self.finished_tx.send(true);
    }

    /// Scoped exclusive read access to the response. While held, the
    /// response cannot be mutated by a concurrently running transport
    /// (it blocks on the same mutex), so update notifications are
    /// naturally suppressed for the guard's lifetime.
    #[must_use]
    pub fn lock_response(&self) -> ResponseGuard<'_> {
        ResponseGuard { guard: self.state.lock().unwrap() }
    }

    /// Dispatch based on scheme. Must be called exactly once per
    /// request.
    pub async fn submit(&self) -> NetResult<()> {
        let (url, identity, upload) = {
            let state = self.state.lock().unwrap();
            let Some(url) = state.url.clone() else {
                return Err(NetError::InvalidUrl(String::new()));
            };
            (url, state.identity.clone(), state.upload.as_ref().map(|u| (u.mime.clone(), u.payload.clone(), u.token.clone())))
        };

        let (scheme, host, port) = if let Some((proxy_host, proxy_port)) = &self.ctx.proxy {
            (url.scheme().to_string(), proxy_host.clone(), *proxy_port)
        } else {
            (
                url.scheme().to_string(),
                url.host().unwrap_or_default().to_string(),
                url.effective_port().unwrap_or(0),
            )
        };

        match scheme.as_str() {
            "about" => {
                let resp = local::about(url.path().trim_start_matches('/'), url.query());
                self.replace_response(resp);
                Ok(())
            }
            "data" => {
                match local::data(url.path()) {
                    Ok(resp) => self.replace_response(resp),
                    Err(e) => self.fail_from_error(&e),
                }
                Ok(())
            }
            "file" => {
                match local::file(url.path(), &url.to_string()) {
                    Ok(resp) => self.replace_response(resp),
                    Err(_) => {
                        self.finish_with(GmStatusCode::FailedToOpenFile, "could not open file".to_string());
                    }
                }
                Ok(())
            }
            "gopher" | "finger" => line::gopher(self, &host, port, url.path()).await,
            "spartan" => {
                let upload_bytes = upload.as_ref().map(|(_, payload, _)| payload.as_slice());
                line::spartan(self, &host, port, url.path(), url.query(), upload_bytes).await
            }
            "guppy" => crate::guppy::run(self, &host, port, &url.to_string()).await,
            "gemini" | "titan" => {
                let default_port = 1965;
                let content = build_tls_request_line(&url, upload.as_ref());
                let site_params = self.ctx.site_spec.value(&url.root());
                let session_cache_enabled = site_params.tls_session_cache;
                let is_proxy = self.ctx.proxy.is_some();
                tls::request(
                    self,
                    &host,
                    port,
                    default_port,
                    content,
                    identity.as_ref(),
                    &self.ctx.trust,
                    is_proxy,
                    session_cache_enabled,
                )
                .await
            }
            other => {
                self.finish_with(GmStatusCode::UnsupportedProtocol, format!("unsupported scheme: {other}"));
                Ok(())
            }
        }
    }

    fn replace_response(&self, mut resp: Response) {
        let mut state = self.state.lock().unwrap();
        resp.identity_fingerprint = state.identity.as_ref().map(|i| i.fingerprint.clone()).unwrap_or_default();
        state.response = resp;
        state.phase = if state.response.status_code.map(GmStatusCode::is_failure).unwrap_or(true) {
            Phase::Failure
        } else {
            Phase::Finished
        };
        drop(state);
        let _ = self.finished_tx.send(true);
    }

    fn fail_from_error(&self, err: &NetError) {
        let (status, meta) = match err {
            NetError::LocalResource(msg) => (GmStatusCode::FailedToOpenFile, msg.clone()),
            NetError::InvalidDataUrl => (GmStatusCode::InvalidHeader, "malformed data: URL".to_string()),
            other => (GmStatusCode::UnsupportedProtocol, other.to_string()),
        };
        self.finish_with(status, meta);
    }

    /// True once the request has reached `FINISHED` or `FAILURE`
    /// (including via [`Self::cancel`] from another thread).
    #[must_use]
    pub fn is_finished(&self) -> bool {
        matches!(self.state.lock().unwrap().phase, Phase::Finished | Phase::Failure)
    }

    /// Record the TLS peer certificate facts gathered for this
    /// connection, independent of the request's current phase.
    pub fn set_cert_info(
        &self,
        flags: CertFlags,
        fingerprint: Vec<u8>,
        valid_until: Option<chrono::DateTime<Utc>>,
        subject: String,
    ) {
        let mut state = self.state.lock().unwrap();
        state.response.cert_flags = flags;
        state.response.cert_fingerprint = fingerprint;
        state.response.cert_valid_until = valid_until;
        state.response.cert_subject = subject;
    }

    /// Begin the Gemini/Titan header-parsing phase after a successful
    /// TLS handshake and trust check.
    pub fn begin_header(&self) {
        let mut state = self.state.lock().unwrap();
        state.phase = Phase::ReceivingHeader;
        state.header_buf.clear();
    }

    /// Feed newly-received bytes into the header parser (while still in
    /// `RECEIVING_HEADER`) or straight into the body (once past it).
    /// Returns `true` if this call completed the header parse.
    pub fn feed_header_or_body(&self, bytes: &[u8]) -> bool {
        let mut state = self.state.lock().unwrap();
        if state.phase != Phase::ReceivingHeader {
            state.response.body.extend_from_slice(bytes);
            state.response.when = Utc::now();
            drop(state);
            self.updated_tx.send_modify(|n| *n = n.wrapping_add(1));
            return false;
        }

        state.header_buf.extend_from_slice(bytes);
        let Some(pos) = find_crlf(&state.header_buf) else {
            if state.header_buf.len() > 4096 {
                state.phase = Phase::Failure;
                state.response.status_code = Some(GmStatusCode::InvalidHeader);
                state.response.meta = "header line too long".to_string();
                drop(state);
                let _ = self.finished_tx.send(true);
            }
            return false;
        };

        let line = String::from_utf8_lossy(&state.header_buf[..pos]).into_owned();
        let remainder = state.header_buf[pos + 2..].to_vec();
        state.header_buf.clear();

        let Some((code, meta)) = parse_gemini_header(&line) else {
            state.phase = Phase::Failure;
            state.response.status_code = Some(GmStatusCode::InvalidHeader);
            state.response.meta = "malformed response header".to_string();
            drop(state);
            let _ = self.finished_tx.send(true);
            return true;
        };

        state.phase = Phase::ReceivingBody;
        state.response.status_code = Some(code);
        state.response.meta = if code == GmStatusCode::Success && meta.is_empty() {
            "text/gemini; charset=utf-8".to_string()
        } else {
            meta
        };
        if !remainder.is_empty() {
            state.response.body.extend_from_slice(&remainder);
        }
        state.response.when = Utc::now();
        drop(state);
        self.updated_tx.send_modify(|n| *n = n.wrapping_add(1));
        true
    }

    /// Begin streaming a body whose status/meta is already known (line
    /// transports parse their own handshake reply outside the Gemini
    /// header grammar).
    pub fn begin_body(&self, status: GmStatusCode, meta: String) {
        let mut state = self.state.lock().unwrap();
        state.phase = Phase::ReceivingBody;
        state.response.status_code = Some(status);
        state.response.meta = meta;
        state.response.when = Utc::now();
    }

    /// Append bytes to the body of a request already past its header,
    /// posting a coalesced **updated** notification.
    pub fn append_body(&self, bytes: &[u8]) {
        let mut state = self.state.lock().unwrap();
        state.response.body.extend_from_slice(bytes);
        state.response.when = Utc::now();
        drop(state);
        self.updated_tx.send_modify(|n| *n = n.wrapping_add(1));
    }

    /// Finish a request that was already in `RECEIVING_BODY`, running
    /// any configured filter hook over the body before sealing the
    /// response and posting **finished**.
    pub fn finish_success(&self) {
        let mut state = self.state.lock().unwrap();
        if let Some(filters) = &self.ctx.filters {
            let request_url = state.url.as_ref().map(|u| u.to_string()).unwrap_or_default();
            if let Some((new_meta, new_body)) = filters.try_filter(&state.response.meta, &state.response.body, &request_url) {
                state.response.meta = new_meta;
                state.response.body = new_body;
            }
        }
        state.response.identity_fingerprint =
            state.identity.as_ref().map(|i| i.fingerprint.clone()).unwrap_or_default();
        state.response.when = Utc::now();
        state.phase = Phase::Finished;
        drop(state);
        let _ = self.finished_tx.send(true);
    }

    /// Finish unconditionally with an explicit status/meta: TLS
    /// failures, line-transport terminal replies (redirect/bad-request/
    /// permanent-failure), and synthetic local-resource failures all go
    /// through here.
    pub fn finish_with(&self, status: GmStatusCode, meta: String) {
        let mut state = self.state.lock().unwrap();
        state.response.status_code = Some(status);
        state.response.meta = meta;
        state.response.when = Utc::now();
        state.response.identity_fingerprint =
            state.identity.as_ref().map(|i| i.fingerprint.clone()).unwrap_or_default();
        state.phase = if status.is_failure() { Phase::Failure } else { Phase::Finished };
        drop(state);
        let _ = self.finished_tx.send(true);
    }

    /// A response header line failed to parse; a synonym for
    /// `finish_with(InvalidHeader, ...)` used by line transports.
    pub fn fail_invalid_header(&self) {
        self.finish_with(GmStatusCode::InvalidHeader, "malformed response header".to_string());
    }

    /// The peer closed the connection; classify based on which phase we
    /// were in (mirrors the failure-classification table: truncated
    /// header vs. a clean body-complete close).
    pub fn finish_after_close(&self) {
        let phase = self.state.lock().unwrap().phase;
        match phase {
            Phase::ReceivingHeader => {
                self.finish_with(GmStatusCode::IncompleteHeader, "connection closed before header arrived".to_string());
            }
            Phase::ReceivingBody => self.finish_success(),
            Phase::Finished | Phase::Failure | Phase::Initialized => {}
        }
    }
}

fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == b"\r\n")
}

fn parse_gemini_header(line: &str) -> Option<(GmStatusCode, String)> {
    if line.len() < 2 || !line.as_bytes()[..2].iter().all(u8::is_ascii_digit) {
        return None;
    }
    let code: i32 = line[..2].parse().ok()?;
    let meta = line.get(2..).unwrap_or("").trim_start_matches(' ').to_string();
    let status = GmStatusCode::from_wire(code)?;
    Some((status, meta))
}

fn build_tls_request_line(url: &GemUrl, upload: Option<&(String, Vec<u8>, Option<String>)>) -> Vec<u8> {
    // Fragments are client-side only and must never be sent on the wire.
    let mut line = url.fragment_stripped().to_string();
    if url.scheme() == "titan" {
        if let Some((mime, payload, token)) = upload {
            line.push_str(&format!(";mime={mime};size={}", payload.len()));
            if let Some(token) = token {
                line.push_str(&format!(";token={token}"));
            }
            line.push_str("\r\n");
            let mut out = line.into_bytes();
            out.extend_from_slice(payload);
            return out;
        }
    }
    line.push_str("\r\n");
    line.into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context() -> Arc<RequestContext> {
        let dir = tempfile::tempdir().unwrap();
        let trust = Arc::new(TrustStore::load(dir.path()));
        let identities = Arc::new(IdentityStore::load(dir.path()).unwrap());
        let site_spec = Arc::new(SiteSpecStore::load(dir.path()));
        Arc::new(RequestContext::new(trust, identities, site_spec))
    }

    #[test]
    fn set_url_rejects_garbage() {
        let req = GmRequest::new(context());
        assert!(req.set_url("not a url").is_err());
    }

    #[test]
    fn cancel_is_idempotent_and_marks_finished() {
        let req = GmRequest::new(context());
        req.set_url("gemini://example.org/").unwrap();
        let mut rx = req.subscribe_finished();
        req.cancel();
        assert!(*rx.borrow_and_update());
        req.cancel();
        assert!(req.is_finished());
    }

    #[test]
    fn header_parse_defaults_meta_on_empty_success() {
        let req = GmRequest::new(context());
        req.set_url("gemini://example.org/").unwrap();
        req.begin_header();
        req.feed_header_or_body(b"20 \r\nhello");
        let resp = req.lock_response();
        assert_eq!(resp.meta, "text/gemini; charset=utf-8");
        assert_eq!(resp.body, b"hello");
    }

    #[test]
    fn header_parse_rejects_malformed_status() {
        let req = GmRequest::new(context());
        req.set_url("gemini://example.org/").unwrap();
        req.begin_header();
        let mut rx = req.subscribe_finished();
        req.feed_header_or_body(b"xx bad\r\n");
        assert!(*rx.borrow_and_update());
    }

    #[test]
    fn about_dispatch_marks_finished_with_identity_fingerprint() {
        let req = GmRequest::new(context());
        req.set_url("about:about").unwrap();
        let resp = local::about("about", None);
        assert_eq!(resp.status_code, Some(GmStatusCode::Success));
    }
}
