//! `gemini:` and `titan:` transports: a bare TLS connection (no CA
//! chain, TOFU-only) carrying a one-line request and a streamed
//! response.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock};

use chrono::{DateTime, Utc};
use gem_core::status::GmStatusCode;
use gem_core::types::{CertFlags, Identity};
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, SignatureScheme};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;

use crate::error::{NetError, NetResult};
use crate::request::GmRequest;
use gem_store::trust::{PeerCertInfo, TrustStore};

fn install_crypto_provider() {
    static INIT: OnceLock<()> = OnceLock::new();
    INIT.get_or_init(|| {
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}

/// A certificate verifier that never rejects a handshake on its own
/// authority: Gemini-family protocols use self-signed certificates by
/// convention, with trust established out of band (§4.2's TOFU
/// store). The leaf certificate itself is read back from the
/// connection's `peer_certificates()` after the handshake completes,
/// so this verifier carries no per-connection state and its
/// `ClientConfig` can be shared (and its session ticket cache reused)
/// across requests.
#[derive(Debug)]
struct TofuVerifier;

impl ServerCertVerifier for TofuVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        rustls::crypto::ring::default_provider()
            .signature_verification_algorithms
            .supported_schemes()
    }
}

/// Cache key for a shared `ClientConfig`: `None` for anonymous
/// connections, `Some(fingerprint)` for a given client identity. Each
/// key gets its own config (and thus its own resumption ticket store),
/// since configs differ in client auth material.
type ConfigCache = Mutex<HashMap<Option<Vec<u8>>, Arc<ClientConfig>>>;

fn config_cache() -> &'static ConfigCache {
    static CACHE: OnceLock<ConfigCache> = OnceLock::new();
    CACHE.get_or_init(|| Mutex::new(HashMap::new()))
}

fn build_client_config(identity: Option<&Identity>) -> NetResult<ClientConfig> {
    install_crypto_provider();
    let builder = ClientConfig::builder()
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(TofuVerifier));

    match identity {
        Some(id) => {
            let cert = CertificateDer::from(id.certificate_der.clone()).into_owned();
            let key = PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(id.private_key_der.clone()));
            builder
                .with_client_auth_cert(vec![cert], key)
                .map_err(|e| NetError::TlsFailure(e.to_string()))
        }
        None => Ok(builder.with_no_client_auth()),
    }
}

/// Build (or reuse) the `ClientConfig` for this identity. When
/// `session_cache_enabled` is set, configs are kept in a process-wide
/// cache keyed by identity fingerprint, so repeated connections to the
/// same host reuse rustls's in-memory session ticket store and can
/// resume a prior TLS session instead of doing a full handshake. When
/// disabled, a fresh config (and thus a fresh, empty ticket store) is
/// built every time.
fn connector_for(identity: Option<&Identity>, session_cache_enabled: bool) -> NetResult<TlsConnector> {
    if !session_cache_enabled {
        return Ok(TlsConnector::from(Arc::new(build_client_config(identity)?)));
    }

    let key = identity.map(|id| id.fingerprint.clone().into_bytes());
    let mut cache = config_cache().lock().unwrap();
    if let Some(config) = cache.get(&key) {
        return Ok(TlsConnector::from(config.clone()));
    }
    let config = Arc::new(build_client_config(identity)?);
    cache.insert(key, config.clone());
    Ok(TlsConnector::from(config))
}

/// Check the captured leaf certificate against the trust store, and
/// fold the result into the request's `cert_flags`/`cert_subject`/etc.
/// Returns `Ok(true)` if the handshake should be treated as a success,
/// `Ok(false)` with the appropriate failure status already set on the
/// request if not.
fn check_certificate(
    req: &GmRequest,
    trust: &TrustStore,
    domain: &str,
    port: u16,
    default_port: u16,
    der: &[u8],
    is_proxy: bool,
) -> NetResult<bool> {
    let (_, cert) =
        x509_parser::parse_x509_certificate(der).map_err(|e| NetError::TlsFailure(e.to_string()))?;

    let names: Vec<String> = cert
        .subject()
        .iter_common_name()
        .filter_map(|cn| cn.as_str().ok())
        .map(str::to_string)
        .collect();
    let is_domain_valid = TrustStore::verify_domain(&names, domain);

    let not_after = cert.validity().not_after.timestamp();
    let valid_until = DateTime::from_timestamp(not_after, 0).unwrap_or_else(Utc::now);
    let is_expired = valid_until < Utc::now();

    let public_key_fingerprint =
        ring::digest::digest(&ring::digest::SHA256, cert.public_key().raw).as_ref().to_vec();

    let mut flags = CertFlags::default();
    flags.0 |= CertFlags::AVAILABLE;
    flags.0 |= CertFlags::HAVE_FINGERPRINT;
    if !is_expired {
        flags.0 |= CertFlags::TIME_VERIFIED;
    }
    if is_domain_valid {
        flags.0 |= CertFlags::DOMAIN_VERIFIED;
    }

    let key = TrustStore::make_key(domain, port, default_port);
    let trusted = trust.check_trust(
        &key,
        &PeerCertInfo {
            fingerprint: public_key_fingerprint.clone(),
            valid_until,
            is_expired,
            is_domain_valid,
            is_ca_trusted: false,
        },
    )?;
    if trusted {
        flags.0 |= CertFlags::TRUSTED;
    }

    req.set_cert_info(flags, public_key_fingerprint, Some(valid_until), names.join(", "));

    if !trusted {
        if is_expired {
            req.finish_with(
                if is_proxy {
                    GmStatusCode::ProxyCertificateExpired
                } else {
                    GmStatusCode::TlsServerCertificateExpired
                },
                "server certificate has expired".to_string(),
            );
        } else {
            req.finish_with(
                if is_proxy {
                    GmStatusCode::ProxyCertificateNotVerified
                } else {
                    GmStatusCode::TlsServerCertificateNotVerified
                },
                "server certificate could not be verified".to_string(),
            );
        }
        return Ok(false);
    }
    Ok(true)
}

/// Perform a Gemini or Titan request: connect, handshake, consult the
/// trust store, send the request line (or Titan upload framing), and
/// stream the header/body through `req`.
#[allow(clippy::too_many_arguments)]
pub async fn request(
    req: &GmRequest,
    host: &str,
    port: u16,
    default_port: u16,
    content: Vec<u8>,
    identity: Option<&Identity>,
    trust: &TrustStore,
    is_proxy: bool,
    session_cache_enabled: bool,
) -> NetResult<()> {
    let tcp = TcpStream::connect((host, port))
        .await
        .map_err(|e| NetError::Connection(e.to_string()))?;

    let connector = connector_for(identity, session_cache_enabled)?;
    let server_name = ServerName::try_from(host.to_string()).map_err(|_| NetError::InvalidUrl(host.to_string()))?;

    let mut stream = connector
        .connect(server_name, tcp)
        .await
        .map_err(|e| NetError::TlsFailure(e.to_string()))?;

    let der = stream
        .get_ref()
        .1
        .peer_certificates()
        .and_then(|certs| certs.first())
        .map(|c| c.as_ref().to_vec());
    let Some(der) = der else {
        return Err(NetError::TlsFailure("no server certificate presented".to_string()));
    };
    if !check_certificate(req, trust, host, port, default_port, &der, is_proxy)? {
        return Ok(());
    }

    if stream.write_all(&content).await.is_err() {
        req.finish_with(GmStatusCode::TlsFailure, "connection reset while sending request".to_string());
        return Ok(());
    }

    req.begin_header();
    let mut buf = [0u8; 4096];
    loop {
        let n = match stream.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) => {
                req.finish_with(GmStatusCode::TlsFailure, e.to_string());
                return Ok(());
            }
        };
        if req.feed_header_or_body(&buf[..n]) {
            // Header parsed; remaining reads append to body directly.
        }
        if req.is_finished() {
            return Ok(());
        }
    }

    req.finish_after_close();
    Ok(())
}
