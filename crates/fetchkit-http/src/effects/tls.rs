//! Raw TLS handshakes that capture the certificate chain a server presents,
//! whether or not it would verify.

use std::io;
use std::net::{TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::time::Duration;

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{ClientConfig, ClientConnection, DigitallySignedStruct, SignatureScheme};

use super::transport::TransportError;

/// Accepts any chain. Used only to read certificates, never to send data.
#[derive(Debug)]
struct NoVerifier;

impl ServerCertVerifier for NoVerifier {
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
        vec![
            SignatureScheme::RSA_PKCS1_SHA1,
            SignatureScheme::ECDSA_SHA1_Legacy,
            SignatureScheme::RSA_PKCS1_SHA256,
            SignatureScheme::ECDSA_NISTP256_SHA256,
            SignatureScheme::RSA_PKCS1_SHA384,
            SignatureScheme::ECDSA_NISTP384_SHA384,
            SignatureScheme::RSA_PKCS1_SHA512,
            SignatureScheme::ECDSA_NISTP521_SHA512,
            SignatureScheme::RSA_PSS_SHA256,
            SignatureScheme::RSA_PSS_SHA384,
            SignatureScheme::RSA_PSS_SHA512,
            SignatureScheme::ED25519,
            SignatureScheme::ED448,
        ]
    }
}

fn io_error(e: io::Error) -> TransportError {
    match e.kind() {
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TransportError::Timeout,
        _ => TransportError::Connect(e.to_string()),
    }
}

fn capture_config() -> Result<Arc<ClientConfig>, TransportError> {
    let config = ClientConfig::builder_with_provider(Arc::new(rustls::crypto::ring::default_provider()))
        .with_safe_default_protocol_versions()
        .map_err(|e| TransportError::Other(Box::new(e)))?
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(NoVerifier))
        .with_no_client_auth();
    Ok(Arc::new(config))
}

/// DER certificates presented by `host:port`, leaf first.
///
/// `timeout` bounds the TCP connect and every read and write of the
/// handshake.
pub(crate) fn peer_certificates(host: &str, port: u16, timeout: Duration) -> Result<Vec<Vec<u8>>, TransportError> {
    let addr = (host, port)
        .to_socket_addrs()
        .map_err(io_error)?
        .next()
        .ok_or_else(|| TransportError::Connect(format!("{host} did not resolve")))?;

    let mut sock = TcpStream::connect_timeout(&addr, timeout).map_err(io_error)?;
    sock.set_read_timeout(Some(timeout)).map_err(io_error)?;
    sock.set_write_timeout(Some(timeout)).map_err(io_error)?;

    let server_name = ServerName::try_from(host.to_string()).map_err(|e| TransportError::Build(e.to_string()))?;
    let mut conn = ClientConnection::new(capture_config()?, server_name).map_err(|e| TransportError::Other(Box::new(e)))?;

    while conn.is_handshaking() {
        conn.complete_io(&mut sock).map_err(io_error)?;
    }

    let chain: Vec<Vec<u8>> = conn
        .peer_certificates()
        .unwrap_or_default()
        .iter()
        .map(|cert| cert.as_ref().to_vec())
        .collect();

    conn.send_close_notify();
    let _ = conn.complete_io(&mut sock);

    tracing::debug!(host, port, certificates = chain.len(), "captured peer certificates");
    Ok(chain)
}
