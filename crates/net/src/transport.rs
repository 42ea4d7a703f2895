//! QUIC transport layer using quinn for reliable, encrypted connections.
//!
//! Provides relay and client endpoints with TLS encryption. The relay
//! endpoint mints a self-signed certificate for development rooms; clients
//! choose between verifying against native roots and skipping verification
//! for local play.

use anyhow::{Context, Result};
use quinn::{ClientConfig, Endpoint, ServerConfig};
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::RootCertStore;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{debug, info};

/// ALPN protocol id both sides must offer.
const ALPN: &[u8] = b"gridtown";

/// How the client verifies the relay's certificate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TlsMode {
    /// Verify against the platform's native root store.
    #[default]
    Native,
    /// Accept any certificate. Local development rooms only.
    Insecure,
}

/// Relay endpoint accepting QUIC connections from game clients.
pub struct RelayEndpoint {
    endpoint: Endpoint,
    addr: SocketAddr,
}

impl RelayEndpoint {
    /// Bind a relay endpoint on `addr` with a fresh self-signed certificate.
    pub fn bind(addr: SocketAddr) -> Result<Self> {
        info!("Creating relay endpoint on {}", addr);

        let _ = rustls::crypto::ring::default_provider().install_default();

        let (cert, key) = generate_self_signed_cert()?;

        let mut server_crypto = rustls::ServerConfig::builder()
            .with_no_client_auth()
            .with_single_cert(vec![cert.clone()], key.clone_key())
            .context("Failed to build rustls ServerConfig")?;

        server_crypto.alpn_protocols = vec![ALPN.to_vec()];

        let mut server_config = ServerConfig::with_crypto(Arc::new(
            quinn::crypto::rustls::QuicServerConfig::try_from(server_crypto)
                .context("Failed to create QuicServerConfig")?,
        ));

        let mut transport_config = quinn::TransportConfig::default();
        transport_config.keep_alive_interval(Some(std::time::Duration::from_secs(5)));
        transport_config.max_idle_timeout(Some(std::time::Duration::from_secs(60).try_into()?));

        server_config.transport_config(Arc::new(transport_config));

        let endpoint =
            Endpoint::server(server_config, addr).context("Failed to bind relay endpoint")?;

        let actual_addr = endpoint.local_addr()?;
        info!("Relay endpoint bound to {}", actual_addr);

        Ok(Self {
            endpoint,
            addr: actual_addr,
        })
    }

    /// Local address this endpoint is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Accept an incoming connection. Returns `None` when the endpoint is closed.
    pub async fn accept(&self) -> Option<quinn::Incoming> {
        self.endpoint.accept().await
    }

    /// Close the endpoint, rejecting new connections.
    pub fn close(&self) {
        self.endpoint.close(0u32.into(), b"Relay shutting down");
    }
}

/// Client endpoint for establishing QUIC connections to a relay.
pub struct ClientEndpoint {
    endpoint: Endpoint,
}

impl ClientEndpoint {
    /// Create a client endpoint with the given verification mode.
    pub fn new(tls: TlsMode) -> Result<Self> {
        debug!("Creating client endpoint ({:?})", tls);

        let _ = rustls::crypto::ring::default_provider().install_default();

        let mut client_crypto = match tls {
            TlsMode::Native => {
                let mut roots = RootCertStore::empty();
                let native = rustls_native_certs::load_native_certs();
                for err in native.errors {
                    debug!(%err, "skipping unreadable platform certificate");
                }
                for cert in native.certs {
                    // Individual unparseable platform certs are skipped
                    let _ = roots.add(cert);
                }
                rustls::ClientConfig::builder()
                    .with_root_certificates(roots)
                    .with_no_client_auth()
            }
            TlsMode::Insecure => rustls::ClientConfig::builder()
                .dangerous()
                .with_custom_certificate_verifier(Arc::new(SkipServerVerification))
                .with_no_client_auth(),
        };

        client_crypto.alpn_protocols = vec![ALPN.to_vec()];

        let client_config = ClientConfig::new(Arc::new(
            quinn::crypto::rustls::QuicClientConfig::try_from(client_crypto)
                .context("Failed to create QuicClientConfig")?,
        ));

        let mut endpoint = Endpoint::client("0.0.0.0:0".parse()?)?;
        endpoint.set_default_client_config(client_config);

        debug!("Client endpoint created on {}", endpoint.local_addr()?);

        Ok(Self { endpoint })
    }

    /// Connect to a relay at the given address.
    pub async fn connect(&self, relay_addr: SocketAddr, server_name: &str) -> Result<quinn::Connection> {
        info!("Connecting to relay at {}", relay_addr);

        let connection = self
            .endpoint
            .connect(relay_addr, server_name)
            .context("Failed to initiate connection")?
            .await
            .context("Failed to establish connection")?;

        info!("Connected to relay at {}", relay_addr);

        Ok(connection)
    }

    /// Close the endpoint, terminating all connections.
    pub fn close(&self) {
        self.endpoint.close(0u32.into(), b"Client shutting down");
    }
}

/// Generate a self-signed certificate for development use.
///
/// **WARNING:** Insecure; development and testing only.
fn generate_self_signed_cert() -> Result<(CertificateDer<'static>, PrivateKeyDer<'static>)> {
    debug!("Generating self-signed certificate");

    let cert = rcgen::generate_simple_self_signed(vec!["localhost".to_string()])
        .context("Failed to generate certificate")?;

    let key = PrivateKeyDer::Pkcs8(cert.key_pair.serialize_der().into());
    let cert_der = CertificateDer::from(cert.cert);

    Ok((cert_der, key))
}

/// Certificate verifier that accepts all certificates (development only).
///
/// **WARNING:** Bypasses TLS security; NEVER use outside local rooms.
#[derive(Debug)]
struct SkipServerVerification;

impl rustls::client::danger::ServerCertVerifier for SkipServerVerification {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &rustls::pki_types::ServerName<'_>,
        _ocsp_response: &[u8],
        _now: rustls::pki_types::UnixTime,
    ) -> Result<rustls::client::danger::ServerCertVerified, rustls::Error> {
        Ok(rustls::client::danger::ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        vec![
            rustls::SignatureScheme::RSA_PKCS1_SHA256,
            rustls::SignatureScheme::ECDSA_NISTP256_SHA256,
            rustls::SignatureScheme::ED25519,
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn relay_binds_to_ephemeral_port() {
        let relay =
            RelayEndpoint::bind("127.0.0.1:0".parse().unwrap()).expect("Failed to bind relay");
        assert!(relay.local_addr().port() > 0);
    }

    #[tokio::test]
    async fn client_creation_insecure() {
        let client = ClientEndpoint::new(TlsMode::Insecure).expect("Failed to create client");
        client.close();
    }

    #[tokio::test]
    async fn connection_handshake() {
        let relay =
            RelayEndpoint::bind("127.0.0.1:0".parse().unwrap()).expect("Failed to bind relay");
        let relay_addr = relay.local_addr();

        let relay_handle = tokio::spawn(async move {
            if let Some(incoming) = relay.accept().await {
                incoming.await.expect("Failed to accept connection")
            } else {
                panic!("Relay closed before accepting connection")
            }
        });

        let client = ClientEndpoint::new(TlsMode::Insecure).expect("Failed to create client");
        let client_conn = client
            .connect(relay_addr, "localhost")
            .await
            .expect("Failed to connect");

        let relay_conn = relay_handle.await.expect("Relay task panicked");

        assert_eq!(client_conn.remote_address(), relay_addr);
        assert!(relay_conn.remote_address().port() > 0);

        client_conn.close(0u32.into(), b"Test complete");
        relay_conn.close(0u32.into(), b"Test complete");
    }
}
