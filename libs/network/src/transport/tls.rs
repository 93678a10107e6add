//! TLS contexts and credential provisioning
//!
//! The client context skips peer-certificate verification entirely: any
//! certificate the server presents is accepted, only the handshake signatures
//! are checked. This is a demo-grade trust model. Deployments that need real
//! trust must build their own [`ClientConfig`] with a root store.
//!
//! The server identity comes from a [`CredentialProvider`]. The default
//! [`SelfSignedProvider`] mints a fresh key and a one-year certificate for
//! `localhost` on every call; tests hand a pre-generated identity to
//! [`StaticCredentials`] instead.

use crate::{Result, TransportError};
use chrono::{Datelike, Days, NaiveDate, Utc};
use rcgen::{CertificateParams, DistinguishedName, DnType, KeyPair, SerialNumber};
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::{verify_tls12_signature, verify_tls13_signature, CryptoProvider, WebPkiSupportedAlgorithms};
use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, ServerConfig, SignatureScheme};
use std::sync::Arc;

/// Common name presented by the server certificate
pub const SERVER_COMMON_NAME: &str = "localhost";

/// Certificate lifetime used by [`SelfSignedProvider::default`]
pub const DEFAULT_VALIDITY_DAYS: u64 = 365;

/// Certificate chain head and its private key
#[derive(Debug)]
pub struct Credentials {
    pub certificate: CertificateDer<'static>,
    pub private_key: PrivateKeyDer<'static>,
}

impl Clone for Credentials {
    fn clone(&self) -> Self {
        Self {
            certificate: self.certificate.clone(),
            private_key: self.private_key.clone_key(),
        }
    }
}

/// Source of the server's TLS identity
pub trait CredentialProvider: Send + Sync {
    /// Produce a certificate and key for `common_name`
    fn provision(&self, common_name: &str) -> Result<Credentials>;
}

/// Generates a self-signed identity on demand
#[derive(Debug, Clone, Copy)]
pub struct SelfSignedProvider {
    validity_days: u64,
}

impl SelfSignedProvider {
    pub fn new(validity_days: u64) -> Self {
        Self { validity_days }
    }
}

impl Default for SelfSignedProvider {
    fn default() -> Self {
        Self::new(DEFAULT_VALIDITY_DAYS)
    }
}

impl CredentialProvider for SelfSignedProvider {
    fn provision(&self, common_name: &str) -> Result<Credentials> {
        let key_pair = KeyPair::generate()
            .map_err(|e| TransportError::tls_with_source("Failed to generate key pair", e))?;

        let mut params = CertificateParams::new(vec![common_name.to_string()]).map_err(|e| {
            TransportError::tls_with_source("Failed to create certificate parameters", e)
        })?;

        let mut name = DistinguishedName::new();
        name.push(DnType::CommonName, common_name);
        params.distinguished_name = name;
        params.serial_number = Some(SerialNumber::from(1u64));

        let ymd = |d: NaiveDate| rcgen::date_time_ymd(d.year(), d.month() as u8, d.day() as u8);
        let today = Utc::now().date_naive();
        let expiry = today
            .checked_add_days(Days::new(self.validity_days))
            .ok_or_else(|| TransportError::tls("Certificate expiry date out of range"))?;
        params.not_before = ymd(today);
        params.not_after = ymd(expiry);

        let certificate = params
            .self_signed(&key_pair)
            .map_err(|e| TransportError::tls_with_source("Failed to sign certificate", e))?;

        Ok(Credentials {
            certificate: certificate.der().clone(),
            private_key: PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(key_pair.serialize_der())),
        })
    }
}

/// Hands out one fixed identity regardless of the requested name
#[derive(Debug, Clone)]
pub struct StaticCredentials {
    credentials: Credentials,
}

impl StaticCredentials {
    pub fn new(credentials: Credentials) -> Self {
        Self { credentials }
    }
}

impl CredentialProvider for StaticCredentials {
    fn provision(&self, _common_name: &str) -> Result<Credentials> {
        Ok(self.credentials.clone())
    }
}

fn crypto_provider() -> Arc<CryptoProvider> {
    Arc::new(rustls::crypto::ring::default_provider())
}

/// Accepts every server certificate; still checks handshake signatures
#[derive(Debug)]
struct AcceptAnyServerCert {
    algorithms: WebPkiSupportedAlgorithms,
}

impl ServerCertVerifier for AcceptAnyServerCert {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> std::result::Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls12_signature(message, cert, dss, &self.algorithms)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls13_signature(message, cert, dss, &self.algorithms)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.algorithms.supported_schemes()
    }
}

/// Build the client context (created once per client session)
pub fn client_config() -> Result<Arc<ClientConfig>> {
    let provider = crypto_provider();
    let verifier = Arc::new(AcceptAnyServerCert {
        algorithms: provider.signature_verification_algorithms,
    });

    let config = ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .map_err(|e| TransportError::tls_with_source("Failed to create TLS client context", e))?
        .dangerous()
        .with_custom_certificate_verifier(verifier)
        .with_no_client_auth();

    Ok(Arc::new(config))
}

/// Build the server context (created once per server instance)
pub fn server_config(provider: &dyn CredentialProvider) -> Result<Arc<ServerConfig>> {
    let credentials = provider.provision(SERVER_COMMON_NAME)?;

    let config = ServerConfig::builder_with_provider(crypto_provider())
        .with_safe_default_protocol_versions()
        .map_err(|e| TransportError::tls_with_source("Failed to create TLS server context", e))?
        .with_no_client_auth()
        .with_single_cert(vec![credentials.certificate], credentials.private_key)
        .map_err(|e| TransportError::tls_with_source("Failed to load server certificate", e))?;

    Ok(Arc::new(config))
}
