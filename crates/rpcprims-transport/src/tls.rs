use std::fmt;

use pkcs8::der::zeroize::Zeroizing;
use pkcs8::der::Document;
use pkcs8::{EncryptedPrivateKeyInfo, LineEnding};
use reqwest::{Certificate, ClientBuilder, Identity};

use crate::error::{Result, TransportError};

/// Client TLS material for outbound calls.
///
/// A client identity is either a PEM certificate plus a PKCS#8 key, or a
/// PKCS#12 archive (`pfx`). The passphrase unlocks whichever is supplied; a
/// PEM key with a passphrase must be an `ENCRYPTED PRIVATE KEY`.
#[derive(Clone, Default)]
pub struct TlsMaterial {
    pub cert_pem: Option<Vec<u8>>,
    pub key_pem: Option<Vec<u8>>,
    pub pfx: Option<Vec<u8>>,
    pub passphrase: Option<String>,
    /// Extra trusted CA certificates, PEM.
    pub ca_pem: Vec<Vec<u8>>,
}

impl TlsMaterial {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn identity_pem(mut self, cert: impl Into<Vec<u8>>, key: impl Into<Vec<u8>>) -> Self {
        self.cert_pem = Some(cert.into());
        self.key_pem = Some(key.into());
        self
    }

    pub fn pfx(mut self, archive: impl Into<Vec<u8>>, passphrase: impl Into<String>) -> Self {
        self.pfx = Some(archive.into());
        self.passphrase = Some(passphrase.into());
        self
    }

    pub fn passphrase(mut self, passphrase: impl Into<String>) -> Self {
        self.passphrase = Some(passphrase.into());
        self
    }

    pub fn ca(mut self, pem: impl Into<Vec<u8>>) -> Self {
        self.ca_pem.push(pem.into());
        self
    }

    /// Apply this material to a client builder.
    pub fn apply(&self, mut builder: ClientBuilder) -> Result<ClientBuilder> {
        if let Some(identity) = self.identity()? {
            builder = builder.identity(identity);
        }
        for pem in &self.ca_pem {
            let certificate = Certificate::from_pem(pem)
                .map_err(|err| TransportError::Tls(format!("CA certificate: {err}")))?;
            builder = builder.add_root_certificate(certificate);
        }
        Ok(builder)
    }

    fn identity(&self) -> Result<Option<Identity>> {
        match (&self.pfx, &self.cert_pem, &self.key_pem) {
            (Some(_), Some(_), _) | (Some(_), _, Some(_)) => Err(TransportError::Tls(
                "supply either a pfx archive or a PEM certificate and key, not both".to_string(),
            )),
            (Some(archive), None, None) => {
                let passphrase = self.passphrase.as_deref().unwrap_or_default();
                Identity::from_pkcs12_der(archive, passphrase)
                    .map(Some)
                    .map_err(|err| TransportError::Tls(format!("pfx archive: {err}")))
            }
            (None, Some(cert), Some(key)) => {
                let identity = match &self.passphrase {
                    Some(passphrase) => {
                        let key = decrypt_pem_key(key, passphrase)?;
                        Identity::from_pkcs8_pem(cert, key.as_bytes())
                    }
                    None => Identity::from_pkcs8_pem(cert, key),
                };
                identity
                    .map(Some)
                    .map_err(|err| TransportError::Tls(format!("PEM identity: {err}")))
            }
            (None, Some(_), None) | (None, None, Some(_)) => Err(TransportError::Tls(
                "a PEM certificate and key must be supplied together".to_string(),
            )),
            (None, None, None) => Ok(None),
        }
    }
}

/// Decrypt an `ENCRYPTED PRIVATE KEY` PEM block into a plain PKCS#8 PEM.
fn decrypt_pem_key(key: &[u8], passphrase: &str) -> Result<Zeroizing<String>> {
    let pem = std::str::from_utf8(key)
        .map_err(|_| TransportError::Tls("private key is not PEM text".to_string()))?;
    let (label, document) = Document::from_pem(pem)
        .map_err(|err| TransportError::Tls(format!("private key PEM: {err}")))?;
    if label != "ENCRYPTED PRIVATE KEY" {
        return Err(TransportError::Tls(format!(
            "a passphrase was given but the key is a {label}, not an ENCRYPTED PRIVATE KEY"
        )));
    }
    let encrypted = EncryptedPrivateKeyInfo::try_from(document.as_bytes())
        .map_err(|err| TransportError::Tls(format!("encrypted private key: {err}")))?;
    let decrypted = encrypted
        .decrypt(passphrase)
        .map_err(|err| TransportError::Tls(format!("decrypting private key: {err}")))?;
    decrypted
        .to_pem("PRIVATE KEY", LineEnding::LF)
        .map_err(|err| TransportError::Tls(format!("re-encoding private key: {err}")))
}

impl fmt::Debug for TlsMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TlsMaterial")
            .field("cert_pem", &self.cert_pem.is_some())
            .field("key_pem", &self.key_pem.as_ref().map(|_| "<redacted>"))
            .field("pfx", &self.pfx.is_some())
            .field("passphrase", &self.passphrase.as_ref().map(|_| "<redacted>"))
            .field("ca_pem", &self.ca_pem.len())
            .finish()
    }
}
