//! TLS acceptor construction.
//!
//! The acceptor is built once at startup and cloned into every TLS accept
//! task. Certificates come either from PEM files or, for local use, from a
//! freshly generated self-signed certificate.

use anyhow::{anyhow, Context};
use rcgen::{CertificateParams, KeyPair};
use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};
use rustls::ServerConfig;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;
use tokio_rustls::TlsAcceptor;
use tracing::{info, warn};

/// Loads a certificate chain and private key from PEM files.
///
/// The certificate file may hold a chain (multiple PEM blocks); the key file
/// must hold one PKCS#1, PKCS#8 or SEC1 private key.
pub fn load_tls_acceptor(cert_path: &Path, key_path: &Path) -> anyhow::Result<TlsAcceptor> {
    let mut certs_reader = BufReader::new(
        File::open(cert_path)
            .with_context(|| format!("opening certificate file {}", cert_path.display()))?,
    );
    let certs = rustls_pemfile::certs(&mut certs_reader)
        .collect::<Result<Vec<_>, _>>()
        .with_context(|| format!("parsing certificates in {}", cert_path.display()))?;
    if certs.is_empty() {
        return Err(anyhow!("no certificates found in {}", cert_path.display()));
    }

    let mut key_reader = BufReader::new(
        File::open(key_path)
            .with_context(|| format!("opening key file {}", key_path.display()))?,
    );
    let key = rustls_pemfile::private_key(&mut key_reader)
        .with_context(|| format!("parsing private key in {}", key_path.display()))?
        .ok_or_else(|| anyhow!("no private key found in {}", key_path.display()))?;

    info!(
        cert = %cert_path.display(),
        chain_len = certs.len(),
        "Loaded TLS certificate"
    );
    acceptor_from_parts(certs, key)
}

/// Generates a self-signed certificate for `names` and a key for it.
pub fn self_signed_identity(
    names: &[String],
) -> anyhow::Result<(CertificateDer<'static>, PrivateKeyDer<'static>)> {
    let key_pair = KeyPair::generate()?;
    let cert = CertificateParams::new(names.to_vec())?.self_signed(&key_pair)?;
    let key = PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(key_pair.serialize_der()));
    Ok((cert.der().clone(), key))
}

/// Builds an acceptor around a freshly generated self-signed certificate.
pub fn self_signed_acceptor(names: &[String]) -> anyhow::Result<TlsAcceptor> {
    let (cert, key) = self_signed_identity(names)?;
    warn!(names = ?names, "Serving TLS with a self-signed certificate");
    acceptor_from_parts(vec![cert], key)
}

/// Builds an acceptor from DER certificate chain and key.
pub fn acceptor_from_parts(
    certs: Vec<CertificateDer<'static>>,
    key: PrivateKeyDer<'static>,
) -> anyhow::Result<TlsAcceptor> {
    let config = ServerConfig::builder_with_provider(Arc::new(
        rustls::crypto::ring::default_provider(),
    ))
    .with_safe_default_protocol_versions()?
    .with_no_client_auth()
    .with_single_cert(certs, key)
    .context("building TLS server config")?;

    Ok(TlsAcceptor::from(Arc::new(config)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::{handle_connection, Pipeline};
    use rcgen::{BasicConstraints, IsCa};
    use rustls::pki_types::ServerName;
    use rustls::{ClientConfig, RootCertStore};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};
    use tokio_rustls::TlsConnector;

    struct TestPki {
        ca: CertificateDer<'static>,
        chain: Vec<CertificateDer<'static>>,
        key: PrivateKeyDer<'static>,
    }

    fn test_pki() -> TestPki {
        let ca_key = KeyPair::generate().unwrap();
        let mut ca_params = CertificateParams::default();
        ca_params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        let ca_cert = ca_params.self_signed(&ca_key).unwrap();

        let leaf_key = KeyPair::generate().unwrap();
        let leaf_cert = CertificateParams::new(vec!["localhost".to_string()])
            .unwrap()
            .signed_by(&leaf_key, &ca_cert, &ca_key)
            .unwrap();

        TestPki {
            ca: ca_cert.der().clone(),
            chain: vec![leaf_cert.der().clone()],
            key: PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(leaf_key.serialize_der())),
        }
    }

    fn connector(ca: CertificateDer<'static>) -> TlsConnector {
        let mut roots = RootCertStore::empty();
        roots.add(ca).unwrap();
        let config = ClientConfig::builder_with_provider(Arc::new(
            rustls::crypto::ring::default_provider(),
        ))
        .with_safe_default_protocol_versions()
        .unwrap()
        .with_root_certificates(roots)
        .with_no_client_auth();
        TlsConnector::from(Arc::new(config))
    }

    #[test]
    fn test_self_signed_acceptor_builds() {
        assert!(self_signed_acceptor(&["localhost".to_string()]).is_ok());
    }

    #[test]
    fn test_missing_files_are_reported() {
        let err = match load_tls_acceptor(
            Path::new("/nonexistent/cert.pem"),
            Path::new("/nonexistent/key.pem"),
        ) {
            Err(e) => e,
            Ok(_) => panic!("loading missing files succeeded"),
        };
        assert!(err.to_string().contains("/nonexistent/cert.pem"));
    }

    #[test]
    fn test_load_from_pem_files() {
        let key_pair = KeyPair::generate().unwrap();
        let cert = CertificateParams::new(vec!["localhost".to_string()])
            .unwrap()
            .self_signed(&key_pair)
            .unwrap();

        let dir = std::env::temp_dir().join(format!("apiserver-tls-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let cert_path = dir.join("cert.pem");
        let key_path = dir.join("key.pem");
        std::fs::write(&cert_path, cert.pem()).unwrap();
        std::fs::write(&key_path, key_pair.serialize_pem()).unwrap();

        let result = load_tls_acceptor(&cert_path, &key_path);
        std::fs::remove_dir_all(&dir).unwrap();
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_request_over_tls() {
        let pki = test_pki();
        let acceptor = acceptor_from_parts(pki.chain, pki.key).unwrap();

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (stream, client_addr) = listener.accept().await.unwrap();
            handle_connection(stream, client_addr, Some(acceptor), Pipeline::default()).await;
        });

        let tcp = TcpStream::connect(addr).await.unwrap();
        let mut client = connector(pki.ca)
            .connect(ServerName::try_from("localhost").unwrap(), tcp)
            .await
            .unwrap();

        client
            .write_all(b"GET /users HTTP/1.1\r\nemail: a@b.c\r\nconnection: close\r\n\r\n")
            .await
            .unwrap();

        let mut response = Vec::new();
        // The server may close without close_notify once the response is out.
        let _ = client.read_to_end(&mut response).await;
        let response = String::from_utf8(response).unwrap();

        assert!(response.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(response.ends_with(r#"{"resultCode":"200","message":"Success","userNo":"12312"}"#));
    }
}
