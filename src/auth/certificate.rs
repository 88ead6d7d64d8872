//! Local certificate-store lookup.
//!
//! Certificates live as PEM files under a fixed directory layout:
//! `<store root>/<store name>/<anything>.pem` with the private key alongside
//! as `<anything>.key`. Two store roots exist, mirroring the per-user and
//! machine-wide stores of the reference deployment.
//!
//! The scan is a deterministic linear walk over the small location × name
//! cross-product: store locations in declaration order, store names inside
//! each location, files in lexicographic order. The first certificate whose
//! SHA-1 thumbprint matches *and* whose private key is readable wins; a
//! matching certificate without a key keeps the scan going.

use std::fmt;
use std::path::{Path, PathBuf};

use tracing::{debug, trace};
use x509_parser::pem::Pem;
use zeroize::Zeroizing;

use crate::errors::{Error, Result};

/// Hex SHA-1 digest of a DER-encoded certificate, the store's match key.
pub fn thumbprint_hex(der: &[u8]) -> String {
    let digest = ring::digest::digest(&ring::digest::SHA1_FOR_LEGACY_USE_ONLY, der);
    hex::encode(digest.as_ref())
}

/// Certificate store location, scanned in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreLocation {
    CurrentUser,
    LocalMachine,
}

impl StoreLocation {
    /// All locations, outer loop of the scan.
    pub const ALL: [StoreLocation; 2] = [StoreLocation::CurrentUser, StoreLocation::LocalMachine];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CurrentUser => "current_user",
            Self::LocalMachine => "local_machine",
        }
    }

    /// Default on-disk root for this location, if resolvable.
    fn default_root(&self) -> Option<PathBuf> {
        match self {
            Self::CurrentUser => {
                std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".datafab/certs"))
            }
            Self::LocalMachine => Some(PathBuf::from("/etc/datafab/certs")),
        }
    }
}

impl fmt::Display for StoreLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Named store within a location, scanned in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreName {
    My,
    Root,
    CertificateAuthority,
    TrustedPeople,
}

impl StoreName {
    /// All store names, inner loop of the scan.
    pub const ALL: [StoreName; 4] =
        [StoreName::My, StoreName::Root, StoreName::CertificateAuthority, StoreName::TrustedPeople];

    /// Directory name under the store root.
    pub fn dir_name(&self) -> &'static str {
        match self {
            Self::My => "my",
            Self::Root => "root",
            Self::CertificateAuthority => "ca",
            Self::TrustedPeople => "trusted-people",
        }
    }
}

impl fmt::Display for StoreName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.dir_name())
    }
}

/// A certificate matched in a store, with its private key material.
pub struct ClientCertificate {
    thumbprint: String,
    certificate_der: Vec<u8>,
    private_key_pem: Zeroizing<Vec<u8>>,
}

impl ClientCertificate {
    /// Assemble a certificate from raw DER and a PEM private key.
    pub fn new(certificate_der: Vec<u8>, private_key_pem: Vec<u8>) -> Self {
        let thumbprint = thumbprint_hex(&certificate_der);
        Self { thumbprint, certificate_der, private_key_pem: Zeroizing::new(private_key_pem) }
    }

    /// Hex SHA-1 thumbprint of the certificate.
    pub fn thumbprint(&self) -> &str {
        &self.thumbprint
    }

    /// DER bytes of the certificate.
    pub fn certificate_der(&self) -> &[u8] {
        &self.certificate_der
    }

    /// PEM bytes of the private key.
    pub fn private_key_pem(&self) -> &[u8] {
        &self.private_key_pem
    }
}

impl fmt::Debug for ClientCertificate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Key material stays out of Debug output.
        f.debug_struct("ClientCertificate").field("thumbprint", &self.thumbprint).finish()
    }
}

/// The set of certificate stores a scan walks.
#[derive(Debug, Clone)]
pub struct CertificateStores {
    roots: Vec<(StoreLocation, PathBuf)>,
}

impl CertificateStores {
    /// Stores at the default per-user and machine-wide roots.
    pub fn from_env() -> Self {
        let roots = StoreLocation::ALL
            .iter()
            .filter_map(|location| location.default_root().map(|root| (*location, root)))
            .collect();
        Self { roots }
    }

    /// Stores at explicit roots, preserving the given location order.
    pub fn with_roots(roots: Vec<(StoreLocation, PathBuf)>) -> Self {
        Self { roots }
    }

    /// Find a certificate by thumbprint across all stores.
    ///
    /// Scan order is fixed: locations in root order, store names inside each
    /// location, files lexicographically. The first match with an accessible
    /// private key is returned.
    pub fn find_by_thumbprint(&self, thumbprint: &str) -> Result<ClientCertificate> {
        for (location, root) in &self.roots {
            for name in StoreName::ALL {
                let dir = root.join(name.dir_name());
                trace!(location = %location, store = %name, "Scanning certificate store");
                if let Some(certificate) = scan_store(&dir, thumbprint) {
                    debug!(
                        location = %location,
                        store = %name,
                        thumbprint = %certificate.thumbprint,
                        "Matched certificate with accessible private key"
                    );
                    return Ok(certificate);
                }
            }
        }

        Err(Error::CredentialNotFound { thumbprint: thumbprint.to_string() })
    }
}

/// Scan one store directory for a thumbprint match with a readable key.
fn scan_store(dir: &Path, thumbprint: &str) -> Option<ClientCertificate> {
    let entries = std::fs::read_dir(dir).ok()?;

    let mut files: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            matches!(
                path.extension().and_then(|e| e.to_str()),
                Some("pem") | Some("crt")
            )
        })
        .collect();
    files.sort();

    for path in files {
        let Ok(bytes) = std::fs::read(&path) else { continue };
        for pem in Pem::iter_from_buffer(&bytes) {
            let Ok(pem) = pem else { break };
            if pem.label != "CERTIFICATE" || pem.parse_x509().is_err() {
                continue;
            }
            if !thumbprint_hex(&pem.contents).eq_ignore_ascii_case(thumbprint) {
                continue;
            }
            if let Some(key) = load_private_key(&path.with_extension("key")) {
                return Some(ClientCertificate {
                    thumbprint: thumbprint_hex(&pem.contents),
                    certificate_der: pem.contents,
                    private_key_pem: key,
                });
            }
            trace!(path = %path.display(), "Thumbprint matched but no accessible private key");
        }
    }

    None
}

/// Read and validate the private key next to a certificate file.
fn load_private_key(path: &Path) -> Option<Zeroizing<Vec<u8>>> {
    let bytes = std::fs::read(path).ok()?;
    match rustls_pemfile::private_key(&mut bytes.as_slice()) {
        Ok(Some(_)) => Some(Zeroizing::new(bytes)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    struct TestCert {
        pem: String,
        key_pem: String,
        thumbprint: String,
    }

    fn generate_cert() -> TestCert {
        let generated =
            rcgen::generate_simple_self_signed(vec!["datafab.test".to_string()]).unwrap();
        TestCert {
            pem: generated.cert.pem(),
            key_pem: generated.key_pair.serialize_pem(),
            thumbprint: thumbprint_hex(generated.cert.der()),
        }
    }

    fn write_cert(root: &Path, store: StoreName, stem: &str, cert: &TestCert, with_key: bool) {
        let dir = root.join(store.dir_name());
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(format!("{stem}.pem")), &cert.pem).unwrap();
        if with_key {
            fs::write(dir.join(format!("{stem}.key")), &cert.key_pem).unwrap();
        }
    }

    fn stores(user_root: &Path, machine_root: &Path) -> CertificateStores {
        CertificateStores::with_roots(vec![
            (StoreLocation::CurrentUser, user_root.to_path_buf()),
            (StoreLocation::LocalMachine, machine_root.to_path_buf()),
        ])
    }

    #[test]
    fn test_finds_certificate_with_private_key() {
        let user = TempDir::new().unwrap();
        let machine = TempDir::new().unwrap();
        let cert = generate_cert();
        write_cert(user.path(), StoreName::My, "app", &cert, true);

        let found =
            stores(user.path(), machine.path()).find_by_thumbprint(&cert.thumbprint).unwrap();
        assert_eq!(found.thumbprint(), cert.thumbprint);
        assert!(!found.private_key_pem().is_empty());
    }

    #[test]
    fn test_match_without_key_is_not_enough() {
        let user = TempDir::new().unwrap();
        let machine = TempDir::new().unwrap();
        let cert = generate_cert();
        write_cert(user.path(), StoreName::My, "app", &cert, false);

        let err =
            stores(user.path(), machine.path()).find_by_thumbprint(&cert.thumbprint).unwrap_err();
        assert!(matches!(err, Error::CredentialNotFound { .. }));
    }

    #[test]
    fn test_scan_continues_past_keyless_match() {
        // Same certificate in the user store (no key) and the machine store
        // (with key): the scan must pass over the first and return the second.
        let user = TempDir::new().unwrap();
        let machine = TempDir::new().unwrap();
        let cert = generate_cert();
        write_cert(user.path(), StoreName::My, "app", &cert, false);
        write_cert(machine.path(), StoreName::Root, "app", &cert, true);

        let found =
            stores(user.path(), machine.path()).find_by_thumbprint(&cert.thumbprint).unwrap();
        assert_eq!(found.thumbprint(), cert.thumbprint);
    }

    #[test]
    fn test_scan_is_deterministic() {
        let user = TempDir::new().unwrap();
        let machine = TempDir::new().unwrap();
        let first = generate_cert();
        let second = generate_cert();
        write_cert(user.path(), StoreName::My, "first", &first, true);
        write_cert(machine.path(), StoreName::CertificateAuthority, "second", &second, true);

        let stores = stores(user.path(), machine.path());
        for _ in 0..3 {
            assert_eq!(
                stores.find_by_thumbprint(&first.thumbprint).unwrap().thumbprint(),
                first.thumbprint
            );
            assert_eq!(
                stores.find_by_thumbprint(&second.thumbprint).unwrap().thumbprint(),
                second.thumbprint
            );
        }
    }

    #[test]
    fn test_thumbprint_match_is_case_insensitive() {
        let user = TempDir::new().unwrap();
        let machine = TempDir::new().unwrap();
        let cert = generate_cert();
        write_cert(user.path(), StoreName::My, "app", &cert, true);

        let found = stores(user.path(), machine.path())
            .find_by_thumbprint(&cert.thumbprint.to_uppercase())
            .unwrap();
        assert_eq!(found.thumbprint(), cert.thumbprint);
    }

    #[test]
    fn test_unknown_thumbprint_reports_credential_not_found() {
        let user = TempDir::new().unwrap();
        let machine = TempDir::new().unwrap();

        let err = stores(user.path(), machine.path()).find_by_thumbprint("deadbeef").unwrap_err();
        let Error::CredentialNotFound { thumbprint } = err else {
            panic!("expected CredentialNotFound");
        };
        assert_eq!(thumbprint, "deadbeef");
    }

    #[test]
    fn test_client_certificate_debug_omits_key() {
        let cert = generate_cert();
        let generated =
            rcgen::generate_simple_self_signed(vec!["datafab.test".to_string()]).unwrap();
        let client = ClientCertificate::new(
            generated.cert.der().to_vec(),
            cert.key_pem.clone().into_bytes(),
        );
        let debug = format!("{:?}", client);
        assert!(debug.contains("thumbprint"));
        assert!(!debug.contains("PRIVATE KEY"));
    }
}
