//! X.509 server certificates decoded into the fields callers inspect:
//! names, issuer, validity window and fingerprint.

use std::net::IpAddr;

use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use x509_parser::prelude::*;

use super::Url;

/// Signature algorithms built on SHA-1.
const SHA1_SIGNATURES: &[&str] = &[
    "1.2.840.113549.1.1.5", // sha1WithRSAEncryption
    "1.2.840.10045.4.1",    // ecdsa-with-SHA1
    "1.2.840.10040.4.3",    // dsa-with-sha1
    "1.3.14.3.2.29",        // sha1WithRSASignature
];

const CT_PRECERT_POISON: &str = "1.3.6.1.4.1.11129.2.4.3";

#[derive(Debug, thiserror::Error)]
pub enum CertError {
    #[error("invalid PEM: {0}")]
    Pem(String),
    #[error("invalid certificate: {0}")]
    Parse(String),
    #[error("validity timestamp out of range")]
    Validity,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SslCertificate {
    /// Subject common name.
    pub domain: String,
    /// DNS names from the subject alternative name extension.
    pub additional_domains: Vec<String>,
    pub ip_addresses: Vec<IpAddr>,
    /// Issuer common name.
    pub issuer: String,
    pub issuer_organization: String,
    pub signature_algorithm: String,
    pub serial: String,
    pub valid_from: DateTime<Utc>,
    pub valid_to: DateTime<Utc>,
    /// Hex SHA-256 of the DER encoding.
    pub fingerprint_sha256: String,
    pub pre_certificate: bool,
    #[serde(skip)]
    sha1_signature: bool,
}

fn first_str<'a, 'b: 'a>(mut values: impl Iterator<Item = &'a AttributeTypeAndValue<'b>>) -> String {
    values
        .next()
        .and_then(|v| v.as_str().ok())
        .unwrap_or_default()
        .to_string()
}

fn timestamp(time: ASN1Time) -> Result<DateTime<Utc>, CertError> {
    DateTime::from_timestamp(time.timestamp(), 0).ok_or(CertError::Validity)
}

impl SslCertificate {
    pub fn from_der(der: &[u8]) -> Result<Self, CertError> {
        let (_, cert) = parse_x509_certificate(der).map_err(|e| CertError::Parse(e.to_string()))?;

        let mut additional_domains = Vec::new();
        let mut ip_addresses = Vec::new();
        if let Ok(Some(san)) = cert.subject_alternative_name() {
            for name in &san.value.general_names {
                match name {
                    GeneralName::DNSName(dns) => additional_domains.push(dns.to_ascii_lowercase()),
                    GeneralName::IPAddress(raw) => {
                        if let Some(ip) = ip_from_bytes(raw) {
                            ip_addresses.push(ip);
                        }
                    }
                    _ => {}
                }
            }
        }

        let algorithm = &cert.signature_algorithm.algorithm;
        let algorithm_id = algorithm.to_id_string();
        let signature_algorithm = x509_parser::objects::oid2sn(algorithm, x509_parser::objects::oid_registry())
            .map(str::to_string)
            .unwrap_or_else(|_| algorithm_id.clone());

        Ok(Self {
            domain: first_str(cert.subject().iter_common_name()),
            additional_domains,
            ip_addresses,
            issuer: first_str(cert.issuer().iter_common_name()),
            issuer_organization: first_str(cert.issuer().iter_organization()),
            signature_algorithm,
            serial: cert.raw_serial_as_string(),
            valid_from: timestamp(cert.validity().not_before)?,
            valid_to: timestamp(cert.validity().not_after)?,
            fingerprint_sha256: hex::encode(Sha256::digest(der)),
            pre_certificate: cert
                .extensions()
                .iter()
                .any(|ext| ext.oid.to_id_string() == CT_PRECERT_POISON),
            sha1_signature: SHA1_SIGNATURES.contains(&algorithm_id.as_str()),
        })
    }

    pub fn from_pem(pem: &str) -> Result<Self, CertError> {
        let (_, pem) = x509_parser::pem::parse_x509_pem(pem.as_bytes()).map_err(|e| CertError::Pem(e.to_string()))?;
        Self::from_der(&pem.contents)
    }

    /// Alternative names plus the common name, deduplicated, empty names
    /// dropped.
    pub fn domains(&self) -> Vec<String> {
        let mut all: Vec<String> = Vec::new();
        for name in self.additional_domains.iter().chain([&self.domain]) {
            if !name.is_empty() && !all.contains(name) {
                all.push(name.clone());
            }
        }
        all
    }

    pub fn lifespan_in_days(&self) -> i64 { (self.valid_to - self.valid_from).num_days() }

    pub fn is_expired(&self) -> bool { self.valid_to <= Utc::now() }

    pub fn is_self_signed(&self) -> bool { self.issuer == self.domain }

    pub fn uses_sha1_hash(&self) -> bool { self.sha1_signature }

    /// Whole days left until expiry; negative once expired.
    pub fn days_until_expiration(&self) -> i64 { (self.valid_to - Utc::now()).num_days() }

    /// Whether the certificate names the host of `url` (an IP address or
    /// anything [`Url`] parses), honouring single-label wildcards.
    pub fn applies_to(&self, url: &str) -> bool {
        if let Ok(ip) = url.parse::<IpAddr>() {
            return self.ip_addresses.contains(&ip);
        }
        let Ok(url) = Url::parse(url) else {
            return false;
        };
        let host = url.host().to_ascii_lowercase();
        self.domains()
            .iter()
            .any(|name| wildcard_covers(&name.to_ascii_lowercase(), &host))
    }

    /// Inside the validity window now and, when given, applicable to `url`.
    pub fn is_valid(&self, url: Option<&str>) -> bool { self.is_valid_at(Utc::now(), url) }

    /// Like [`is_valid`](Self::is_valid), but also requires the certificate
    /// to outlive `at`.
    pub fn is_valid_until(&self, at: DateTime<Utc>, url: Option<&str>) -> bool {
        self.valid_to > at && self.is_valid(url)
    }

    fn is_valid_at(&self, now: DateTime<Utc>, url: Option<&str>) -> bool {
        if now < self.valid_from || now > self.valid_to {
            return false;
        }
        url.filter(|u| !u.is_empty()).is_none_or(|u| self.applies_to(u))
    }

    /// Whether `domain` is one of the certificate's names or a subdomain of
    /// one.
    pub fn contains_domain(&self, domain: &str) -> bool {
        self.domains()
            .iter()
            .any(|name| name == domain || domain.ends_with(&format!(".{name}")))
    }
}

fn ip_from_bytes(raw: &[u8]) -> Option<IpAddr> {
    match raw.len() {
        4 => <[u8; 4]>::try_from(raw).ok().map(IpAddr::from),
        16 => <[u8; 16]>::try_from(raw).ok().map(IpAddr::from),
        _ => None,
    }
}

/// `*.example.com` covers `www.example.com` but not `example.com` or
/// `a.b.example.com`.
fn wildcard_covers(pattern: &str, host: &str) -> bool {
    if pattern == host {
        return true;
    }
    let Some(suffix) = pattern.strip_prefix('*') else {
        return false;
    };
    if pattern.matches('.').count() < host.matches('.').count() {
        return false;
    }
    format!(".{host}").ends_with(suffix)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rcgen::{CertificateParams, DistinguishedName, DnType, KeyPair};

    fn issue(names: &[&str], common_name: &str) -> rcgen::Certificate {
        let mut params = CertificateParams::new(names.iter().map(|n| n.to_string()).collect::<Vec<_>>()).unwrap();
        let mut dn = DistinguishedName::new();
        dn.push(DnType::CommonName, common_name);
        dn.push(DnType::OrganizationName, "Fetchkit Test");
        params.distinguished_name = dn;
        let key = KeyPair::generate().unwrap();
        params.self_signed(&key).unwrap()
    }

    #[test]
    fn test_decode_self_signed() {
        let cert = issue(&["*.example.test", "example.test", "127.0.0.1"], "*.example.test");
        let info = SslCertificate::from_der(cert.der()).unwrap();

        assert_eq!(info.domain, "*.example.test");
        assert_eq!(info.issuer, "*.example.test");
        assert_eq!(info.issuer_organization, "Fetchkit Test");
        assert!(info.is_self_signed());
        assert_eq!(info.domains(), ["*.example.test", "example.test"]);
        assert_eq!(info.ip_addresses, ["127.0.0.1".parse::<IpAddr>().unwrap()]);
        assert!(info.valid_from < info.valid_to);
        assert_eq!(info.fingerprint_sha256.len(), 64);
        assert!(!info.uses_sha1_hash());
        assert!(!info.pre_certificate);
    }

    #[test]
    fn test_from_pem_matches_der() {
        let cert = issue(&["example.test"], "example.test");
        let from_pem = SslCertificate::from_pem(&cert.pem()).unwrap();
        assert_eq!(from_pem, SslCertificate::from_der(cert.der()).unwrap());
    }

    #[test]
    fn test_applies_to() {
        let cert = issue(&["*.example.test", "example.test", "127.0.0.1"], "*.example.test");
        let info = SslCertificate::from_der(cert.der()).unwrap();

        assert!(info.applies_to("www.example.test"));
        assert!(info.applies_to("https://example.test/path"));
        assert!(!info.applies_to("a.b.example.test"));
        assert!(!info.applies_to("other.test"));
        assert!(info.applies_to("127.0.0.1"));
        assert!(!info.applies_to("10.0.0.1"));
        assert!(info.contains_domain("deep.sub.example.test"));
    }

    #[test]
    fn test_validity_window() {
        let cert = issue(&["example.test"], "example.test");
        let info = SslCertificate::from_der(cert.der()).unwrap();

        assert!(!info.is_expired());
        assert!(info.is_valid(None));
        assert!(info.is_valid(Some("example.test")));
        assert!(!info.is_valid(Some("other.test")));
        assert!(!info.is_valid_at(info.valid_from - chrono::Duration::days(1), None));
        assert!(!info.is_valid_until(info.valid_to, None));
        assert!(info.lifespan_in_days() > 0);
        assert!(info.days_until_expiration() > 0);
    }

    #[test]
    fn test_garbage_is_rejected() {
        assert!(matches!(SslCertificate::from_der(b"not a cert"), Err(CertError::Parse(_))));
        assert!(SslCertificate::from_pem("nope").is_err());
    }

    #[test]
    fn test_wildcard_covers() {
        assert!(wildcard_covers("*.a.test", "www.a.test"));
        assert!(!wildcard_covers("*.a.test", "a.test"));
        assert!(!wildcard_covers("www.a.test", "api.a.test"));
    }
}
