// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Distribution certificate key containers and fingerprints.
//!
//! Distribution certificates are exchanged as PKCS#12 (`.p12`) containers
//! holding the X.509 certificate and its private key. Provisioning profiles
//! reference certificates by embedding their DER encoding, so the SHA-1
//! digest of that DER encoding (the *fingerprint*) is what ties a profile to
//! a certificate.

use {
    crate::CredentialsError,
    bcder::Oid,
    chrono::{DateTime, Utc},
    serde::{Deserialize, Serialize},
    std::{
        fmt::{Display, Formatter},
        str::FromStr,
    },
    x509_certificate::{
        rfc4519::OID_ORGANIZATIONAL_UNIT_NAME, CapturedX509Certificate, DigestAlgorithm,
    },
};

/// SHA-1 digest of a DER encoded certificate, as upper-case hex.
#[derive(Clone, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
#[serde(try_from = "String", into = "String")]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Compute the fingerprint of DER encoded certificate data.
    pub fn from_der(der: &[u8]) -> Self {
        let mut h = DigestAlgorithm::Sha1.digester();
        h.update(der);

        Self(hex::encode_upper(h.finish().as_ref()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for Fingerprint {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Fingerprint {
    type Err = CredentialsError;

    /// Parse a hex fingerprint, tolerating `:` separators and lower case.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.replace(':', "").to_ascii_uppercase();

        if normalized.len() != 40 || !normalized.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(CredentialsError::MalformedKeyMaterial(format!(
                "not a SHA-1 fingerprint: {}",
                s
            )));
        }

        Ok(Self(normalized))
    }
}

impl TryFrom<String> for Fingerprint {
    type Error = CredentialsError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::from_str(&value)
    }
}

impl From<Fingerprint> for String {
    fn from(fingerprint: Fingerprint) -> Self {
        fingerprint.0
    }
}

/// Properties of a distribution certificate relevant to reconciliation.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CertificateDetails {
    pub fingerprint: Fingerprint,

    /// Serial number as upper-case hex without leading zero bytes.
    ///
    /// This is the form the Apple Developer Portal reports serial numbers in.
    pub serial_number: String,

    pub not_before: DateTime<Utc>,
    pub not_after: DateTime<Utc>,

    pub common_name: Option<String>,

    /// Apple team identifier, from the subject's organizational unit.
    pub team_id: Option<String>,
}

impl CertificateDetails {
    /// Derive details from DER encoded certificate data.
    pub fn from_der(der: impl AsRef<[u8]>) -> Result<Self, CredentialsError> {
        let der = der.as_ref();

        let cert = CapturedX509Certificate::from_der(der.to_vec()).map_err(|e| {
            CredentialsError::MalformedKeyMaterial(format!("error parsing certificate: {}", e))
        })?;

        Ok(Self::from_certificate(&cert))
    }

    /// Derive details from a PKCS#12 container.
    pub fn from_pkcs12(data: &[u8], password: &str) -> Result<Self, CredentialsError> {
        let der = pkcs12_certificate_der(data, password)?;

        Self::from_der(der)
    }

    fn from_certificate(cert: &CapturedX509Certificate) -> Self {
        Self {
            fingerprint: Fingerprint::from_der(cert.constructed_data()),
            serial_number: format_serial_number(cert.serial_number_asn1().as_slice()),
            not_before: cert.validity_not_before(),
            not_after: cert.validity_not_after(),
            common_name: cert.subject_common_name(),
            team_id: cert
                .subject_name()
                .find_first_attribute_string(Oid(OID_ORGANIZATIONAL_UNIT_NAME.as_ref().into()))
                .unwrap_or(None),
        }
    }

    /// Whether `now` is inside the certificate's validity window.
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        self.not_before <= now && now < self.not_after
    }
}

/// Normalize big-endian serial number bytes to upper-case hex.
pub fn format_serial_number(data: &[u8]) -> String {
    let first_significant = data.iter().position(|b| *b != 0).unwrap_or(data.len());

    if first_significant == data.len() {
        "00".to_string()
    } else {
        hex::encode_upper(&data[first_significant..])
    }
}

/// Compare serial numbers as reported by different sources.
///
/// Sources disagree on case and on zero padding.
pub fn serial_numbers_equal(a: &str, b: &str) -> bool {
    let normalize = |s: &str| {
        let s = s.trim_start_matches('0').to_ascii_uppercase();
        if s.is_empty() {
            "0".to_string()
        } else {
            s
        }
    };

    normalize(a) == normalize(b)
}

/// Compute the fingerprint of the certificate in a PKCS#12 container.
pub fn compute_certificate_fingerprint(
    data: &[u8],
    password: &str,
) -> Result<Fingerprint, CredentialsError> {
    let der = pkcs12_certificate_der(data, password)?;

    Ok(Fingerprint::from_der(&der))
}

fn bmp_string(s: &str) -> Vec<u8> {
    let utf16: Vec<u16> = s.encode_utf16().collect();

    let mut bytes = Vec::with_capacity(utf16.len() * 2 + 2);
    for c in utf16 {
        bytes.push((c / 256) as u8);
        bytes.push((c % 256) as u8);
    }
    bytes.push(0x00);
    bytes.push(0x00);

    bytes
}

/// Extract the DER encoded X.509 certificate from PKCS#12 data.
///
/// The container MAC is verified against `password`, which may be the empty
/// string for containers exported without a password. Key bags are not
/// decrypted: only the certificate is needed to fingerprint.
pub fn pkcs12_certificate_der(data: &[u8], password: &str) -> Result<Vec<u8>, CredentialsError> {
    let pfx = p12::PFX::parse(data).map_err(|e| {
        CredentialsError::MalformedKeyMaterial(format!("data does not appear to be PFX: {:?}", e))
    })?;

    if !pfx.verify_mac(password) {
        return Err(CredentialsError::PfxBadPassword);
    }

    let data = match pfx.auth_safe {
        p12::ContentInfo::Data(data) => data,
        _ => {
            return Err(CredentialsError::MalformedKeyMaterial(
                "unexpected PFX content info".to_string(),
            ));
        }
    };

    let content_infos = yasna::parse_der(&data, |reader| {
        reader.collect_sequence_of(p12::ContentInfo::parse)
    })
    .map_err(|e| {
        CredentialsError::MalformedKeyMaterial(format!(
            "failed parsing inner ContentInfo: {:?}",
            e
        ))
    })?;

    let bmp_password = bmp_string(password);

    for content in content_infos {
        let bags_data = match content {
            p12::ContentInfo::Data(inner) => inner,
            p12::ContentInfo::EncryptedData(encrypted) => {
                encrypted.data(&bmp_password).ok_or_else(|| {
                    CredentialsError::MalformedKeyMaterial(
                        "failed decrypting inner EncryptedData".to_string(),
                    )
                })?
            }
            p12::ContentInfo::OtherContext(_) => {
                return Err(CredentialsError::MalformedKeyMaterial(
                    "unexpected OtherContent content in inner PFX data".to_string(),
                ));
            }
        };

        let bags = yasna::parse_ber(&bags_data, |reader| {
            reader.collect_sequence_of(p12::SafeBag::parse)
        })
        .map_err(|e| {
            CredentialsError::MalformedKeyMaterial(format!(
                "failed parsing SafeBag within inner Data: {:?}",
                e
            ))
        })?;

        for bag in bags {
            if let p12::SafeBagKind::CertBag(p12::CertBag::X509(cert_data)) = bag.bag {
                return Ok(cert_data);
            }
        }
    }

    Err(CredentialsError::MalformedKeyMaterial(
        "failed to find x509 certificate in PFX data".to_string(),
    ))
}
