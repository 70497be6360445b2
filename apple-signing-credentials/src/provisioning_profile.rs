// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Provisioning profile parsing.

Provisioning profiles (`.mobileprovision` files) are CMS `SignedData`
structures whose encapsulated content is a property list describing which
certificates, application identifier, and devices the profile authorizes.
*/

use {
    crate::{certificate::Fingerprint, CredentialsError},
    chrono::{DateTime, Utc},
    cryptographic_message_syntax::SignedData,
    plist::{Dictionary, Value},
    std::{borrow::Cow, io::Cursor, time::SystemTime},
};

/// The parts of a provisioning profile that matter for reconciliation.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ParsedProfile {
    /// Fingerprints of each certificate in `DeveloperCertificates`, in order.
    pub certificate_fingerprints: Vec<Fingerprint>,

    /// Raw `application-identifier` entitlement, e.g. `ABCDE12345.com.acme.*`.
    pub application_identifier: Option<String>,

    pub expires_at: DateTime<Utc>,

    pub uuid: Option<String>,
    pub name: Option<String>,
    pub team_identifiers: Vec<String>,

    /// Device UDIDs from `ProvisionedDevices`.
    pub provisioned_devices: Vec<String>,

    /// Set on enterprise profiles, which are not scoped to devices.
    pub provisions_all_devices: bool,
}

impl ParsedProfile {
    /// Parse a provisioning profile blob.
    ///
    /// Both CMS enveloped profiles and bare plists are accepted.
    pub fn parse(blob: &[u8]) -> Result<Self, CredentialsError> {
        let plist_data = profile_plist_data(blob)?;

        let value = Value::from_reader(Cursor::new(plist_data.as_ref())).map_err(|e| {
            CredentialsError::MalformedProfile(format!("error parsing plist: {}", e))
        })?;

        let dict = value.as_dictionary().ok_or_else(|| {
            CredentialsError::MalformedProfile("profile plist is not a dictionary".into())
        })?;

        let certificate_fingerprints = match dict.get("DeveloperCertificates") {
            Some(Value::Array(certs)) => certs
                .iter()
                .map(|v| {
                    v.as_data().map(Fingerprint::from_der).ok_or_else(|| {
                        CredentialsError::MalformedProfile(
                            "DeveloperCertificates entry is not data".into(),
                        )
                    })
                })
                .collect::<Result<Vec<_>, _>>()?,
            Some(_) => {
                return Err(CredentialsError::MalformedProfile(
                    "DeveloperCertificates is not an array".into(),
                ))
            }
            None => vec![],
        };

        let application_identifier = match dict.get("Entitlements") {
            Some(Value::Dictionary(entitlements)) => entitlements
                .get("application-identifier")
                .and_then(|v| v.as_string())
                .map(|s| s.to_string()),
            Some(_) => {
                return Err(CredentialsError::MalformedProfile(
                    "Entitlements is not a dictionary".into(),
                ))
            }
            None => None,
        };

        let expires_at = dict
            .get("ExpirationDate")
            .and_then(|v| v.as_date())
            .map(|date| DateTime::<Utc>::from(SystemTime::from(date)))
            .ok_or_else(|| {
                CredentialsError::MalformedProfile("ExpirationDate missing or not a date".into())
            })?;

        Ok(Self {
            certificate_fingerprints,
            application_identifier,
            expires_at,
            uuid: string_value(dict, "UUID"),
            name: string_value(dict, "Name"),
            team_identifiers: string_array(dict, "TeamIdentifier"),
            provisioned_devices: string_array(dict, "ProvisionedDevices"),
            provisions_all_devices: matches!(
                dict.get("ProvisionsAllDevices"),
                Some(Value::Boolean(true))
            ),
        })
    }

    /// The bundle identifier pattern the profile authorizes.
    ///
    /// This is the `application-identifier` entitlement with its team prefix
    /// removed. It may contain wildcards. Returns `None` if the entitlement is
    /// missing or doesn't have the `<team>.<bundle>` form.
    pub fn bundle_identifier_pattern(&self) -> Option<&str> {
        let identifier = self.application_identifier.as_deref()?;

        match identifier.split_once('.') {
            Some((team, pattern)) if !team.is_empty() && !pattern.is_empty() => Some(pattern),
            _ => None,
        }
    }

    /// Whether the profile has expired as of `now`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// Parse a profile blob, as [ParsedProfile::parse].
pub fn parse_profile(blob: &[u8]) -> Result<ParsedProfile, CredentialsError> {
    ParsedProfile::parse(blob)
}

fn profile_plist_data(blob: &[u8]) -> Result<Cow<'_, [u8]>, CredentialsError> {
    let trimmed = blob
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .map(|start| &blob[start..])
        .unwrap_or_default();

    if trimmed.starts_with(b"<?xml")
        || trimmed.starts_with(b"<plist")
        || trimmed.starts_with(b"bplist")
    {
        return Ok(Cow::Borrowed(trimmed));
    }

    let signed_data = SignedData::parse_ber(blob).map_err(|e| {
        CredentialsError::MalformedProfile(format!("not a CMS SignedData structure: {}", e))
    })?;

    let content = signed_data.signed_content().ok_or_else(|| {
        CredentialsError::MalformedProfile("CMS SignedData has no encapsulated content".into())
    })?;

    Ok(Cow::Owned(content.to_vec()))
}

fn string_value(dict: &Dictionary, key: &str) -> Option<String> {
    dict.get(key)
        .and_then(|v| v.as_string())
        .map(|s| s.to_string())
}

fn string_array(dict: &Dictionary, key: &str) -> Vec<String> {
    dict.get(key)
        .and_then(|v| v.as_array())
        .map(|values| {
            values
                .iter()
                .filter_map(|v| v.as_string())
                .map(|s| s.to_string())
                .collect::<Vec<_>>()
        })
        .unwrap_or_default()
}
