// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Local consistency checks of certificate and profile pairs.

Nothing in this module performs I/O or consults a remote authority. A
certificate and profile pair is consistent for a bundle identifier when:

1. The profile embeds the certificate (compared by fingerprint).
2. The profile's application identifier pattern matches the bundle identifier.
3. The profile is not expired.

Checks are performed in that order and the first failure is reported.
*/

use {
    crate::{certificate::Fingerprint, provisioning_profile::ParsedProfile, CredentialsError},
    chrono::{DateTime, Utc},
    std::fmt::{Display, Formatter},
};

/// Why a certificate and profile pair is not usable.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum InvalidReason {
    /// The profile embeds no certificates.
    MissingFingerprint,
    /// None of the profile's certificates is the bound certificate.
    FingerprintMismatch,
    MissingAppIdentifier,
    /// The application identifier isn't of the form `<team>.<bundle pattern>`.
    MalformedAppIdentifier,
    BundleIdMismatch,
    Expired,
    MalformedProfile(String),
}

impl Display for InvalidReason {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingFingerprint => f.write_str("profile does not embed a certificate"),
            Self::FingerprintMismatch => {
                f.write_str("profile was not generated for the distribution certificate")
            }
            Self::MissingAppIdentifier => {
                f.write_str("profile has no application-identifier entitlement")
            }
            Self::MalformedAppIdentifier => {
                f.write_str("profile application-identifier entitlement is malformed")
            }
            Self::BundleIdMismatch => {
                f.write_str("profile application identifier does not match the bundle identifier")
            }
            Self::Expired => f.write_str("profile has expired"),
            Self::MalformedProfile(msg) => write!(f, "profile could not be parsed: {}", msg),
        }
    }
}

/// Outcome of a local validation.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Validation {
    Ok,
    Invalid(InvalidReason),
}

impl Validation {
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok)
    }

    pub fn reason(&self) -> Option<&InvalidReason> {
        match self {
            Self::Ok => None,
            Self::Invalid(reason) => Some(reason),
        }
    }
}

/// Validate raw profile content against a certificate fingerprint.
///
/// Profiles that can't be parsed are reported as
/// [InvalidReason::MalformedProfile] rather than as an error.
pub fn validate_locally(
    profile_content: &[u8],
    certificate: &Fingerprint,
    bundle_identifier: &str,
    now: DateTime<Utc>,
) -> Validation {
    match ParsedProfile::parse(profile_content) {
        Ok(profile) => validate_parsed(&profile, certificate, bundle_identifier, now),
        Err(CredentialsError::MalformedProfile(msg)) => {
            Validation::Invalid(InvalidReason::MalformedProfile(msg))
        }
        Err(e) => Validation::Invalid(InvalidReason::MalformedProfile(e.to_string())),
    }
}

/// Validate an already parsed profile against a certificate fingerprint.
pub fn validate_parsed(
    profile: &ParsedProfile,
    certificate: &Fingerprint,
    bundle_identifier: &str,
    now: DateTime<Utc>,
) -> Validation {
    if profile.certificate_fingerprints.is_empty() {
        return Validation::Invalid(InvalidReason::MissingFingerprint);
    }

    if !profile.certificate_fingerprints.contains(certificate) {
        return Validation::Invalid(InvalidReason::FingerprintMismatch);
    }

    if profile.application_identifier.is_none() {
        return Validation::Invalid(InvalidReason::MissingAppIdentifier);
    }

    let pattern = match profile.bundle_identifier_pattern() {
        Some(pattern) => pattern,
        None => return Validation::Invalid(InvalidReason::MalformedAppIdentifier),
    };

    match bundle_identifier_matches(pattern, bundle_identifier) {
        Ok(true) => {}
        Ok(false) => return Validation::Invalid(InvalidReason::BundleIdMismatch),
        Err(_) => return Validation::Invalid(InvalidReason::MalformedAppIdentifier),
    }

    if profile.is_expired_at(now) {
        return Validation::Invalid(InvalidReason::Expired);
    }

    Validation::Ok
}

/// Whether a profile's bundle identifier `pattern` authorizes `bundle_identifier`.
///
/// Only the profile side may carry wildcards. A concrete pattern never matches
/// a wildcarded bundle identifier.
pub fn bundle_identifier_matches(
    pattern: &str,
    bundle_identifier: &str,
) -> Result<bool, glob::PatternError> {
    Ok(glob::Pattern::new(pattern)?.matches(bundle_identifier))
}
