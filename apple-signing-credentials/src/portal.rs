// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Apple Developer Portal interfaces.

The Developer Portal is the source of truth for certificate and profile
validity: it can revoke or expire either at any time. This module defines the
operations reconciliation requires from it. The wire protocol is the
implementation's concern.
*/

use {
    crate::{
        app::{AppleTeam, Device, ProfileType},
        certificate::serial_numbers_equal,
        store::CertificateRecord,
        CredentialsError,
    },
    chrono::{DateTime, Utc},
    log::debug,
    serde::{Deserialize, Serialize},
    std::{
        collections::BTreeSet,
        fmt::{Display, Formatter},
        str::FromStr,
    },
};

/// How the operator authenticates to the Developer Portal.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum AuthMode {
    /// App Store Connect API key. Usable without an operator present.
    ApiKey,
    /// Apple ID cookie session. Requires an operator to sign in.
    UserSession,
}

impl Display for AuthMode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ApiKey => f.write_str("api-key"),
            Self::UserSession => f.write_str("user-session"),
        }
    }
}

impl FromStr for AuthMode {
    type Err = CredentialsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "api-key" | "apikey" => Ok(Self::ApiKey),
            "user-session" | "user" | "cookies" => Ok(Self::UserSession),
            _ => Err(CredentialsError::CliGeneralError(format!(
                "unknown authentication mode: {}",
                s
            ))),
        }
    }
}

/// An authenticated Developer Portal session.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PortalSession {
    pub mode: AuthMode,
    pub team: AppleTeam,
}

/// Establishes Developer Portal sessions.
pub trait Authenticator {
    /// Authenticate, possibly prompting for credentials.
    fn authenticate(&self) -> Result<PortalSession, CredentialsError>;
}

/// A certificate as listed by the Developer Portal.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CertificateInfo {
    pub id: String,
    pub serial_number: String,
    pub name: String,
    pub expires_at: DateTime<Utc>,
}

/// Developer Portal view of a profile's state.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ProfileState {
    Active,
    Invalid,
}

/// A provisioning profile as listed by the Developer Portal.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ProfileInfo {
    pub id: String,
    pub name: String,
    pub profile_type: ProfileType,
    pub state: ProfileState,

    /// The `.mobileprovision` content.
    pub content: Vec<u8>,

    pub expires_at: DateTime<Utc>,

    /// Serial numbers of certificates the profile was generated for.
    pub certificate_serial_numbers: Vec<String>,

    /// UDIDs of devices in the profile.
    pub device_ids: BTreeSet<String>,
}

impl ProfileInfo {
    pub fn is_usable_at(&self, now: DateTime<Utc>) -> bool {
        self.state == ProfileState::Active && self.expires_at > now
    }

    pub fn has_certificate(&self, serial_number: &str) -> bool {
        self.certificate_serial_numbers
            .iter()
            .any(|s| serial_numbers_equal(s, serial_number))
    }
}

/// What [DeveloperPortal::create_or_reuse_adhoc_profile] did.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum AdhocProfileAction {
    /// An existing profile already covered exactly the requested devices.
    Reused,
    Created,
    /// An existing profile's device list was updated and it was regenerated.
    Regenerated,
}

#[derive(Clone, Debug)]
pub struct AdhocProfileOutcome {
    pub profile: ProfileInfo,
    pub action: AdhocProfileAction,
}

/// Operations consumed from the Apple Developer Portal.
pub trait DeveloperPortal {
    /// Distribution certificates of the session's team that are still valid.
    fn list_valid_certificates(
        &self,
        session: &PortalSession,
    ) -> Result<Vec<CertificateInfo>, CredentialsError>;

    /// Create a distribution certificate.
    ///
    /// Fails with [CredentialsError::TooManyCertificates] when the team is at
    /// its certificate limit.
    fn create_certificate(
        &self,
        session: &PortalSession,
    ) -> Result<CertificateRecord, CredentialsError>;

    fn revoke_certificates(
        &self,
        session: &PortalSession,
        ids: &[String],
    ) -> Result<(), CredentialsError>;

    /// Profiles of a given type for a bundle identifier.
    fn list_profiles(
        &self,
        session: &PortalSession,
        bundle_identifier: &str,
        profile_type: ProfileType,
    ) -> Result<Vec<ProfileInfo>, CredentialsError>;

    fn create_profile(
        &self,
        session: &PortalSession,
        bundle_identifier: &str,
        profile_type: ProfileType,
        certificate_serial_number: &str,
        name: &str,
    ) -> Result<ProfileInfo, CredentialsError>;

    /// Point an existing profile at a certificate and regenerate it.
    fn regenerate_profile_with_certificate(
        &self,
        session: &PortalSession,
        profile_id: &str,
        certificate_serial_number: &str,
    ) -> Result<ProfileInfo, CredentialsError>;

    fn list_registered_devices(
        &self,
        session: &PortalSession,
        team: &AppleTeam,
    ) -> Result<Vec<Device>, CredentialsError>;

    fn create_adhoc_profile(
        &self,
        session: &PortalSession,
        bundle_identifier: &str,
        device_ids: &BTreeSet<String>,
        certificate_serial_number: &str,
        name: &str,
    ) -> Result<ProfileInfo, CredentialsError>;

    /// Replace an ad hoc profile's devices and certificate and regenerate it.
    fn update_adhoc_profile_devices(
        &self,
        session: &PortalSession,
        profile_id: &str,
        device_ids: &BTreeSet<String>,
        certificate_serial_number: &str,
    ) -> Result<ProfileInfo, CredentialsError>;

    /// Locate or create an ad hoc profile covering exactly `device_ids`.
    ///
    /// A usable profile for the certificate with exactly the requested devices
    /// is reused. Otherwise `preferred_profile_id`, or a profile whose name
    /// starts with `name_prefix`, is updated and regenerated. Profiles named
    /// by anyone else are never modified; a new profile is created instead.
    #[allow(clippy::too_many_arguments)]
    fn create_or_reuse_adhoc_profile(
        &self,
        session: &PortalSession,
        bundle_identifier: &str,
        device_ids: &BTreeSet<String>,
        certificate_serial_number: &str,
        name: &str,
        name_prefix: &str,
        preferred_profile_id: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<AdhocProfileOutcome, CredentialsError> {
        let profiles = self.list_profiles(session, bundle_identifier, ProfileType::AdHoc)?;

        if let Some(profile) = profiles.iter().find(|p| {
            p.is_usable_at(now)
                && p.has_certificate(certificate_serial_number)
                && &p.device_ids == device_ids
        }) {
            debug!("reusing ad hoc profile {} ({})", profile.id, profile.name);
            return Ok(AdhocProfileOutcome {
                profile: profile.clone(),
                action: AdhocProfileAction::Reused,
            });
        }

        let existing = preferred_profile_id
            .and_then(|id| profiles.iter().find(|p| p.id == id))
            .or_else(|| profiles.iter().find(|p| p.name.starts_with(name_prefix)));

        if let Some(existing) = existing {
            debug!(
                "updating devices of ad hoc profile {} ({})",
                existing.id, existing.name
            );
            let profile = self.update_adhoc_profile_devices(
                session,
                &existing.id,
                device_ids,
                certificate_serial_number,
            )?;

            Ok(AdhocProfileOutcome {
                profile,
                action: AdhocProfileAction::Regenerated,
            })
        } else {
            let profile = self.create_adhoc_profile(
                session,
                bundle_identifier,
                device_ids,
                certificate_serial_number,
                name,
            )?;

            Ok(AdhocProfileOutcome {
                profile,
                action: AdhocProfileAction::Created,
            })
        }
    }
}

/// Registers devices with a team.
pub trait DeviceRegistrar {
    /// Walk the operator through registering devices.
    ///
    /// Returns once registration is complete or abandoned. Callers re-query
    /// the portal for the resulting device list.
    fn register_devices(
        &self,
        session: &PortalSession,
        team: &AppleTeam,
    ) -> Result<(), CredentialsError>;
}
