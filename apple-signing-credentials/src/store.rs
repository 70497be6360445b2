// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Backend credential store.

The backend store is the project's persisted mirror of signing certificates,
provisioning profiles, and the *build credentials* binding that ties an
`(app, distribution kind)` pair to a certificate and profile. At most one
binding exists per pair.

The store is consumed through the [CredentialStore] trait. Transport and
authentication to the store are the implementation's concern.
*/

use {
    crate::{
        app::{AppIdentity, AppleTeam, DistributionKind},
        certificate::{CertificateDetails, Fingerprint},
        provisioning_profile::ParsedProfile,
        CredentialsError,
    },
    chrono::{DateTime, Utc},
    once_cell::sync::OnceCell,
    std::collections::BTreeSet,
};

/// A distribution certificate and its private key, as held by the store.
#[derive(Clone)]
pub struct SigningCertificate {
    /// Store identifier.
    pub id: String,

    /// Identifier assigned by the Apple Developer Portal, if known.
    pub developer_portal_id: Option<String>,

    /// PKCS#12 container holding the certificate and private key.
    pub p12: Vec<u8>,

    /// Password protecting [Self::p12].
    pub password: String,

    pub team: Option<AppleTeam>,

    serial_number: Option<String>,
    validity: Option<(DateTime<Utc>, DateTime<Utc>)>,
    details: OnceCell<CertificateDetails>,
}

impl std::fmt::Debug for SigningCertificate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningCertificate")
            .field("id", &self.id)
            .field("developer_portal_id", &self.developer_portal_id)
            .field("p12", &format_args!("<{} bytes>", self.p12.len()))
            .field("password", &"<redacted>")
            .field("team", &self.team)
            .field("serial_number", &self.serial_number)
            .field("validity", &self.validity)
            .finish()
    }
}

impl SigningCertificate {
    pub fn new(id: impl ToString, p12: Vec<u8>, password: impl ToString) -> Self {
        Self {
            id: id.to_string(),
            developer_portal_id: None,
            p12,
            password: password.to_string(),
            team: None,
            serial_number: None,
            validity: None,
            details: OnceCell::new(),
        }
    }

    pub fn with_developer_portal_id(mut self, id: impl ToString) -> Self {
        self.developer_portal_id = Some(id.to_string());
        self
    }

    pub fn with_team(mut self, team: AppleTeam) -> Self {
        self.team = Some(team);
        self
    }

    /// Record an already known serial number, avoiding a parse of the key container.
    pub fn with_serial_number(mut self, serial: impl ToString) -> Self {
        self.serial_number = Some(serial.to_string());
        self
    }

    /// Record an already known validity window.
    pub fn with_validity(mut self, not_before: DateTime<Utc>, not_after: DateTime<Utc>) -> Self {
        self.validity = Some((not_before, not_after));
        self
    }

    /// Details parsed from the key container.
    ///
    /// The container is parsed at most once per instance.
    pub fn details(&self) -> Result<&CertificateDetails, CredentialsError> {
        self.details
            .get_or_try_init(|| CertificateDetails::from_pkcs12(&self.p12, &self.password))
    }

    pub fn fingerprint(&self) -> Result<Fingerprint, CredentialsError> {
        Ok(self.details()?.fingerprint.clone())
    }

    pub fn serial_number(&self) -> Result<String, CredentialsError> {
        if let Some(serial) = &self.serial_number {
            Ok(serial.clone())
        } else {
            Ok(self.details()?.serial_number.clone())
        }
    }

    pub fn validity(&self) -> Result<(DateTime<Utc>, DateTime<Utc>), CredentialsError> {
        if let Some(validity) = self.validity {
            Ok(validity)
        } else {
            let details = self.details()?;
            Ok((details.not_before, details.not_after))
        }
    }

    pub fn expires_at(&self) -> Result<DateTime<Utc>, CredentialsError> {
        Ok(self.validity()?.1)
    }

    /// Whether `now` falls inside the certificate's validity window.
    pub fn is_within_validity_window(&self, now: DateTime<Utc>) -> Result<bool, CredentialsError> {
        let (not_before, not_after) = self.validity()?;

        Ok(not_before <= now && now < not_after)
    }
}

/// A provisioning profile as held by the store.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ProvisioningProfile {
    /// Store identifier.
    pub id: String,

    /// Identifier assigned by the Apple Developer Portal.
    ///
    /// Profiles uploaded by the operator have none and can't be verified
    /// remotely.
    pub developer_portal_id: Option<String>,

    /// The raw `.mobileprovision` content.
    pub content: Vec<u8>,

    pub team: Option<AppleTeam>,

    /// UDIDs of devices the profile is scoped to. Only meaningful for ad hoc.
    pub devices: BTreeSet<String>,
}

impl ProvisioningProfile {
    pub fn parse(&self) -> Result<ParsedProfile, CredentialsError> {
        ParsedProfile::parse(&self.content)
    }
}

/// A profile to be written to the store.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ProfileRecord {
    pub developer_portal_id: Option<String>,
    pub content: Vec<u8>,
    pub devices: BTreeSet<String>,
}

/// A certificate to be written to the store.
#[derive(Clone)]
pub struct CertificateRecord {
    pub developer_portal_id: Option<String>,
    pub p12: Vec<u8>,
    pub password: String,
    pub serial_number: String,
    pub not_before: DateTime<Utc>,
    pub not_after: DateTime<Utc>,
    pub team: AppleTeam,
}

impl std::fmt::Debug for CertificateRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CertificateRecord")
            .field("developer_portal_id", &self.developer_portal_id)
            .field("serial_number", &self.serial_number)
            .field("not_after", &self.not_after)
            .field("team", &self.team)
            .finish_non_exhaustive()
    }
}

/// The binding of an `(app, distribution kind)` pair to signing credentials.
#[derive(Clone, Debug)]
pub struct BuildCredentials {
    pub id: String,
    pub app: AppIdentity,
    pub kind: DistributionKind,
    pub certificate: Option<SigningCertificate>,
    pub profile: Option<ProvisioningProfile>,
    pub team: Option<AppleTeam>,
}

/// Interface to the backend credential store.
///
/// Methods take `&self`; implementations needing mutation use interior
/// mutability. Failures are reported as [CredentialsError::Store].
pub trait CredentialStore {
    /// Obtain the binding for `(app, kind)`, if any.
    fn get_bound_credentials(
        &self,
        app: &AppIdentity,
        kind: DistributionKind,
    ) -> Result<Option<BuildCredentials>, CredentialsError>;

    /// Create the binding for `(app, kind)` or replace the existing one.
    fn create_or_update_build_credentials(
        &self,
        app: &AppIdentity,
        kind: DistributionKind,
        certificate: &SigningCertificate,
        profile: &ProvisioningProfile,
        team: &AppleTeam,
    ) -> Result<BuildCredentials, CredentialsError>;

    /// Delete profile records by store id.
    fn delete_profiles(&self, ids: &[String]) -> Result<(), CredentialsError>;

    fn create_or_get_team(
        &self,
        app: &AppIdentity,
        team_identifier: &str,
        team_name: Option<&str>,
    ) -> Result<AppleTeam, CredentialsError>;

    /// Obtain the store's identifier for the app's bundle identifier.
    fn create_or_get_app_identifier(
        &self,
        app: &AppIdentity,
        team: &AppleTeam,
    ) -> Result<String, CredentialsError>;

    /// All certificates owned by `account`.
    fn list_certificates(&self, account: &str) -> Result<Vec<SigningCertificate>, CredentialsError>;

    fn create_certificate(
        &self,
        account: &str,
        record: CertificateRecord,
    ) -> Result<SigningCertificate, CredentialsError>;

    fn create_profile(
        &self,
        app_identifier_id: &str,
        team: &AppleTeam,
        record: ProfileRecord,
    ) -> Result<ProvisioningProfile, CredentialsError>;

    /// Replace the content of an existing profile record.
    fn update_profile(
        &self,
        id: &str,
        record: ProfileRecord,
    ) -> Result<ProvisioningProfile, CredentialsError>;
}
