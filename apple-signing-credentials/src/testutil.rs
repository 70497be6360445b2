// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! In-memory collaborators and fixtures for tests.

use {
    crate::{
        app::{AppIdentity, AppleTeam, Device, DistributionKind, ProfileType},
        certificate::serial_numbers_equal,
        operator::{NotifyLevel, Operator},
        portal::{
            AuthMode, Authenticator, CertificateInfo, DeveloperPortal, DeviceRegistrar,
            PortalSession, ProfileInfo, ProfileState,
        },
        store::{
            BuildCredentials, CertificateRecord, CredentialStore, ProfileRecord,
            ProvisioningProfile, SigningCertificate,
        },
        CredentialsError,
    },
    chrono::{DateTime, Duration, TimeZone, Utc},
    plist::{Dictionary, Value},
    std::{
        cell::{Cell, RefCell},
        collections::{BTreeMap, BTreeSet, HashMap, VecDeque},
        time::SystemTime,
    },
};

pub const DISTRIBUTION_P12: &[u8] = include_bytes!("testdata/distribution.p12");
pub const DISTRIBUTION_DER: &[u8] = include_bytes!("testdata/distribution.der");
pub const OTHER_DER: &[u8] = include_bytes!("testdata/other.der");
pub const SIGNED_PROFILE: &[u8] = include_bytes!("testdata/profile.mobileprovision");

pub const P12_PASSWORD: &str = "password123";
pub const DISTRIBUTION_SERIAL: &str = "5A3C9E01B2D4F607";
pub const TEAM_ID: &str = "ABCDE12345";

/// The instant tests evaluate validity at.
pub fn test_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2027, 3, 1, 0, 0, 0).unwrap()
}

pub fn test_team() -> AppleTeam {
    AppleTeam::new(TEAM_ID).with_name("Acme Inc")
}

pub fn test_app() -> AppIdentity {
    AppIdentity::new("acme", "rocket", "com.acme.app")
}

pub fn device_set(ids: &[&str]) -> BTreeSet<String> {
    ids.iter().map(|s| s.to_string()).collect()
}

/// A certificate record for the fixture PKCS#12 container.
pub fn distribution_certificate_record(portal_id: Option<&str>) -> CertificateRecord {
    CertificateRecord {
        developer_portal_id: portal_id.map(|s| s.to_string()),
        p12: DISTRIBUTION_P12.to_vec(),
        password: P12_PASSWORD.to_string(),
        serial_number: DISTRIBUTION_SERIAL.to_string(),
        not_before: Utc.with_ymd_and_hms(2026, 10, 19, 19, 22, 10).unwrap(),
        not_after: Utc.with_ymd_and_hms(2036, 10, 16, 19, 22, 10).unwrap(),
        team: test_team(),
    }
}

/// Builds provisioning profile plists.
#[derive(Clone, Debug)]
pub struct ProfileBuilder {
    application_identifier: Option<String>,
    certificates: Vec<Vec<u8>>,
    expires_at: DateTime<Utc>,
    devices: Vec<String>,
    provisions_all_devices: bool,
    uuid: String,
    name: String,
}

impl ProfileBuilder {
    /// A profile for `bundle_pattern` embedding the fixture certificate.
    pub fn new(bundle_pattern: &str) -> Self {
        Self {
            application_identifier: Some(format!("{}.{}", TEAM_ID, bundle_pattern)),
            certificates: vec![DISTRIBUTION_DER.to_vec()],
            expires_at: Utc.with_ymd_and_hms(2099, 1, 1, 0, 0, 0).unwrap(),
            devices: vec![],
            provisions_all_devices: false,
            uuid: "00000000-0000-0000-0000-000000000000".to_string(),
            name: format!("profile for {}", bundle_pattern),
        }
    }

    pub fn certificates(mut self, certificates: Vec<Vec<u8>>) -> Self {
        self.certificates = certificates;
        self
    }

    pub fn without_application_identifier(mut self) -> Self {
        self.application_identifier = None;
        self
    }

    pub fn raw_application_identifier(mut self, value: &str) -> Self {
        self.application_identifier = Some(value.to_string());
        self
    }

    pub fn expires_at(mut self, value: DateTime<Utc>) -> Self {
        self.expires_at = value;
        self
    }

    pub fn devices<'a>(mut self, devices: impl IntoIterator<Item = &'a String>) -> Self {
        self.devices = devices.into_iter().cloned().collect();
        self
    }

    pub fn provisions_all_devices(mut self) -> Self {
        self.provisions_all_devices = true;
        self
    }

    pub fn uuid(mut self, value: &str) -> Self {
        self.uuid = value.to_string();
        self
    }

    pub fn name(mut self, value: &str) -> Self {
        self.name = value.to_string();
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let mut dict = Dictionary::new();

        dict.insert(
            "DeveloperCertificates".into(),
            Value::Array(
                self.certificates
                    .iter()
                    .map(|der| Value::Data(der.clone()))
                    .collect(),
            ),
        );

        let mut entitlements = Dictionary::new();
        if let Some(identifier) = &self.application_identifier {
            entitlements.insert(
                "application-identifier".into(),
                Value::String(identifier.clone()),
            );
        }
        dict.insert("Entitlements".into(), Value::Dictionary(entitlements));

        dict.insert(
            "ExpirationDate".into(),
            Value::Date(SystemTime::from(self.expires_at).into()),
        );
        dict.insert("Name".into(), Value::String(self.name.clone()));
        dict.insert("UUID".into(), Value::String(self.uuid.clone()));
        dict.insert(
            "TeamIdentifier".into(),
            Value::Array(vec![Value::String(TEAM_ID.into())]),
        );

        if !self.devices.is_empty() {
            dict.insert(
                "ProvisionedDevices".into(),
                Value::Array(
                    self.devices
                        .iter()
                        .map(|d| Value::String(d.clone()))
                        .collect(),
                ),
            );
        }

        if self.provisions_all_devices {
            dict.insert("ProvisionsAllDevices".into(), Value::Boolean(true));
        }

        let mut data = vec![];
        Value::Dictionary(dict)
            .to_writer_xml(&mut data)
            .expect("plist serialization should succeed");

        data
    }
}

#[derive(Clone, Debug)]
struct Binding {
    id: String,
    certificate_id: String,
    profile_id: String,
    team: AppleTeam,
}

#[derive(Default)]
struct StoreState {
    next_id: usize,
    certificates: Vec<(String, SigningCertificate)>,
    profiles: BTreeMap<String, ProvisioningProfile>,
    bindings: HashMap<(AppIdentity, DistributionKind), Binding>,
    teams: BTreeMap<String, AppleTeam>,
    writes: Vec<String>,
    fail_binding: bool,
    fail_deletion: bool,
}

impl StoreState {
    fn id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{}-{}", prefix, self.next_id)
    }
}

/// A [CredentialStore] backed by memory.
#[derive(Default)]
pub struct MemoryStore {
    state: RefCell<StoreState>,
}

impl MemoryStore {
    /// Add a certificate without recording a write.
    pub fn add_certificate(&self, account: &str, record: CertificateRecord) -> SigningCertificate {
        let mut state = self.state.borrow_mut();
        let id = state.id("certificate");

        let mut certificate = SigningCertificate::new(id, record.p12, record.password)
            .with_team(record.team)
            .with_serial_number(record.serial_number)
            .with_validity(record.not_before, record.not_after);
        if let Some(portal_id) = record.developer_portal_id {
            certificate = certificate.with_developer_portal_id(portal_id);
        }

        state
            .certificates
            .push((account.to_string(), certificate.clone()));

        certificate
    }

    pub fn add_profile(&self, record: ProfileRecord) -> ProvisioningProfile {
        let mut state = self.state.borrow_mut();
        let id = state.id("profile");

        let profile = ProvisioningProfile {
            id: id.clone(),
            developer_portal_id: record.developer_portal_id,
            content: record.content,
            team: Some(test_team()),
            devices: record.devices,
        };
        state.profiles.insert(id, profile.clone());

        profile
    }

    /// Bind credentials without recording a write.
    pub fn bind(
        &self,
        app: &AppIdentity,
        kind: DistributionKind,
        certificate: &SigningCertificate,
        profile: Option<&ProvisioningProfile>,
    ) {
        let mut state = self.state.borrow_mut();
        let id = state.id("build-credentials");

        state.bindings.insert(
            (app.clone(), kind),
            Binding {
                id,
                certificate_id: certificate.id.clone(),
                profile_id: profile.map(|p| p.id.clone()).unwrap_or_default(),
                team: test_team(),
            },
        );
    }

    pub fn bound(&self, app: &AppIdentity, kind: DistributionKind) -> Option<BuildCredentials> {
        self.get_bound_credentials(app, kind)
            .expect("lookup should succeed")
    }

    pub fn profile(&self, id: &str) -> Option<ProvisioningProfile> {
        self.state.borrow().profiles.get(id).cloned()
    }

    pub fn profile_count(&self) -> usize {
        self.state.borrow().profiles.len()
    }

    pub fn certificate_count(&self) -> usize {
        self.state.borrow().certificates.len()
    }

    /// Names of mutating operations performed.
    pub fn writes(&self) -> Vec<String> {
        self.state.borrow().writes.clone()
    }

    pub fn fail_binding(&self) {
        self.state.borrow_mut().fail_binding = true;
    }

    pub fn fail_deletion(&self) {
        self.state.borrow_mut().fail_deletion = true;
    }
}

impl CredentialStore for MemoryStore {
    fn get_bound_credentials(
        &self,
        app: &AppIdentity,
        kind: DistributionKind,
    ) -> Result<Option<BuildCredentials>, CredentialsError> {
        let state = self.state.borrow();

        Ok(state.bindings.get(&(app.clone(), kind)).map(|binding| {
            BuildCredentials {
                id: binding.id.clone(),
                app: app.clone(),
                kind,
                certificate: state
                    .certificates
                    .iter()
                    .find(|(_, c)| c.id == binding.certificate_id)
                    .map(|(_, c)| c.clone()),
                profile: state.profiles.get(&binding.profile_id).cloned(),
                team: Some(binding.team.clone()),
            }
        }))
    }

    fn create_or_update_build_credentials(
        &self,
        app: &AppIdentity,
        kind: DistributionKind,
        certificate: &SigningCertificate,
        profile: &ProvisioningProfile,
        team: &AppleTeam,
    ) -> Result<BuildCredentials, CredentialsError> {
        {
            let mut state = self.state.borrow_mut();

            if state.fail_binding {
                return Err(CredentialsError::Store("binding rejected".into()));
            }

            if !state.profiles.contains_key(&profile.id) {
                return Err(CredentialsError::Store(format!(
                    "unknown profile {}",
                    profile.id
                )));
            }

            let id = match state.bindings.get(&(app.clone(), kind)) {
                Some(existing) => existing.id.clone(),
                None => state.id("build-credentials"),
            };

            state.bindings.insert(
                (app.clone(), kind),
                Binding {
                    id,
                    certificate_id: certificate.id.clone(),
                    profile_id: profile.id.clone(),
                    team: team.clone(),
                },
            );
            state.writes.push("create_or_update_build_credentials".into());
        }

        Ok(self
            .get_bound_credentials(app, kind)?
            .expect("binding was just written"))
    }

    fn delete_profiles(&self, ids: &[String]) -> Result<(), CredentialsError> {
        let mut state = self.state.borrow_mut();

        if state.fail_deletion {
            return Err(CredentialsError::Store("profile deletion failed".into()));
        }

        for id in ids {
            state.profiles.remove(id);
        }
        state.writes.push(format!("delete_profiles:{}", ids.join(",")));

        Ok(())
    }

    fn create_or_get_team(
        &self,
        _app: &AppIdentity,
        team_identifier: &str,
        team_name: Option<&str>,
    ) -> Result<AppleTeam, CredentialsError> {
        let mut state = self.state.borrow_mut();

        Ok(state
            .teams
            .entry(team_identifier.to_string())
            .or_insert_with(|| {
                let team = AppleTeam::new(team_identifier);
                match team_name {
                    Some(name) => team.with_name(name),
                    None => team,
                }
            })
            .clone())
    }

    fn create_or_get_app_identifier(
        &self,
        app: &AppIdentity,
        team: &AppleTeam,
    ) -> Result<String, CredentialsError> {
        Ok(format!("{}:{}", team.identifier, app.bundle_identifier))
    }

    fn list_certificates(&self, account: &str) -> Result<Vec<SigningCertificate>, CredentialsError> {
        Ok(self
            .state
            .borrow()
            .certificates
            .iter()
            .filter(|(a, _)| a == account)
            .map(|(_, c)| c.clone())
            .collect())
    }

    fn create_certificate(
        &self,
        account: &str,
        record: CertificateRecord,
    ) -> Result<SigningCertificate, CredentialsError> {
        let certificate = self.add_certificate(account, record);
        self.state
            .borrow_mut()
            .writes
            .push("create_certificate".into());

        Ok(certificate)
    }

    fn create_profile(
        &self,
        _app_identifier_id: &str,
        team: &AppleTeam,
        record: ProfileRecord,
    ) -> Result<ProvisioningProfile, CredentialsError> {
        let mut state = self.state.borrow_mut();
        let id = state.id("profile");

        let profile = ProvisioningProfile {
            id: id.clone(),
            developer_portal_id: record.developer_portal_id,
            content: record.content,
            team: Some(team.clone()),
            devices: record.devices,
        };
        state.profiles.insert(id, profile.clone());
        state.writes.push("create_profile".into());

        Ok(profile)
    }

    fn update_profile(
        &self,
        id: &str,
        record: ProfileRecord,
    ) -> Result<ProvisioningProfile, CredentialsError> {
        let mut state = self.state.borrow_mut();

        let profile = state
            .profiles
            .get_mut(id)
            .ok_or_else(|| CredentialsError::Store(format!("unknown profile {}", id)))?;
        profile.developer_portal_id = record.developer_portal_id;
        profile.content = record.content;
        profile.devices = record.devices;
        let profile = profile.clone();

        state.writes.push("update_profile".into());

        Ok(profile)
    }
}

struct PortalProfile {
    bundle_identifier: String,
    info: ProfileInfo,
}

#[derive(Default)]
struct PortalState {
    next_id: usize,
    certificates: Vec<CertificateInfo>,
    certificate_limit: Option<usize>,
    profiles: Vec<PortalProfile>,
    devices: Vec<Device>,
    processing: BTreeSet<String>,
    fail_regeneration: bool,
    calls: Vec<String>,
}

impl PortalState {
    fn id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{}-{}", prefix, self.next_id)
    }
}

/// A [DeveloperPortal] backed by memory.
///
/// Generated profile content embeds the fixture certificate when generated
/// for the fixture serial number and another certificate otherwise.
pub struct FakePortal {
    state: RefCell<PortalState>,
    team: AppleTeam,
}

const MUTATING_CALLS: &[&str] = &[
    "create_certificate",
    "revoke_certificates",
    "create_profile",
    "regenerate_profile_with_certificate",
    "create_adhoc_profile",
    "update_adhoc_profile_devices",
];

impl FakePortal {
    pub fn new() -> Self {
        Self {
            state: RefCell::new(PortalState::default()),
            team: test_team(),
        }
    }

    pub fn session(&self, mode: AuthMode) -> PortalSession {
        PortalSession {
            mode,
            team: self.team.clone(),
        }
    }

    pub fn add_valid_certificate(&self, id: &str, serial_number: &str) {
        self.state.borrow_mut().certificates.push(CertificateInfo {
            id: id.to_string(),
            serial_number: serial_number.to_string(),
            name: "iOS Distribution".to_string(),
            expires_at: Utc.with_ymd_and_hms(2036, 10, 16, 19, 22, 10).unwrap(),
        });
    }

    pub fn set_certificate_limit(&self, limit: usize) {
        self.state.borrow_mut().certificate_limit = Some(limit);
    }

    pub fn certificate_ids(&self) -> Vec<String> {
        self.state
            .borrow()
            .certificates
            .iter()
            .map(|c| c.id.clone())
            .collect()
    }

    /// Add a profile to the portal, returning it.
    pub fn add_profile(
        &self,
        bundle_identifier: &str,
        profile_type: ProfileType,
        certificate_serial_number: &str,
        devices: &BTreeSet<String>,
    ) -> ProfileInfo {
        let mut state = self.state.borrow_mut();
        let id = state.id("portal-profile");

        let info = generate_profile(
            &id,
            &format!("existing {}", id),
            bundle_identifier,
            profile_type,
            certificate_serial_number,
            devices,
        );
        state.profiles.push(PortalProfile {
            bundle_identifier: bundle_identifier.to_string(),
            info: info.clone(),
        });

        info
    }

    pub fn set_profile_state(&self, id: &str, profile_state: ProfileState) {
        let mut state = self.state.borrow_mut();

        for profile in state.profiles.iter_mut() {
            if profile.info.id == id {
                profile.info.state = profile_state;
            }
        }
    }

    pub fn remove_profile(&self, id: &str) {
        self.state
            .borrow_mut()
            .profiles
            .retain(|p| p.info.id != id);
    }

    pub fn profile(&self, id: &str) -> Option<ProfileInfo> {
        self.state
            .borrow()
            .profiles
            .iter()
            .find(|p| p.info.id == id)
            .map(|p| p.info.clone())
    }

    pub fn profile_count(&self) -> usize {
        self.state.borrow().profiles.len()
    }

    pub fn register_device(&self, identifier: &str) {
        self.state
            .borrow_mut()
            .devices
            .push(Device::new(identifier, format!("iPhone {}", identifier)));
    }

    /// Devices Apple is still processing are left out of generated profiles.
    pub fn mark_processing(&self, identifier: &str) {
        self.state
            .borrow_mut()
            .processing
            .insert(identifier.to_string());
    }

    pub fn fail_regeneration(&self) {
        self.state.borrow_mut().fail_regeneration = true;
    }

    /// Names of every call made.
    pub fn calls(&self) -> Vec<String> {
        self.state.borrow().calls.clone()
    }

    /// Names of calls that change remote state.
    pub fn mutating_calls(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|c| MUTATING_CALLS.contains(&c.as_str()))
            .collect()
    }

    fn record(&self, call: &str) {
        self.state.borrow_mut().calls.push(call.to_string());
    }

    fn provisioned(&self, devices: &BTreeSet<String>) -> BTreeSet<String> {
        let state = self.state.borrow();

        devices
            .iter()
            .filter(|d| !state.processing.contains(*d))
            .cloned()
            .collect()
    }
}

fn generate_profile(
    id: &str,
    name: &str,
    bundle_identifier: &str,
    profile_type: ProfileType,
    certificate_serial_number: &str,
    devices: &BTreeSet<String>,
) -> ProfileInfo {
    let der = if serial_numbers_equal(certificate_serial_number, DISTRIBUTION_SERIAL) {
        DISTRIBUTION_DER
    } else {
        OTHER_DER
    };
    let expires_at = test_now() + Duration::days(365);

    let mut builder = ProfileBuilder::new(bundle_identifier)
        .certificates(vec![der.to_vec()])
        .expires_at(expires_at)
        .devices(devices)
        .uuid(id)
        .name(name);
    if profile_type == ProfileType::InHouse {
        builder = builder.provisions_all_devices();
    }

    ProfileInfo {
        id: id.to_string(),
        name: name.to_string(),
        profile_type,
        state: ProfileState::Active,
        content: builder.build(),
        expires_at,
        certificate_serial_numbers: vec![certificate_serial_number.to_string()],
        device_ids: devices.clone(),
    }
}

impl DeveloperPortal for FakePortal {
    fn list_valid_certificates(
        &self,
        _session: &PortalSession,
    ) -> Result<Vec<CertificateInfo>, CredentialsError> {
        self.record("list_valid_certificates");

        Ok(self.state.borrow().certificates.clone())
    }

    fn create_certificate(
        &self,
        _session: &PortalSession,
    ) -> Result<CertificateRecord, CredentialsError> {
        self.record("create_certificate");
        let mut state = self.state.borrow_mut();

        if let Some(limit) = state.certificate_limit {
            if state.certificates.len() >= limit {
                return Err(CredentialsError::TooManyCertificates(
                    "you already have a current distribution certificate or a pending request"
                        .into(),
                ));
            }
        }

        let id = state.id("portal-certificate");
        state.certificates.push(CertificateInfo {
            id: id.clone(),
            serial_number: DISTRIBUTION_SERIAL.to_string(),
            name: "iOS Distribution".to_string(),
            expires_at: Utc.with_ymd_and_hms(2036, 10, 16, 19, 22, 10).unwrap(),
        });

        Ok(distribution_certificate_record(Some(&id)))
    }

    fn revoke_certificates(
        &self,
        _session: &PortalSession,
        ids: &[String],
    ) -> Result<(), CredentialsError> {
        self.record("revoke_certificates");

        self.state
            .borrow_mut()
            .certificates
            .retain(|c| !ids.contains(&c.id));

        Ok(())
    }

    fn list_profiles(
        &self,
        _session: &PortalSession,
        bundle_identifier: &str,
        profile_type: ProfileType,
    ) -> Result<Vec<ProfileInfo>, CredentialsError> {
        self.record("list_profiles");

        Ok(self
            .state
            .borrow()
            .profiles
            .iter()
            .filter(|p| {
                p.bundle_identifier == bundle_identifier && p.info.profile_type == profile_type
            })
            .map(|p| p.info.clone())
            .collect())
    }

    fn create_profile(
        &self,
        _session: &PortalSession,
        bundle_identifier: &str,
        profile_type: ProfileType,
        certificate_serial_number: &str,
        name: &str,
    ) -> Result<ProfileInfo, CredentialsError> {
        self.record("create_profile");
        let mut state = self.state.borrow_mut();
        let id = state.id("portal-profile");

        let info = generate_profile(
            &id,
            name,
            bundle_identifier,
            profile_type,
            certificate_serial_number,
            &BTreeSet::new(),
        );
        state.profiles.push(PortalProfile {
            bundle_identifier: bundle_identifier.to_string(),
            info: info.clone(),
        });

        Ok(info)
    }

    fn regenerate_profile_with_certificate(
        &self,
        _session: &PortalSession,
        profile_id: &str,
        certificate_serial_number: &str,
    ) -> Result<ProfileInfo, CredentialsError> {
        self.record("regenerate_profile_with_certificate");
        let mut state = self.state.borrow_mut();

        if state.fail_regeneration {
            return Err(CredentialsError::Portal("profile regeneration failed".into()));
        }

        let profile = state
            .profiles
            .iter_mut()
            .find(|p| p.info.id == profile_id)
            .ok_or_else(|| CredentialsError::Portal(format!("no profile {}", profile_id)))?;

        profile.info = generate_profile(
            profile_id,
            &profile.info.name,
            &profile.bundle_identifier,
            profile.info.profile_type,
            certificate_serial_number,
            &profile.info.device_ids,
        );

        Ok(profile.info.clone())
    }

    fn list_registered_devices(
        &self,
        _session: &PortalSession,
        _team: &AppleTeam,
    ) -> Result<Vec<Device>, CredentialsError> {
        self.record("list_registered_devices");

        Ok(self.state.borrow().devices.clone())
    }

    fn create_adhoc_profile(
        &self,
        _session: &PortalSession,
        bundle_identifier: &str,
        device_ids: &BTreeSet<String>,
        certificate_serial_number: &str,
        name: &str,
    ) -> Result<ProfileInfo, CredentialsError> {
        self.record("create_adhoc_profile");
        let provisioned = self.provisioned(device_ids);
        let mut state = self.state.borrow_mut();
        let id = state.id("portal-profile");

        let info = generate_profile(
            &id,
            name,
            bundle_identifier,
            ProfileType::AdHoc,
            certificate_serial_number,
            &provisioned,
        );
        state.profiles.push(PortalProfile {
            bundle_identifier: bundle_identifier.to_string(),
            info: info.clone(),
        });

        Ok(info)
    }

    fn update_adhoc_profile_devices(
        &self,
        _session: &PortalSession,
        profile_id: &str,
        device_ids: &BTreeSet<String>,
        certificate_serial_number: &str,
    ) -> Result<ProfileInfo, CredentialsError> {
        self.record("update_adhoc_profile_devices");
        let provisioned = self.provisioned(device_ids);
        let mut state = self.state.borrow_mut();

        let profile = state
            .profiles
            .iter_mut()
            .find(|p| p.info.id == profile_id)
            .ok_or_else(|| CredentialsError::Portal(format!("no profile {}", profile_id)))?;

        profile.info = generate_profile(
            profile_id,
            &profile.info.name,
            &profile.bundle_identifier,
            ProfileType::AdHoc,
            certificate_serial_number,
            &provisioned,
        );

        Ok(profile.info.clone())
    }
}

/// An [Authenticator] handing out sessions for the fixture team.
pub struct FakeAuthenticator {
    mode: AuthMode,
    team: Option<AppleTeam>,
    calls: Cell<usize>,
}

impl FakeAuthenticator {
    pub fn new(mode: AuthMode) -> Self {
        Self {
            mode,
            team: Some(test_team()),
            calls: Cell::new(0),
        }
    }

    /// An authenticator that can't determine the team.
    pub fn unresolved_team() -> Self {
        Self {
            mode: AuthMode::ApiKey,
            team: None,
            calls: Cell::new(0),
        }
    }

    pub fn with_team(mut self, team: AppleTeam) -> Self {
        self.team = Some(team);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.get()
    }
}

impl Authenticator for FakeAuthenticator {
    fn authenticate(&self) -> Result<PortalSession, CredentialsError> {
        self.calls.set(self.calls.get() + 1);

        match &self.team {
            Some(team) => Ok(PortalSession {
                mode: self.mode,
                team: team.clone(),
            }),
            None => Err(CredentialsError::AppleTeamUnresolved(
                "no team selected".into(),
            )),
        }
    }
}

/// A [DeviceRegistrar] registering a fixed list of devices with a [FakePortal].
pub struct FakeRegistrar<'a> {
    portal: &'a FakePortal,
    devices: Vec<String>,
    calls: Cell<usize>,
}

impl<'a> FakeRegistrar<'a> {
    pub fn new(portal: &'a FakePortal, devices: &[&str]) -> Self {
        Self {
            portal,
            devices: devices.iter().map(|s| s.to_string()).collect(),
            calls: Cell::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.get()
    }
}

impl<'a> DeviceRegistrar for FakeRegistrar<'a> {
    fn register_devices(
        &self,
        _session: &PortalSession,
        _team: &AppleTeam,
    ) -> Result<(), CredentialsError> {
        self.calls.set(self.calls.get() + 1);

        for device in &self.devices {
            self.portal.register_device(device);
        }

        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq)]
enum Answer {
    Confirm(bool),
    Select(usize),
    MultiSelect(Vec<usize>),
}

/// An [Operator] answering prompts from a script.
///
/// Any prompt not anticipated by the script panics.
#[derive(Default)]
pub struct ScriptedOperator {
    answers: RefCell<VecDeque<Answer>>,
    prompts: RefCell<Vec<String>>,
    notifications: RefCell<Vec<(NotifyLevel, String)>>,
}

impl ScriptedOperator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn answer_confirm(self, value: bool) -> Self {
        self.answers.borrow_mut().push_back(Answer::Confirm(value));
        self
    }

    pub fn answer_select(self, index: usize) -> Self {
        self.answers.borrow_mut().push_back(Answer::Select(index));
        self
    }

    pub fn answer_multi_select(self, indices: Vec<usize>) -> Self {
        self.answers
            .borrow_mut()
            .push_back(Answer::MultiSelect(indices));
        self
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.borrow().clone()
    }

    pub fn notifications(&self) -> Vec<(NotifyLevel, String)> {
        self.notifications.borrow().clone()
    }

    /// Whether every scripted answer was consumed.
    pub fn is_exhausted(&self) -> bool {
        self.answers.borrow().is_empty()
    }

    fn next(&self, message: &str) -> Answer {
        self.prompts.borrow_mut().push(message.to_string());

        self.answers
            .borrow_mut()
            .pop_front()
            .unwrap_or_else(|| panic!("unexpected prompt: {}", message))
    }
}

impl Operator for ScriptedOperator {
    fn confirm(&self, message: &str, _default: bool) -> Result<bool, CredentialsError> {
        match self.next(message) {
            Answer::Confirm(value) => Ok(value),
            other => panic!("expected confirm for {:?}; script has {:?}", message, other),
        }
    }

    fn select(
        &self,
        message: &str,
        choices: &[String],
        _default: usize,
    ) -> Result<usize, CredentialsError> {
        match self.next(message) {
            Answer::Select(index) => {
                assert!(index < choices.len(), "selection out of range");
                Ok(index)
            }
            other => panic!("expected select for {:?}; script has {:?}", message, other),
        }
    }

    fn multi_select(
        &self,
        message: &str,
        choices: &[String],
        _defaults: &[bool],
    ) -> Result<Vec<usize>, CredentialsError> {
        match self.next(message) {
            Answer::MultiSelect(indices) => {
                assert!(
                    indices.iter().all(|i| *i < choices.len()),
                    "selection out of range"
                );
                Ok(indices)
            }
            other => panic!(
                "expected multi select for {:?}; script has {:?}",
                message, other
            ),
        }
    }

    fn notify(&self, level: NotifyLevel, message: &str) {
        self.notifications
            .borrow_mut()
            .push((level, message.to_string()));
    }
}
