// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Ad hoc provisioning profile resolution.

Ad hoc profiles are scoped to a list of devices. In addition to the checks
performed for other distribution kinds, the devices embedded in the bound
profile are reconciled against the devices registered with the team.

Devices Apple is still processing may be silently left out of a generated
profile. Those are reported to the operator instead of being dropped.
*/

use {
    crate::{
        app::{AppIdentity, AppleTeam, Device, DistributionKind},
        context::{profile_name, ReconcileContext},
        operator::NotifyLevel,
        portal::{AdhocProfileAction, AdhocProfileOutcome, PortalSession, ProfileInfo},
        store::{ProfileRecord, ProvisioningProfile, SigningCertificate},
        validation::{validate_locally, Validation},
        CredentialsError,
    },
    log::{debug, info, warn},
    std::collections::BTreeSet,
};

pub struct AdhocProfileResolver<'c, 'a> {
    ctx: &'c ReconcileContext<'a>,
    app: &'c AppIdentity,
}

impl<'c, 'a> AdhocProfileResolver<'c, 'a> {
    pub fn new(ctx: &'c ReconcileContext<'a>, app: &'c AppIdentity) -> Self {
        Self { ctx, app }
    }

    /// Resolve the ad hoc profile to use with `certificate`.
    pub fn resolve(
        &self,
        certificate: &SigningCertificate,
    ) -> Result<ProvisioningProfile, CredentialsError> {
        let bound = self
            .ctx
            .store()
            .get_bound_credentials(self.app, DistributionKind::Adhoc)?
            .and_then(|credentials| credentials.profile);

        if self.ctx.non_interactive() {
            return self.resolve_non_interactive(bound, certificate);
        }

        let team = self
            .ctx
            .resolve_team(bound.as_ref().and_then(|p| p.team.as_ref()))?;
        let session = self.ctx.ensure_session()?;

        let mut registered = self.ctx.portal().list_registered_devices(session, &team)?;
        if registered.is_empty() {
            registered = self.register_devices(session, &team)?;
        }
        let registered_ids = registered
            .iter()
            .map(|d| d.identifier.clone())
            .collect::<BTreeSet<_>>();

        if let Some(profile) = &bound {
            if profile.developer_portal_id.is_none()
                && provisioned_devices(profile) == registered_ids
                && self.validate(profile, certificate)? == Validation::Ok
            {
                info!(
                    "profile {} was not created on the Apple Developer Portal; trusting local validation",
                    profile.id
                );
                return Ok(profile.clone());
            }
        }

        let chosen = match &bound {
            Some(profile) => {
                let provisioned = provisioned_devices(profile);

                if provisioned == registered_ids {
                    debug!("profile {} covers every registered device", profile.id);
                    registered_ids
                } else {
                    let missing = registered
                        .iter()
                        .filter(|d| !provisioned.contains(&d.identifier))
                        .map(|d| d.to_string())
                        .collect::<Vec<_>>();

                    if !missing.is_empty() {
                        self.ctx.notify(
                            NotifyLevel::Warn,
                            &format!(
                                "the provisioning profile is missing the following devices:\n{}",
                                missing.join("\n")
                            ),
                        );
                    }

                    self.choose_devices(&registered)?
                }
            }
            None => {
                info!(
                    "provisioning all {} registered devices",
                    registered_ids.len()
                );
                registered_ids
            }
        };

        let outcome = self.locate_or_create(session, bound.as_ref(), &chosen, certificate)?;

        self.confirm_provisioned(&chosen, &outcome.profile)?;

        self.bind(&team, bound, certificate, outcome)
    }

    fn resolve_non_interactive(
        &self,
        bound: Option<ProvisioningProfile>,
        certificate: &SigningCertificate,
    ) -> Result<ProvisioningProfile, CredentialsError> {
        let profile = bound.ok_or_else(|| {
            CredentialsError::missing(
                true,
                format!("no adhoc provisioning profile for {}", self.app),
            )
        })?;

        if let Validation::Invalid(reason) = self.validate(&profile, certificate)? {
            return Err(CredentialsError::missing(
                true,
                format!(
                    "adhoc provisioning profile for {} is not valid: {}",
                    self.app, reason
                ),
            ));
        }

        let team = self.ctx.resolve_team(profile.team.as_ref())?;
        let session = self.ctx.ensure_session()?;
        let registered = self.ctx.portal().list_registered_devices(session, &team)?;

        let provisioned = provisioned_devices(&profile);
        let missing = registered
            .iter()
            .filter(|d| !provisioned.contains(&d.identifier))
            .map(|d| d.identifier.clone())
            .collect::<Vec<_>>();

        if missing.is_empty() {
            Ok(profile)
        } else {
            Err(CredentialsError::missing(
                true,
                format!(
                    "adhoc provisioning profile for {} does not include registered devices: {}",
                    self.app,
                    missing.join(", ")
                ),
            ))
        }
    }

    fn validate(
        &self,
        profile: &ProvisioningProfile,
        certificate: &SigningCertificate,
    ) -> Result<Validation, CredentialsError> {
        Ok(validate_locally(
            &profile.content,
            &certificate.fingerprint()?,
            &self.app.bundle_identifier,
            self.ctx.now(),
        ))
    }

    fn register_devices(
        &self,
        session: &PortalSession,
        team: &AppleTeam,
    ) -> Result<Vec<Device>, CredentialsError> {
        let instruction = format!(
            "register devices with team {} before provisioning adhoc credentials",
            team
        );

        if !self.ctx.confirm(
            &format!(
                "No devices are registered with team {}. Register devices now?",
                team
            ),
            true,
        )? {
            return Err(CredentialsError::MissingCredentials(instruction));
        }

        let registrar = self
            .ctx
            .device_registrar()
            .ok_or_else(|| CredentialsError::MissingCredentials(instruction.clone()))?;
        registrar.register_devices(session, team)?;

        let devices = self.ctx.portal().list_registered_devices(session, team)?;
        if devices.is_empty() {
            Err(CredentialsError::MissingCredentials(instruction))
        } else {
            Ok(devices)
        }
    }

    fn choose_devices(&self, registered: &[Device]) -> Result<BTreeSet<String>, CredentialsError> {
        if self
            .ctx
            .confirm("Provision all registered devices?", true)?
        {
            return Ok(registered.iter().map(|d| d.identifier.clone()).collect());
        }

        let choices = registered.iter().map(|d| d.to_string()).collect::<Vec<_>>();
        let defaults = vec![true; choices.len()];

        let selected = self
            .ctx
            .multi_select("Select devices to provision", &choices, &defaults)?;

        if selected.is_empty() {
            return Err(CredentialsError::OperatorAborted(
                "no devices selected".into(),
            ));
        }

        Ok(selected
            .into_iter()
            .filter_map(|i| registered.get(i))
            .map(|d| d.identifier.clone())
            .collect())
    }

    fn locate_or_create(
        &self,
        session: &PortalSession,
        bound: Option<&ProvisioningProfile>,
        devices: &BTreeSet<String>,
        certificate: &SigningCertificate,
    ) -> Result<AdhocProfileOutcome, CredentialsError> {
        let portal = self.ctx.portal();
        let serial = certificate.serial_number()?;
        let now = self.ctx.now();

        if self.ctx.settings().freeze_credentials() {
            let profiles = portal.list_profiles(
                session,
                &self.app.bundle_identifier,
                DistributionKind::Adhoc.profile_type(),
            )?;

            return match profiles.into_iter().find(|p| {
                p.is_usable_at(now) && p.has_certificate(&serial) && &p.device_ids == devices
            }) {
                Some(profile) => Ok(AdhocProfileOutcome {
                    profile,
                    action: AdhocProfileAction::Reused,
                }),
                None => {
                    warn!("credentials are frozen and no existing adhoc profile is usable");
                    Err(CredentialsError::ForbidCredentialModification(
                        "create or update the adhoc provisioning profile".into(),
                    ))
                }
            };
        }

        let prefix = self.ctx.settings().profile_name_prefix();
        let name = profile_name(prefix, DistributionKind::Adhoc, &self.app.bundle_identifier, now);

        let outcome = portal.create_or_reuse_adhoc_profile(
            session,
            &self.app.bundle_identifier,
            devices,
            &serial,
            &name,
            prefix,
            bound.and_then(|p| p.developer_portal_id.as_deref()),
            now,
        )?;

        match outcome.action {
            AdhocProfileAction::Reused => {
                debug!("reusing adhoc profile {}", outcome.profile.id)
            }
            AdhocProfileAction::Created => {
                warn!("created adhoc provisioning profile {}", outcome.profile.id)
            }
            AdhocProfileAction::Regenerated => {
                warn!(
                    "regenerated adhoc provisioning profile {}",
                    outcome.profile.id
                )
            }
        }

        Ok(outcome)
    }

    /// Report requested devices missing from the generated profile.
    fn confirm_provisioned(
        &self,
        chosen: &BTreeSet<String>,
        profile: &ProfileInfo,
    ) -> Result<(), CredentialsError> {
        let failed = chosen
            .difference(&profile.device_ids)
            .cloned()
            .collect::<Vec<_>>();

        if failed.is_empty() {
            return Ok(());
        }

        self.ctx.notify(
            NotifyLevel::Warn,
            &format!(
                "failed to provision the following devices: {}; they may still be processing on \
                 Apple's side, try again later",
                failed.join(", ")
            ),
        );

        if self
            .ctx
            .confirm("Continue without these devices?", false)?
        {
            Ok(())
        } else {
            Err(CredentialsError::AdhocDevicesNotProvisioned(failed))
        }
    }

    fn bind(
        &self,
        team: &AppleTeam,
        bound: Option<ProvisioningProfile>,
        certificate: &SigningCertificate,
        outcome: AdhocProfileOutcome,
    ) -> Result<ProvisioningProfile, CredentialsError> {
        let remote = outcome.profile;

        let current = matches!(&bound, Some(profile)
            if profile.developer_portal_id.as_deref() == Some(remote.id.as_str())
                && profile.content == remote.content);

        if let (true, Some(profile)) = (current, &bound) {
            debug!("bound profile {} is current", profile.id);
            return Ok(profile.clone());
        }

        self.ctx
            .ensure_mutation_allowed("update the stored adhoc provisioning profile")?;

        let team = self.ctx.store_team(self.app, team)?;
        let record = ProfileRecord {
            developer_portal_id: Some(remote.id.clone()),
            content: remote.content.clone(),
            devices: remote.device_ids.clone(),
        };

        match bound {
            Some(profile) if profile.developer_portal_id.as_deref() == Some(remote.id.as_str()) => {
                self.ctx.bind_updated_profile(
                    self.app,
                    DistributionKind::Adhoc,
                    certificate,
                    &team,
                    &profile.id,
                    record,
                )
            }
            other => {
                let new = self.ctx.bind_new_profile(
                    self.app,
                    DistributionKind::Adhoc,
                    certificate,
                    &team,
                    record,
                )?;

                if let Some(old) = other {
                    info!("deleting superseded adhoc profile {}", old.id);
                    if let Err(e) = self.ctx.store().delete_profiles(&[old.id.clone()]) {
                        warn!("failed to delete superseded profile {}: {}", old.id, e);
                    }
                }

                Ok(new)
            }
        }
    }
}

/// Devices a stored profile is scoped to.
///
/// Falls back to the devices embedded in the profile content when the store
/// doesn't track them.
fn provisioned_devices(profile: &ProvisioningProfile) -> BTreeSet<String> {
    if !profile.devices.is_empty() {
        return profile.devices.clone();
    }

    match profile.parse() {
        Ok(parsed) => parsed.provisioned_devices.into_iter().collect(),
        Err(e) => {
            warn!("unable to read devices of profile {}: {}", profile.id, e);
            BTreeSet::new()
        }
    }
}
