// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Provisioning profile resolution for store and enterprise distribution.

A bound profile that validates locally against the resolved certificate is
reused. Interactive runs also require the Developer Portal to still list it.

Profiles failing either check are repaired when possible: the Developer
Portal's copy is reused or regenerated for the certificate. When the Developer
Portal no longer has the profile, a new one is created and the old store
record deleted. Non-interactive runs never repair.
*/

use {
    crate::{
        app::{AppIdentity, AppleTeam, DistributionKind},
        context::{profile_name, ReconcileContext},
        operator::NotifyLevel,
        portal::{PortalSession, ProfileInfo},
        store::{ProfileRecord, ProvisioningProfile, SigningCertificate},
        validation::{validate_locally, Validation},
        CredentialsError,
    },
    log::{debug, info, warn},
};

pub struct ProfileResolver<'c, 'a> {
    ctx: &'c ReconcileContext<'a>,
    app: &'c AppIdentity,
    kind: DistributionKind,
}

impl<'c, 'a> ProfileResolver<'c, 'a> {
    /// Construct a resolver for store or enterprise distribution.
    ///
    /// Ad hoc profiles are resolved by [crate::adhoc::AdhocProfileResolver].
    pub fn new(
        ctx: &'c ReconcileContext<'a>,
        app: &'c AppIdentity,
        kind: DistributionKind,
    ) -> Result<Self, CredentialsError> {
        if kind == DistributionKind::Adhoc {
            return Err(CredentialsError::UnsupportedDistributionKind(kind));
        }

        Ok(Self { ctx, app, kind })
    }

    /// Resolve the profile to use with `certificate`.
    pub fn resolve(
        &self,
        certificate: &SigningCertificate,
    ) -> Result<ProvisioningProfile, CredentialsError> {
        let bound = self
            .ctx
            .store()
            .get_bound_credentials(self.app, self.kind)?
            .and_then(|credentials| credentials.profile);

        let profile = match bound {
            Some(profile) => profile,
            None if self.ctx.non_interactive() => {
                return Err(CredentialsError::missing(
                    true,
                    format!("no {} provisioning profile for {}", self.kind, self.app),
                ));
            }
            None => {
                info!("no {} provisioning profile for {}", self.kind, self.app);
                let session = self.ctx.ensure_session()?;
                return self.create(session, certificate);
            }
        };

        let validation = self.validate(&profile.content, certificate)?;

        let listed = match validation {
            Validation::Ok if self.ctx.non_interactive() => {
                debug!("using locally valid profile {}", profile.id);
                return Ok(profile);
            }
            Validation::Ok if profile.developer_portal_id.is_none() => {
                info!(
                    "profile {} was not created on the Apple Developer Portal; trusting local validation",
                    profile.id
                );
                return Ok(profile);
            }
            Validation::Ok => {
                let session = self.ctx.ensure_session()?;
                let listed = self.list_profiles(session)?;

                if listed
                    .iter()
                    .any(|p| Some(&p.id) == profile.developer_portal_id.as_ref())
                {
                    debug!("profile {} is valid", profile.id);
                    return Ok(profile);
                }

                self.ctx.notify(
                    NotifyLevel::Warn,
                    &format!(
                        "provisioning profile {} is no longer listed on the Apple Developer Portal",
                        profile.id
                    ),
                );

                listed
            }
            Validation::Invalid(reason) => {
                if self.ctx.non_interactive() {
                    return Err(CredentialsError::missing(
                        true,
                        format!(
                            "{} provisioning profile for {} is not valid: {}",
                            self.kind, self.app, reason
                        ),
                    ));
                }

                self.ctx.notify(
                    NotifyLevel::Warn,
                    &format!("provisioning profile is not valid: {}", reason),
                );

                let session = self.ctx.ensure_session()?;
                self.list_profiles(session)?
            }
        };

        self.repair(profile, certificate, listed)
    }

    fn validate(
        &self,
        content: &[u8],
        certificate: &SigningCertificate,
    ) -> Result<Validation, CredentialsError> {
        Ok(validate_locally(
            content,
            &certificate.fingerprint()?,
            &self.app.bundle_identifier,
            self.ctx.now(),
        ))
    }

    fn list_profiles(&self, session: &PortalSession) -> Result<Vec<ProfileInfo>, CredentialsError> {
        self.ctx.portal().list_profiles(
            session,
            &self.app.bundle_identifier,
            self.kind.profile_type(),
        )
    }

    fn repair(
        &self,
        profile: ProvisioningProfile,
        certificate: &SigningCertificate,
        listed: Vec<ProfileInfo>,
    ) -> Result<ProvisioningProfile, CredentialsError> {
        let session = self.ctx.ensure_session()?;

        let remote = listed.into_iter().find(|p| match &profile.developer_portal_id {
            Some(id) => &p.id == id,
            None => p.content == profile.content,
        });

        let remote = match remote {
            Some(remote) => remote,
            None => {
                info!(
                    "provisioning profile {} no longer exists on the Apple Developer Portal",
                    profile.id
                );
                return self.replace(session, &profile, certificate);
            }
        };

        let remote_usable = remote.is_usable_at(self.ctx.now())
            && self.validate(&remote.content, certificate)?.is_ok();

        let reuse = self.ctx.confirm(
            &format!(
                "Reuse provisioning profile {} ({}) from the Apple Developer Portal?",
                remote.name, remote.id
            ),
            true,
        )?;

        let team = self.team(session, &profile)?;

        if reuse && remote_usable {
            self.ctx
                .ensure_mutation_allowed("update the stored provisioning profile")?;
            info!("refreshing stored provisioning profile {}", profile.id);

            return self.ctx.bind_updated_profile(
                self.app,
                self.kind,
                certificate,
                &team,
                &profile.id,
                record_for(&remote),
            );
        }

        self.ctx
            .ensure_mutation_allowed("regenerate the provisioning profile")?;

        match self.ctx.portal().regenerate_profile_with_certificate(
            session,
            &remote.id,
            &certificate.serial_number()?,
        ) {
            Ok(regenerated) => {
                warn!("regenerated provisioning profile {}", regenerated.id);

                self.ctx.bind_updated_profile(
                    self.app,
                    self.kind,
                    certificate,
                    &team,
                    &profile.id,
                    record_for(&regenerated),
                )
            }
            Err(e) => {
                self.ctx.notify(
                    NotifyLevel::Warn,
                    &format!(
                        "failed to regenerate provisioning profile {}: {}",
                        remote.id, e
                    ),
                );
                self.replace(session, &profile, certificate)
            }
        }
    }

    /// Create a new profile in place of `old` and delete `old` from the store.
    fn replace(
        &self,
        session: &PortalSession,
        old: &ProvisioningProfile,
        certificate: &SigningCertificate,
    ) -> Result<ProvisioningProfile, CredentialsError> {
        let profile = self.create(session, certificate)?;

        if let Err(e) = self.ctx.store().delete_profiles(&[old.id.clone()]) {
            warn!("failed to delete superseded profile {}: {}", old.id, e);
        }

        Ok(profile)
    }

    fn create(
        &self,
        session: &PortalSession,
        certificate: &SigningCertificate,
    ) -> Result<ProvisioningProfile, CredentialsError> {
        self.ctx
            .ensure_mutation_allowed("create a provisioning profile")?;

        let name = profile_name(
            self.ctx.settings().profile_name_prefix(),
            self.kind,
            &self.app.bundle_identifier,
            self.ctx.now(),
        );

        let remote = self.ctx.portal().create_profile(
            session,
            &self.app.bundle_identifier,
            self.kind.profile_type(),
            &certificate.serial_number()?,
            &name,
        )?;
        warn!("created provisioning profile {} ({})", remote.name, remote.id);

        let team = self.ctx.store_team(self.app, &session.team)?;

        self.ctx
            .bind_new_profile(self.app, self.kind, certificate, &team, record_for(&remote))
    }

    fn team(
        &self,
        session: &PortalSession,
        profile: &ProvisioningProfile,
    ) -> Result<AppleTeam, CredentialsError> {
        let team = profile.team.as_ref().unwrap_or(&session.team);

        self.ctx.store_team(self.app, team)
    }
}

fn record_for(profile: &ProfileInfo) -> ProfileRecord {
    ProfileRecord {
        developer_portal_id: Some(profile.id.clone()),
        content: profile.content.clone(),
        devices: profile.device_ids.clone(),
    }
}
