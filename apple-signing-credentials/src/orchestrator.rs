// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Top-level reconciliation entry points.

[Reconciler] resolves a certificate and then a provisioning profile for each
requested `(app, distribution kind)` pair and makes sure the backend store
binds them together. Failures are reported with the pair they concern.
*/

use {
    crate::{
        adhoc::AdhocProfileResolver,
        app::{AppIdentity, AppleTeam, DistributionKind},
        certificate_resolver::CertificateResolver,
        context::ReconcileContext,
        local_credentials::{LocalBuildCredentials, LocalCredentialsFile},
        portal::AuthMode,
        profile_resolver::ProfileResolver,
        settings::EnterpriseProvisioning,
        store::{BuildCredentials, ProvisioningProfile, SigningCertificate},
        CredentialsError,
    },
    log::{debug, info, warn},
    std::{collections::HashSet, path::Path},
};

/// Credentials resolved for a single target.
#[derive(Clone, Debug)]
pub struct ResolvedCredentials {
    pub app: AppIdentity,
    pub kind: DistributionKind,
    pub certificate: SigningCertificate,
    pub profile: ProvisioningProfile,
    pub team: Option<AppleTeam>,
}

/// The outcome of reconciling one target of a multi-target run.
#[derive(Debug)]
pub struct TargetResult {
    pub app: AppIdentity,
    pub kind: DistributionKind,
    pub result: Result<ResolvedCredentials, CredentialsError>,
}

pub struct Reconciler<'c, 'a> {
    ctx: &'c ReconcileContext<'a>,
}

impl<'c, 'a> Reconciler<'c, 'a> {
    pub fn new(ctx: &'c ReconcileContext<'a>) -> Self {
        Self { ctx }
    }

    /// Reconcile credentials for `app` and `kind`.
    pub fn setup(
        &self,
        app: &AppIdentity,
        kind: DistributionKind,
    ) -> Result<ResolvedCredentials, CredentialsError> {
        self.setup_unwrapped(app, kind)
            .map_err(|e| wrap_target_error(app, kind, e))
    }

    pub fn setup_store(&self, app: &AppIdentity) -> Result<ResolvedCredentials, CredentialsError> {
        self.setup(app, DistributionKind::Store)
    }

    pub fn setup_enterprise(
        &self,
        app: &AppIdentity,
    ) -> Result<ResolvedCredentials, CredentialsError> {
        self.setup(app, DistributionKind::Enterprise)
    }

    pub fn setup_adhoc(&self, app: &AppIdentity) -> Result<ResolvedCredentials, CredentialsError> {
        self.setup(app, DistributionKind::Adhoc)
    }

    /// Reconcile credentials for internal distribution.
    ///
    /// Enterprise distribution is used when configured or when the team is
    /// enterprise capable. Ad hoc distribution is used otherwise.
    pub fn setup_internal(
        &self,
        app: &AppIdentity,
    ) -> Result<ResolvedCredentials, CredentialsError> {
        let kind = self
            .internal_distribution_kind()
            .map_err(|e| wrap_target_error(app, DistributionKind::Enterprise, e))?;

        self.setup(app, kind)
    }

    /// Reconcile several targets.
    ///
    /// Targets are resolved in order. A failing target doesn't prevent the
    /// remaining targets from being resolved.
    pub fn reconcile_targets(
        &self,
        targets: &[(AppIdentity, DistributionKind)],
    ) -> Result<Vec<TargetResult>, CredentialsError> {
        let mut seen = HashSet::new();
        for (app, kind) in targets {
            if !seen.insert((app, kind)) {
                return Err(CredentialsError::DuplicateTarget {
                    bundle_identifier: app.bundle_identifier.clone(),
                    kind: *kind,
                });
            }
        }

        Ok(targets
            .iter()
            .map(|(app, kind)| {
                let result = self.setup(app, *kind);

                if let Err(e) = &result {
                    warn!("{}", e);
                }

                TargetResult {
                    app: app.clone(),
                    kind: *kind,
                    result,
                }
            })
            .collect())
    }

    /// Resolve credentials from a local credentials file.
    ///
    /// Neither the backend store nor the Developer Portal is consulted.
    pub fn resolve_from_local_file(
        &self,
        path: impl AsRef<Path>,
        app: &AppIdentity,
        target: Option<&str>,
    ) -> Result<LocalBuildCredentials, CredentialsError> {
        let file = LocalCredentialsFile::from_path(path)?;

        file.resolve(target, &app.bundle_identifier, self.ctx.now())
    }

    fn setup_unwrapped(
        &self,
        app: &AppIdentity,
        kind: DistributionKind,
    ) -> Result<ResolvedCredentials, CredentialsError> {
        self.check_authentication(kind)?;

        info!("reconciling {} credentials for {}", kind, app);

        let certificate = CertificateResolver::new(self.ctx, app, kind).resolve()?;

        let profile = match kind {
            DistributionKind::Adhoc => {
                AdhocProfileResolver::new(self.ctx, app).resolve(&certificate)?
            }
            DistributionKind::Store | DistributionKind::Enterprise => {
                ProfileResolver::new(self.ctx, app, kind)?.resolve(&certificate)?
            }
        };

        let credentials = self.ensure_binding(app, kind, &certificate, &profile)?;

        Ok(ResolvedCredentials {
            app: app.clone(),
            kind,
            certificate,
            profile,
            team: credentials.team,
        })
    }

    /// Refuse to run non-interactively with an operator-only authentication mode.
    fn check_authentication(&self, kind: DistributionKind) -> Result<(), CredentialsError> {
        if self.ctx.non_interactive()
            && self.ctx.settings().auth_mode() == Some(AuthMode::UserSession)
        {
            return Err(CredentialsError::InsufficientAuthentication(format!(
                "reconciling {} credentials",
                kind
            )));
        }

        Ok(())
    }

    fn internal_distribution_kind(&self) -> Result<DistributionKind, CredentialsError> {
        match self.ctx.settings().enterprise_provisioning() {
            Some(EnterpriseProvisioning::Universal) => Ok(DistributionKind::Enterprise),
            Some(EnterpriseProvisioning::Adhoc) => Ok(DistributionKind::Adhoc),
            None => {
                self.check_authentication(DistributionKind::Enterprise)?;

                let team = &self.ctx.ensure_session()?.team;
                if team.is_enterprise_capable {
                    debug!("team {} is enterprise capable", team);
                    Ok(DistributionKind::Enterprise)
                } else {
                    Ok(DistributionKind::Adhoc)
                }
            }
        }
    }

    /// Make sure the store binds `certificate` and `profile` to `(app, kind)`.
    fn ensure_binding(
        &self,
        app: &AppIdentity,
        kind: DistributionKind,
        certificate: &SigningCertificate,
        profile: &ProvisioningProfile,
    ) -> Result<BuildCredentials, CredentialsError> {
        let store = self.ctx.store();

        if let Some(existing) = store.get_bound_credentials(app, kind)? {
            let same_certificate =
                existing.certificate.as_ref().map(|c| &c.id) == Some(&certificate.id);
            let same_profile = existing.profile.as_ref().map(|p| &p.id) == Some(&profile.id);

            if same_certificate && same_profile {
                return Ok(existing);
            }
        }

        self.ctx.ensure_mutation_allowed("update build credentials")?;

        let team = match profile.team.as_ref().or(certificate.team.as_ref()) {
            Some(team) => team.clone(),
            None => self.ctx.resolve_team(None)?,
        };
        let team = self.ctx.store_team(app, &team)?;

        info!("binding {} credentials for {}", kind, app);
        store.create_or_update_build_credentials(app, kind, certificate, profile, &team)
    }
}

fn wrap_target_error(
    app: &AppIdentity,
    kind: DistributionKind,
    error: CredentialsError,
) -> CredentialsError {
    match error {
        CredentialsError::Target { .. } => error,
        error => CredentialsError::Target {
            account: app.account.clone(),
            project: app.project_name.clone(),
            bundle_identifier: app.bundle_identifier.clone(),
            kind,
            source: Box::new(error),
        },
    }
}
