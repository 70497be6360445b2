// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Collaborators and policy shared by every resolver.

A [ReconcileContext] is constructed once per command invocation. It holds the
backend store, Developer Portal, operator, and settings, and owns the lazily
established Developer Portal session.
*/

use {
    crate::{
        app::{AppIdentity, AppleTeam, DistributionKind},
        operator::{log_notification, NotifyLevel, Operator},
        portal::{AuthMode, Authenticator, DeveloperPortal, DeviceRegistrar, PortalSession},
        settings::ReconcileSettings,
        store::{CredentialStore, ProfileRecord, ProvisioningProfile, SigningCertificate},
        CredentialsError,
    },
    chrono::{DateTime, Utc},
    log::{debug, warn},
    once_cell::unsync::OnceCell,
};

pub struct ReconcileContext<'a> {
    settings: ReconcileSettings,
    store: &'a dyn CredentialStore,
    portal: &'a dyn DeveloperPortal,
    authenticator: &'a dyn Authenticator,
    operator: &'a dyn Operator,
    registrar: Option<&'a dyn DeviceRegistrar>,
    now: DateTime<Utc>,
    session: OnceCell<PortalSession>,
}

impl<'a> ReconcileContext<'a> {
    pub fn new(
        settings: ReconcileSettings,
        store: &'a dyn CredentialStore,
        portal: &'a dyn DeveloperPortal,
        authenticator: &'a dyn Authenticator,
        operator: &'a dyn Operator,
    ) -> Self {
        Self {
            settings,
            store,
            portal,
            authenticator,
            operator,
            registrar: None,
            now: Utc::now(),
            session: OnceCell::new(),
        }
    }

    /// Register a collaborator used to register devices when a team has none.
    pub fn with_device_registrar(mut self, registrar: &'a dyn DeviceRegistrar) -> Self {
        self.registrar = Some(registrar);
        self
    }

    /// Override the instant validity is evaluated at.
    pub fn with_now(mut self, now: DateTime<Utc>) -> Self {
        self.now = now;
        self
    }

    pub fn settings(&self) -> &ReconcileSettings {
        &self.settings
    }

    pub fn store(&self) -> &'a dyn CredentialStore {
        self.store
    }

    pub fn portal(&self) -> &'a dyn DeveloperPortal {
        self.portal
    }

    pub fn device_registrar(&self) -> Option<&'a dyn DeviceRegistrar> {
        self.registrar
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.now
    }

    pub fn non_interactive(&self) -> bool {
        self.settings.non_interactive()
    }

    /// Obtain the Developer Portal session, authenticating on first use.
    pub fn ensure_session(&self) -> Result<&PortalSession, CredentialsError> {
        self.session.get_or_try_init(|| {
            debug!("authenticating with the Apple Developer Portal");

            let session = match self.authenticator.authenticate() {
                Ok(session) => session,
                Err(CredentialsError::AppleTeamUnresolved(msg)) if self.non_interactive() => {
                    return Err(CredentialsError::MissingCredentialsNonInteractive(format!(
                        "unable to resolve the Apple team: {}",
                        msg
                    )));
                }
                Err(e) => return Err(e),
            };

            if self.non_interactive() && session.mode == AuthMode::UserSession {
                return Err(CredentialsError::InsufficientAuthentication(
                    "Developer Portal access".into(),
                ));
            }

            Ok(session)
        })
    }

    /// Whether a session has been established.
    pub fn has_session(&self) -> bool {
        self.session.get().is_some()
    }

    /// Resolve the team credentials belong to.
    ///
    /// A team already associated with stored credentials wins. Otherwise the
    /// authenticated session's team is used.
    pub fn resolve_team(&self, known: Option<&AppleTeam>) -> Result<AppleTeam, CredentialsError> {
        if let Some(team) = known {
            return Ok(team.clone());
        }

        Ok(self.ensure_session()?.team.clone())
    }

    /// Obtain the store's record of a team.
    pub fn store_team(
        &self,
        app: &AppIdentity,
        team: &AppleTeam,
    ) -> Result<AppleTeam, CredentialsError> {
        self.store
            .create_or_get_team(app, &team.identifier, team.name.as_deref())
    }

    /// Fail if credential modification is forbidden.
    ///
    /// `action` completes the sentence "refusing to ...".
    pub fn ensure_mutation_allowed(&self, action: &str) -> Result<(), CredentialsError> {
        if self.settings.freeze_credentials() {
            warn!("credentials are frozen; not going to {}", action);
            Err(CredentialsError::ForbidCredentialModification(
                action.to_string(),
            ))
        } else {
            Ok(())
        }
    }

    fn operator(&self, prompt: &str) -> Result<&'a dyn Operator, CredentialsError> {
        if self.non_interactive() {
            Err(CredentialsError::OperatorUnavailable(prompt.to_string()))
        } else {
            Ok(self.operator)
        }
    }

    pub fn confirm(&self, message: &str, default: bool) -> Result<bool, CredentialsError> {
        self.operator(message)?.confirm(message, default)
    }

    pub fn select(
        &self,
        message: &str,
        choices: &[String],
        default: usize,
    ) -> Result<usize, CredentialsError> {
        self.operator(message)?.select(message, choices, default)
    }

    pub fn multi_select(
        &self,
        message: &str,
        choices: &[String],
        defaults: &[bool],
    ) -> Result<Vec<usize>, CredentialsError> {
        self.operator(message)?
            .multi_select(message, choices, defaults)
    }

    /// Tell the operator something, or log it when nobody is watching.
    pub fn notify(&self, level: NotifyLevel, message: &str) {
        if self.non_interactive() {
            log_notification(level, message);
        } else {
            self.operator.notify(level, message);
        }
    }

    /// Persist a new profile and bind it to `(app, kind)`.
    ///
    /// If binding fails the new profile record is removed again so no record
    /// is left that nothing references.
    pub fn bind_new_profile(
        &self,
        app: &AppIdentity,
        kind: DistributionKind,
        certificate: &SigningCertificate,
        team: &AppleTeam,
        record: ProfileRecord,
    ) -> Result<ProvisioningProfile, CredentialsError> {
        let app_identifier = self.store.create_or_get_app_identifier(app, team)?;
        let profile = self.store.create_profile(&app_identifier, team, record)?;

        match self
            .store
            .create_or_update_build_credentials(app, kind, certificate, &profile, team)
        {
            Ok(_) => Ok(profile),
            Err(e) => {
                if let Err(cleanup) = self.store.delete_profiles(&[profile.id.clone()]) {
                    warn!("failed to delete unbound profile {}: {}", profile.id, cleanup);
                }
                Err(e)
            }
        }
    }

    /// Replace an existing profile record's content and bind it to `(app, kind)`.
    pub fn bind_updated_profile(
        &self,
        app: &AppIdentity,
        kind: DistributionKind,
        certificate: &SigningCertificate,
        team: &AppleTeam,
        profile_id: &str,
        record: ProfileRecord,
    ) -> Result<ProvisioningProfile, CredentialsError> {
        let profile = self.store.update_profile(profile_id, record)?;
        self.store
            .create_or_update_build_credentials(app, kind, certificate, &profile, team)?;

        Ok(profile)
    }
}

/// Name given to profiles created on the Developer Portal.
pub fn profile_name(
    prefix: &str,
    kind: DistributionKind,
    bundle_identifier: &str,
    now: DateTime<Utc>,
) -> String {
    format!("{}({}) {} {}", prefix, kind, bundle_identifier, now.timestamp())
}
