// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Distribution certificate resolution.

The certificate bound to an `(app, distribution kind)` pair is reused when it
is inside its validity window. Interactive runs additionally confirm with the
Developer Portal that the certificate hasn't been revoked. Non-interactive runs
skip that round trip.

When no usable certificate is bound, an interactive operator may reuse another
certificate of the account that the Developer Portal still considers valid, or
create a new one.
*/

use {
    crate::{
        app::{AppIdentity, DistributionKind},
        certificate::serial_numbers_equal,
        context::ReconcileContext,
        operator::NotifyLevel,
        portal::PortalSession,
        store::SigningCertificate,
        CredentialsError,
    },
    chrono::{DateTime, Utc},
    log::{debug, info, warn},
    std::fmt::{Display, Formatter},
};

pub struct CertificateResolver<'c, 'a> {
    ctx: &'c ReconcileContext<'a>,
    app: &'c AppIdentity,
    kind: DistributionKind,
}

impl<'c, 'a> CertificateResolver<'c, 'a> {
    pub fn new(ctx: &'c ReconcileContext<'a>, app: &'c AppIdentity, kind: DistributionKind) -> Self {
        Self { ctx, app, kind }
    }

    /// Resolve the distribution certificate to sign with.
    pub fn resolve(&self) -> Result<SigningCertificate, CredentialsError> {
        let bound = self
            .ctx
            .store()
            .get_bound_credentials(self.app, self.kind)?
            .and_then(|credentials| credentials.certificate);

        if let Some(certificate) = bound {
            let serial = certificate.serial_number()?;

            if !certificate.is_within_validity_window(self.ctx.now())? {
                self.ctx.notify(
                    NotifyLevel::Warn,
                    &format!(
                        "distribution certificate {} is outside of its validity window",
                        serial
                    ),
                );
            } else if self.ctx.non_interactive() {
                info!(
                    "using distribution certificate {} without confirming it with the Apple Developer Portal",
                    serial
                );
                return Ok(certificate);
            } else {
                let session = self.ctx.ensure_session()?;
                let valid = self.ctx.portal().list_valid_certificates(session)?;

                if valid
                    .iter()
                    .any(|info| serial_numbers_equal(&info.serial_number, &serial))
                {
                    debug!("distribution certificate {} is valid", serial);
                    return Ok(certificate);
                }

                self.ctx.notify(
                    NotifyLevel::Warn,
                    &format!(
                        "distribution certificate {} is no longer valid on the Apple Developer Portal",
                        serial
                    ),
                );
            }
        }

        self.resolve_without_valid_certificate()
    }

    fn resolve_without_valid_certificate(&self) -> Result<SigningCertificate, CredentialsError> {
        if self.ctx.non_interactive() {
            return Err(CredentialsError::missing(
                true,
                format!(
                    "no valid {} distribution certificate for {}",
                    self.kind, self.app
                ),
            ));
        }

        let session = self.ctx.ensure_session()?;
        let mut candidates = self.reusable_certificates(session)?;

        if candidates.is_empty() {
            return self.create_certificate(session);
        }

        candidates.sort_by(|a, b| b.expires_at.cmp(&a.expires_at));

        if self.ctx.confirm(
            &format!(
                "Reuse the distribution certificate that expires last? ({})",
                candidates[0]
            ),
            true,
        )? {
            return Ok(candidates.swap_remove(0).certificate);
        }

        let mut choices = candidates
            .iter()
            .map(|candidate| candidate.to_string())
            .collect::<Vec<_>>();
        choices.push("Create a new distribution certificate".to_string());

        let index = self
            .ctx
            .select("Select a distribution certificate", &choices, 0)?;

        match candidates.into_iter().nth(index) {
            Some(candidate) => Ok(candidate.certificate),
            None => self.create_certificate(session),
        }
    }

    /// Certificates of the account the Developer Portal still considers valid.
    fn reusable_certificates(
        &self,
        session: &PortalSession,
    ) -> Result<Vec<Candidate>, CredentialsError> {
        let valid = self.ctx.portal().list_valid_certificates(session)?;
        let now = self.ctx.now();

        let mut candidates = vec![];

        for certificate in self.ctx.store().list_certificates(&self.app.account)? {
            let (serial_number, expires_at) =
                match (certificate.serial_number(), certificate.expires_at()) {
                    (Ok(serial), Ok(expires_at)) => (serial, expires_at),
                    (Err(e), _) | (_, Err(e)) => {
                        warn!("ignoring unreadable certificate {}: {}", certificate.id, e);
                        continue;
                    }
                };

            if !certificate.is_within_validity_window(now)? {
                continue;
            }

            if valid
                .iter()
                .any(|info| serial_numbers_equal(&info.serial_number, &serial_number))
            {
                candidates.push(Candidate {
                    certificate,
                    serial_number,
                    expires_at,
                });
            }
        }

        Ok(candidates)
    }

    fn create_certificate(
        &self,
        session: &PortalSession,
    ) -> Result<SigningCertificate, CredentialsError> {
        self.ctx
            .ensure_mutation_allowed("create a distribution certificate")?;

        let portal = self.ctx.portal();

        let record = match portal.create_certificate(session) {
            Ok(record) => record,
            Err(CredentialsError::TooManyCertificates(msg)) => {
                self.ctx.notify(
                    NotifyLevel::Warn,
                    &format!("unable to create a distribution certificate: {}", msg),
                );
                self.revoke_one(session, &msg)?;
                portal.create_certificate(session)?
            }
            Err(e) => return Err(e),
        };

        let certificate = self
            .ctx
            .store()
            .create_certificate(&self.app.account, record)?;

        warn!(
            "created distribution certificate {}",
            certificate.serial_number()?
        );

        Ok(certificate)
    }

    /// Let the operator revoke a certificate to make room for a new one.
    fn revoke_one(&self, session: &PortalSession, reason: &str) -> Result<(), CredentialsError> {
        let portal = self.ctx.portal();
        let valid = portal.list_valid_certificates(session)?;

        if valid.is_empty() {
            return Err(CredentialsError::TooManyCertificates(reason.to_string()));
        }

        let mut choices = valid
            .iter()
            .map(|info| {
                format!(
                    "{} (serial {}, expires {})",
                    info.name,
                    info.serial_number,
                    info.expires_at.format("%Y-%m-%d")
                )
            })
            .collect::<Vec<_>>();
        choices.push("Don't revoke anything".to_string());

        let index = self.ctx.select(
            "Select a distribution certificate to revoke",
            &choices,
            choices.len() - 1,
        )?;

        let info = valid.get(index).ok_or_else(|| {
            CredentialsError::OperatorAborted("no certificate selected for revocation".into())
        })?;

        warn!("revoking distribution certificate {}", info.serial_number);
        portal.revoke_certificates(session, &[info.id.clone()])
    }
}

/// A certificate the operator may reuse.
struct Candidate {
    certificate: SigningCertificate,
    serial_number: String,
    expires_at: DateTime<Utc>,
}

impl Display for Candidate {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let team = self
            .certificate
            .team
            .as_ref()
            .map(|team| team.to_string())
            .unwrap_or_else(|| "unknown team".to_string());

        write!(
            f,
            "serial {}, team {}, expires {}",
            self.serial_number,
            team,
            self.expires_at.format("%Y-%m-%d")
        )
    }
}
