// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Operator-supplied credentials from a `credentials.json` file.

The file describes a distribution certificate and provisioning profile for a
single target:

```json
{
  "ios": {
    "provisioningProfilePath": "ios/profile.mobileprovision",
    "distributionCertificate": {
      "path": "ios/dist.p12",
      "password": "secret"
    }
  }
}
```

Or one entry per target, keyed by target name, under `ios`. Relative paths
are resolved against the directory containing the file.

Credentials read this way are only checked locally. The Apple Developer
Portal is never consulted.
*/

use {
    crate::{
        app::AppleTeam,
        store::{ProvisioningProfile, SigningCertificate},
        validation::{validate_locally, Validation},
        CredentialsError,
    },
    chrono::{DateTime, Utc},
    log::debug,
    serde::{Deserialize, Serialize},
    std::{
        collections::BTreeMap,
        path::{Path, PathBuf},
    },
};

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DistributionCertificateEntry {
    pub path: PathBuf,
    #[serde(default)]
    pub password: Option<String>,
}

/// Credentials of a single target.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetCredentialsEntry {
    pub provisioning_profile_path: PathBuf,
    pub distribution_certificate: DistributionCertificateEntry,
}

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(untagged)]
pub enum IosCredentials {
    Single(TargetCredentialsEntry),
    MultiTarget(BTreeMap<String, TargetCredentialsEntry>),
}

#[derive(Deserialize)]
struct CredentialsJson {
    ios: IosCredentials,
}

/// Credentials resolved from a local credentials file.
#[derive(Clone, Debug)]
pub struct LocalBuildCredentials {
    pub target: Option<String>,
    pub certificate: SigningCertificate,
    pub profile: ProvisioningProfile,
    pub team: Option<AppleTeam>,
}

/// A parsed `credentials.json` file.
#[derive(Clone, Debug)]
pub struct LocalCredentialsFile {
    base_dir: PathBuf,
    ios: IosCredentials,
}

impl LocalCredentialsFile {
    /// Read a credentials file from a filesystem path.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, CredentialsError> {
        let path = path.as_ref();
        let data = read_file(path)?;

        Self::from_json(&data, path.parent().unwrap_or_else(|| Path::new("")))
    }

    /// Parse credentials JSON, resolving relative paths against `base_dir`.
    pub fn from_json(data: &[u8], base_dir: impl AsRef<Path>) -> Result<Self, CredentialsError> {
        let parsed: CredentialsJson = serde_json::from_slice(data)?;

        Ok(Self {
            base_dir: base_dir.as_ref().to_path_buf(),
            ios: parsed.ios,
        })
    }

    /// Names of targets defined by the file. Empty for a single-target file.
    pub fn target_names(&self) -> Vec<&str> {
        match &self.ios {
            IosCredentials::Single(_) => vec![],
            IosCredentials::MultiTarget(targets) => targets.keys().map(|k| k.as_str()).collect(),
        }
    }

    /// Obtain the entry for a target.
    ///
    /// A single-target file serves every target. A multi-target file with a
    /// single entry doesn't require a target name.
    pub fn entry(&self, target: Option<&str>) -> Result<&TargetCredentialsEntry, CredentialsError> {
        match (&self.ios, target) {
            (IosCredentials::Single(entry), _) => Ok(entry),
            (IosCredentials::MultiTarget(targets), Some(name)) => {
                targets.get(name).ok_or_else(|| {
                    CredentialsError::InvalidLocalCredentials(format!(
                        "no credentials defined for target {}",
                        name
                    ))
                })
            }
            (IosCredentials::MultiTarget(targets), None) => {
                let mut entries = targets.values();

                match (entries.next(), entries.next()) {
                    (Some(entry), None) => Ok(entry),
                    _ => Err(CredentialsError::InvalidLocalCredentials(format!(
                        "credentials are defined for targets ({}); a target must be specified",
                        self.target_names().join(", ")
                    ))),
                }
            }
        }
    }

    /// Resolve and validate the credentials of a target for `bundle_identifier`.
    pub fn resolve(
        &self,
        target: Option<&str>,
        bundle_identifier: &str,
        now: DateTime<Utc>,
    ) -> Result<LocalBuildCredentials, CredentialsError> {
        let entry = self.entry(target)?;

        let certificate_path = self.base_dir.join(&entry.distribution_certificate.path);
        let profile_path = self.base_dir.join(&entry.provisioning_profile_path);

        debug!(
            "reading local credentials from {} and {}",
            certificate_path.display(),
            profile_path.display()
        );

        let certificate = SigningCertificate::new(
            certificate_path.display(),
            read_file(&certificate_path)?,
            entry
                .distribution_certificate
                .password
                .as_deref()
                .unwrap_or_default(),
        );
        let content = read_file(&profile_path)?;

        if let Validation::Invalid(reason) = validate_locally(
            &content,
            &certificate.fingerprint()?,
            bundle_identifier,
            now,
        ) {
            return Err(CredentialsError::InvalidLocalCredentials(format!(
                "{}: {}",
                profile_path.display(),
                reason
            )));
        }

        let parsed = crate::provisioning_profile::parse_profile(&content)?;
        let team = certificate
            .details()?
            .team_id
            .as_ref()
            .or_else(|| parsed.team_identifiers.first())
            .map(AppleTeam::new);

        let profile = ProvisioningProfile {
            id: profile_path.display().to_string(),
            developer_portal_id: None,
            content,
            team: team.clone(),
            devices: parsed.provisioned_devices.into_iter().collect(),
        };

        let certificate = match &team {
            Some(team) => certificate.with_team(team.clone()),
            None => certificate,
        };

        Ok(LocalBuildCredentials {
            target: target.map(|s| s.to_string()),
            certificate,
            profile,
            team,
        })
    }
}

fn read_file(path: &Path) -> Result<Vec<u8>, CredentialsError> {
    std::fs::read(path).map_err(|e| {
        CredentialsError::InvalidLocalCredentials(format!(
            "unable to read {}: {}",
            path.display(),
            e
        ))
    })
}
