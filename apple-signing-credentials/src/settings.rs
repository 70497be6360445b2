// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Reconciliation settings.

Settings can be constructed programmatically, loaded from a JSON file, and
overlaid with environment variables. Environment variables take precedence.
*/

use {
    crate::{portal::AuthMode, CredentialsError},
    log::warn,
    serde::{Deserialize, Serialize},
    std::{path::Path, str::FromStr},
};

/// Environment variable forcing non-interactive mode.
pub const NON_INTERACTIVE_ENV: &str = "RSIGNCREDS_NON_INTERACTIVE";

/// Environment variable forbidding credential modification.
pub const FREEZE_CREDENTIALS_ENV: &str = "RSIGNCREDS_FREEZE_CREDENTIALS";

/// Environment variable naming the Developer Portal authentication mode.
pub const AUTH_MODE_ENV: &str = "RSIGNCREDS_AUTH_MODE";

const DEFAULT_PROFILE_NAME_PREFIX: &str = "*[rsigncreds] ";

/// How internal distribution is provisioned.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EnterpriseProvisioning {
    /// Enterprise (in-house) profiles, installable on any device.
    Universal,
    /// Ad hoc profiles scoped to registered devices.
    Adhoc,
}

impl FromStr for EnterpriseProvisioning {
    type Err = CredentialsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "universal" => Ok(Self::Universal),
            "adhoc" => Ok(Self::Adhoc),
            _ => Err(CredentialsError::CliGeneralError(format!(
                "unknown enterprise provisioning: {}",
                s
            ))),
        }
    }
}

/// Settings governing a reconciliation run.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ReconcileSettings {
    non_interactive: bool,
    freeze_credentials: bool,
    auth_mode: Option<AuthMode>,
    enterprise_provisioning: Option<EnterpriseProvisioning>,
    profile_name_prefix: String,
}

impl Default for ReconcileSettings {
    fn default() -> Self {
        Self {
            non_interactive: false,
            freeze_credentials: false,
            auth_mode: None,
            enterprise_provisioning: None,
            profile_name_prefix: DEFAULT_PROFILE_NAME_PREFIX.to_string(),
        }
    }
}

impl ReconcileSettings {
    /// Load settings from a JSON file.
    pub fn from_json_path(path: impl AsRef<Path>) -> Result<Self, CredentialsError> {
        let data = std::fs::read(path.as_ref())?;

        Ok(serde_json::from_slice(&data)?)
    }

    /// Default settings overlaid with the process environment.
    pub fn from_env() -> Result<Self, CredentialsError> {
        let mut settings = Self::default();
        settings.apply_env(|key| std::env::var(key).ok())?;

        Ok(settings)
    }

    /// Overlay values from an environment lookup function.
    pub fn apply_env(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), CredentialsError> {
        if let Some(value) = lookup(NON_INTERACTIVE_ENV) {
            self.non_interactive = is_truthy(&value);
        }

        if let Some(value) = lookup(FREEZE_CREDENTIALS_ENV) {
            self.freeze_credentials = is_truthy(&value);
        }

        if let Some(value) = lookup(AUTH_MODE_ENV) {
            if value.is_empty() {
                warn!("ignoring empty {}", AUTH_MODE_ENV);
            } else {
                self.auth_mode = Some(AuthMode::from_str(&value)?);
            }
        }

        Ok(())
    }

    /// Whether no operator is available to answer prompts.
    pub fn non_interactive(&self) -> bool {
        self.non_interactive
    }

    pub fn set_non_interactive(&mut self, value: bool) {
        self.non_interactive = value;
    }

    /// Whether credential creation and repair is forbidden.
    pub fn freeze_credentials(&self) -> bool {
        self.freeze_credentials
    }

    pub fn set_freeze_credentials(&mut self, value: bool) {
        self.freeze_credentials = value;
    }

    /// The Developer Portal authentication mode, if known ahead of time.
    pub fn auth_mode(&self) -> Option<AuthMode> {
        self.auth_mode
    }

    pub fn set_auth_mode(&mut self, mode: AuthMode) {
        self.auth_mode = Some(mode);
    }

    pub fn enterprise_provisioning(&self) -> Option<EnterpriseProvisioning> {
        self.enterprise_provisioning
    }

    pub fn set_enterprise_provisioning(&mut self, value: EnterpriseProvisioning) {
        self.enterprise_provisioning = Some(value);
    }

    /// Prefix of names given to created provisioning profiles.
    pub fn profile_name_prefix(&self) -> &str {
        &self.profile_name_prefix
    }

    pub fn set_profile_name_prefix(&mut self, value: impl ToString) {
        self.profile_name_prefix = value.to_string();
    }
}

fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes"
    )
}
