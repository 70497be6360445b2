// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Identities of the things we are provisioning credentials for. */

use {
    crate::CredentialsError,
    serde::{Deserialize, Serialize},
    std::{
        fmt::{Display, Formatter},
        str::FromStr,
    },
};

/// Identifies the application target credentials are being provisioned for.
///
/// Instances are constructed once per command invocation and are not mutated
/// afterwards.
#[derive(Clone, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AppIdentity {
    /// Account owning the project.
    pub account: String,

    /// Name of the project within the account.
    pub project_name: String,

    /// Bundle identifier of the target, e.g. `com.acme.app`.
    pub bundle_identifier: String,

    /// Bundle identifier of the containing application, for app extensions.
    pub parent_bundle_identifier: Option<String>,
}

impl AppIdentity {
    pub fn new(
        account: impl ToString,
        project_name: impl ToString,
        bundle_identifier: impl ToString,
    ) -> Self {
        Self {
            account: account.to_string(),
            project_name: project_name.to_string(),
            bundle_identifier: bundle_identifier.to_string(),
            parent_bundle_identifier: None,
        }
    }

    /// Mark this identity as an extension of another bundle.
    pub fn with_parent_bundle_identifier(mut self, parent: impl ToString) -> Self {
        self.parent_bundle_identifier = Some(parent.to_string());
        self
    }
}

impl Display for AppIdentity {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} (@{}/{})",
            self.bundle_identifier, self.account, self.project_name
        )
    }
}

/// How an application binary is allowed to be installed.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DistributionKind {
    /// Distribution through App Store review.
    Store,
    /// Distribution to anyone in an enterprise organization.
    Enterprise,
    /// Distribution to an explicit list of registered devices.
    Adhoc,
}

impl DistributionKind {
    pub fn all() -> &'static [Self] {
        &[Self::Store, Self::Enterprise, Self::Adhoc]
    }

    /// The provisioning profile type Apple issues for this distribution kind.
    pub fn profile_type(&self) -> ProfileType {
        match self {
            Self::Store => ProfileType::AppStore,
            Self::Enterprise => ProfileType::InHouse,
            Self::Adhoc => ProfileType::AdHoc,
        }
    }
}

impl Display for DistributionKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Store => f.write_str("store"),
            Self::Enterprise => f.write_str("enterprise"),
            Self::Adhoc => f.write_str("adhoc"),
        }
    }
}

impl FromStr for DistributionKind {
    type Err = CredentialsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "store" | "app-store" => Ok(Self::Store),
            "enterprise" | "in-house" => Ok(Self::Enterprise),
            "adhoc" | "ad-hoc" | "internal" => Ok(Self::Adhoc),
            _ => Err(CredentialsError::CliGeneralError(format!(
                "unknown distribution kind: {}",
                s
            ))),
        }
    }
}

/// Provisioning profile types as known to the Apple Developer Portal.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProfileType {
    AppStore,
    InHouse,
    AdHoc,
}

impl Display for ProfileType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AppStore => f.write_str("app-store"),
            Self::InHouse => f.write_str("in-house"),
            Self::AdHoc => f.write_str("ad-hoc"),
        }
    }
}

/// An Apple Developer team.
///
/// Certificates and profiles are always scoped to a team.
#[derive(Clone, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AppleTeam {
    /// The team identifier, e.g. `ABCDE12345`.
    pub identifier: String,

    pub name: Option<String>,

    /// Whether the team belongs to the Apple Developer Enterprise Program.
    #[serde(default)]
    pub is_enterprise_capable: bool,
}

impl AppleTeam {
    pub fn new(identifier: impl ToString) -> Self {
        Self {
            identifier: identifier.to_string(),
            name: None,
            is_enterprise_capable: false,
        }
    }

    pub fn with_name(mut self, name: impl ToString) -> Self {
        self.name = Some(name.to_string());
        self
    }

    pub fn enterprise(mut self) -> Self {
        self.is_enterprise_capable = true;
        self
    }
}

impl Display for AppleTeam {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match &self.name {
            Some(name) => write!(f, "{} ({})", self.identifier, name),
            None => f.write_str(&self.identifier),
        }
    }
}

/// A device registered with an Apple team.
#[derive(Clone, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Device {
    /// The device UDID.
    pub identifier: String,

    #[serde(default)]
    pub display_name: String,
}

impl Device {
    pub fn new(identifier: impl ToString, display_name: impl ToString) -> Self {
        Self {
            identifier: identifier.to_string(),
            display_name: display_name.to_string(),
        }
    }
}

impl Display for Device {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if self.display_name.is_empty() {
            f.write_str(&self.identifier)
        } else {
            write!(f, "{} ({})", self.identifier, self.display_name)
        }
    }
}
