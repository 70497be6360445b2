// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use {crate::app::DistributionKind, thiserror::Error};

/// Unified error type for signing credentials reconciliation.
#[derive(Debug, Error)]
pub enum CredentialsError {
    #[error("unknown command")]
    CliUnknownCommand,

    #[error("bad argument")]
    CliBadArgument,

    #[error("{0}")]
    CliGeneralError(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    SerdeJson(#[from] serde_json::Error),

    #[error("error parsing plist: {0}")]
    Plist(#[from] plist::Error),

    #[error("missing credentials: {0}")]
    MissingCredentials(String),

    #[error("missing credentials: {0}; rerun interactively or provision credentials before running in non-interactive mode")]
    MissingCredentialsNonInteractive(String),

    #[error("{0} requires App Store Connect API key authentication when running in non-interactive mode")]
    InsufficientAuthentication(String),

    #[error("credentials are frozen; refusing to {0}")]
    ForbidCredentialModification(String),

    #[error("unable to resolve the Apple team: {0}")]
    AppleTeamUnresolved(String),

    #[error("malformed provisioning profile: {0}")]
    MalformedProfile(String),

    #[error("malformed certificate key material: {0}")]
    MalformedKeyMaterial(String),

    #[error("incorrect password given when decrypting PFX data")]
    PfxBadPassword,

    #[error("Apple Developer Portal error: {0}")]
    Portal(String),

    #[error("maximum number of distribution certificates reached: {0}")]
    TooManyCertificates(String),

    #[error("credential store error: {0}")]
    Store(String),

    #[error("attempted to prompt the operator in non-interactive mode: {0}")]
    OperatorUnavailable(String),

    #[error("aborted by operator: {0}")]
    OperatorAborted(String),

    #[error("devices were not provisioned in the ad hoc profile: {}", .0.join(", "))]
    AdhocDevicesNotProvisioned(Vec<String>),

    #[error("{0} provisioning profiles are not supported here")]
    UnsupportedDistributionKind(DistributionKind),

    #[error("invalid local credentials: {0}")]
    InvalidLocalCredentials(String),

    #[error("credentials for {bundle_identifier} are being reconciled twice for {kind}")]
    DuplicateTarget {
        bundle_identifier: String,
        kind: DistributionKind,
    },

    #[error("{kind} credentials for {bundle_identifier} (@{account}/{project}): {source}")]
    Target {
        account: String,
        project: String,
        bundle_identifier: String,
        kind: DistributionKind,
        #[source]
        source: Box<CredentialsError>,
    },
}

impl CredentialsError {
    /// Construct a missing credentials error appropriate for the interaction mode.
    pub fn missing(non_interactive: bool, message: impl ToString) -> Self {
        if non_interactive {
            Self::MissingCredentialsNonInteractive(message.to_string())
        } else {
            Self::MissingCredentials(message.to_string())
        }
    }

    /// Whether this error (or the error it wraps) signals missing credentials.
    pub fn is_missing_credentials(&self) -> bool {
        match self {
            Self::MissingCredentials(_) | Self::MissingCredentialsNonInteractive(_) => true,
            Self::Target { source, .. } => source.is_missing_credentials(),
            _ => false,
        }
    }

    /// Obtain the innermost error, unwrapping [Self::Target].
    pub fn root(&self) -> &Self {
        match self {
            Self::Target { source, .. } => source.root(),
            _ => self,
        }
    }
}
