// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Reconciliation of Apple distribution signing credentials.
//!
//! Signing an iOS application for distribution requires a distribution
//! certificate (and its private key) and a provisioning profile generated for
//! that certificate. This crate keeps those credentials consistent across
//! three independent systems of record:
//!
//! * An operator-supplied `credentials.json` file (see [local_credentials]).
//! * A backend credential store persisting the credentials used for builds
//!   (see the [store::CredentialStore] trait).
//! * The Apple Developer Portal, which is the authority on whether credentials
//!   are still valid and may revoke or expire them at any time (see the
//!   [portal::DeveloperPortal] trait).
//!
//! For each requested `(app, distribution kind)` pair, [Reconciler] decides
//! whether the credentials already bound are still usable, can be repaired,
//! must be recreated, or must be left for an operator to resolve. The answer
//! depends on whether an operator is available to answer prompts. In
//! non-interactive mode (e.g. CI) nothing is created or repaired: missing or
//! invalid credentials are an error.
//!
//! Credentials are first checked locally (see [validation]): the profile
//! must embed the certificate, its application identifier must match the
//! bundle identifier, and it must not be expired. The Developer Portal is
//! consulted only after that.
//!
//! Store, enterprise (in-house) and ad hoc distribution are supported. Ad hoc
//! profiles are additionally reconciled against the set of devices registered
//! with the Apple team (see [adhoc]).
//!
//! Communicating with the Developer Portal and the backend store is the
//! responsibility of implementations of the traits in [portal] and [store].

pub mod adhoc;
pub mod app;
pub use app::{AppIdentity, AppleTeam, Device, DistributionKind, ProfileType};
pub mod certificate;
pub mod certificate_resolver;
pub mod context;
pub use context::ReconcileContext;
mod error;
pub use error::*;
pub mod local_credentials;
pub mod operator;
pub mod orchestrator;
pub use orchestrator::{Reconciler, ResolvedCredentials, TargetResult};
pub mod portal;
pub mod profile_resolver;
pub mod provisioning_profile;
pub mod settings;
pub use settings::ReconcileSettings;
pub mod store;
#[cfg(test)]
mod testutil;
pub mod validation;
