// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Interaction with the human operator.

use {
    crate::CredentialsError,
    dialoguer::{Confirm, MultiSelect, Select},
    log::{error, info, warn},
};

/// Severity of an operator notification.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum NotifyLevel {
    Info,
    Warn,
    Error,
}

/// Asks the operator questions.
///
/// Reconciliation never calls these methods when running non-interactively.
pub trait Operator {
    fn confirm(&self, message: &str, default: bool) -> Result<bool, CredentialsError>;

    /// Pick one of `choices`, returning its index.
    fn select(
        &self,
        message: &str,
        choices: &[String],
        default: usize,
    ) -> Result<usize, CredentialsError>;

    /// Pick any number of `choices`, returning their indices.
    fn multi_select(
        &self,
        message: &str,
        choices: &[String],
        defaults: &[bool],
    ) -> Result<Vec<usize>, CredentialsError>;

    fn notify(&self, level: NotifyLevel, message: &str);
}

/// Emit a notification through the log facade.
pub fn log_notification(level: NotifyLevel, message: &str) {
    match level {
        NotifyLevel::Info => info!("{}", message),
        NotifyLevel::Warn => warn!("{}", message),
        NotifyLevel::Error => error!("{}", message),
    }
}

/// An [Operator] prompting on the terminal.
#[derive(Clone, Copy, Debug, Default)]
pub struct TerminalOperator;

impl Operator for TerminalOperator {
    fn confirm(&self, message: &str, default: bool) -> Result<bool, CredentialsError> {
        Ok(Confirm::new()
            .with_prompt(message)
            .default(default)
            .interact()?)
    }

    fn select(
        &self,
        message: &str,
        choices: &[String],
        default: usize,
    ) -> Result<usize, CredentialsError> {
        Ok(Select::new()
            .with_prompt(message)
            .items(choices)
            .default(default)
            .interact()?)
    }

    fn multi_select(
        &self,
        message: &str,
        choices: &[String],
        defaults: &[bool],
    ) -> Result<Vec<usize>, CredentialsError> {
        Ok(MultiSelect::new()
            .with_prompt(message)
            .items(choices)
            .defaults(defaults)
            .interact()?)
    }

    fn notify(&self, level: NotifyLevel, message: &str) {
        log_notification(level, message)
    }
}
