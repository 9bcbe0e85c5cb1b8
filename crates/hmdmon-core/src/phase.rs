//! Phase of the supervised app, read and set over its control socket

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Scene the supervised app is currently showing.
///
/// The wire format is the bare variant name, both when querying and when
/// switching the phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AppPhase {
    /// Idle scene shown between sessions.
    Onboarding,
    /// Transition out of the idle scene into the session.
    Windup,
}

impl fmt::Display for AppPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let token = match self {
            AppPhase::Onboarding => "Onboarding",
            AppPhase::Windup => "Windup",
        };
        f.write_str(token)
    }
}

impl FromStr for AppPhase {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Onboarding" => Ok(AppPhase::Onboarding),
            "Windup" => Ok(AppPhase::Windup),
            other => Err(Error::protocol(format!("unknown app phase {:?}", other))),
        }
    }
}
