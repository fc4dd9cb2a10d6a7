// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The error taxonomy for multi-host ISO builds.

use camino::Utf8PathBuf;

use crate::{build_multi_iso::BuildPhase, util::CommandError};

/// Exit code reported when a build is rejected because of bad input.
pub const PRECONDITION_EXIT_CODE: u8 = 2;

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    /// One or more checks failed before anything was written. Every failed
    /// check is listed.
    #[error("{} prerequisite(s) not satisfied:\n  {}", .0.len(), .0.join("\n  "))]
    Precondition(Vec<String>),

    #[error("writing to the terminal")]
    Terminal(#[source] std::io::Error),

    #[error("staging host payloads")]
    Staging(#[source] anyhow::Error),

    #[error("image mastering failed")]
    Mastering(#[source] CommandError),

    #[error("preparing output directory")]
    Output(#[source] anyhow::Error),

    /// The mastering tool claimed success but left nothing at the destination.
    #[error("mastering tool exited successfully but produced no image at {0}")]
    MissingOutput(Utf8PathBuf),

    #[error("removing working directory")]
    Cleanup(#[source] anyhow::Error),

    /// The image was produced, but its manifest or summary could not be
    /// written. The image itself is still valid.
    #[error("image was produced but its manifest or summary is stale")]
    Recording(#[source] anyhow::Error),
}

impl BuildError {
    pub fn precondition(message: impl Into<String>) -> Self {
        Self::Precondition(vec![message.into()])
    }

    /// The phase of the build in which this error arose.
    pub fn phase(&self) -> BuildPhase {
        match self {
            BuildError::Precondition(_) | BuildError::Terminal(_) => {
                BuildPhase::Validating
            }
            BuildError::Staging(_) => BuildPhase::Staging,
            BuildError::Output(_)
            | BuildError::Mastering(_)
            | BuildError::MissingOutput(_)
            | BuildError::Cleanup(_) => BuildPhase::Compositing,
            BuildError::Recording(_) => BuildPhase::Recording,
        }
    }

    /// The process exit code callers should see for this error. Mastering
    /// failures surface the tool's own exit code when there is a usable one.
    pub fn exit_code(&self) -> u8 {
        match self {
            BuildError::Precondition(_) => PRECONDITION_EXIT_CODE,
            BuildError::Mastering(e) => e
                .exit_code()
                .and_then(|code| u8::try_from(code).ok())
                .filter(|code| *code != 0)
                .unwrap_or(1),
            BuildError::Terminal(_)
            | BuildError::Staging(_)
            | BuildError::Output(_)
            | BuildError::MissingOutput(_)
            | BuildError::Cleanup(_)
            | BuildError::Recording(_) => 1,
        }
    }
}
