// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Utility functions shared by the build steps.

use std::process::{Command, Output};

use camino::Utf8Path;
use itertools::Itertools;

use crate::{runner::ScriptStep, ui::Ui};

/// Describes why an external command did not complete successfully.
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("failed to launch '{program}'")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("'{program}' returned non-success exit code {}: {stderr}",
        .code.map(|c| c.to_string()).unwrap_or_else(|| "(terminated by signal)".to_string()))]
    Failed { program: String, code: Option<i32>, stderr: String },
}

impl CommandError {
    /// The exit code of the failed command, if it exited normally.
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            CommandError::Spawn { .. } => None,
            CommandError::Failed { code, .. } => *code,
        }
    }
}

/// Runs a `Command` and returns its output. Returns `Err` if the command could
/// not be started or its exit status indicates that it failed.
pub fn run_command_check_status(
    cmd: &mut Command,
    ui: &dyn Ui,
) -> Result<Output, CommandError> {
    let program = cmd.get_program().to_string_lossy().into_owned();
    ui.set_substep(&format!("executing: {:?}", cmd));
    let output = cmd
        .output()
        .map_err(|source| CommandError::Spawn { program: program.clone(), source })?;

    if !output.status.success() {
        return Err(CommandError::Failed {
            program,
            code: output.status.code(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_owned(),
        });
    }

    Ok(output)
}

/// Returns a message for each of `files` that does not exist as a regular
/// file.
pub fn check_file_prerequisites<P: AsRef<Utf8Path>>(files: &[P]) -> Vec<String> {
    files
        .iter()
        .map(AsRef::as_ref)
        .filter(|file| !file.is_file())
        .map(|file| format!("file not found: {file}"))
        .collect()
}

/// Returns a message for each distinct command the supplied `steps` launch
/// that cannot be found on the `PATH`.
pub fn check_executable_prerequisites<C>(steps: &[ScriptStep<C>]) -> Vec<String> {
    steps
        .iter()
        .flat_map(|step| step.prereq_commands())
        .unique()
        .filter(|command| which::which(command).is_err())
        .map(|command| format!("required command not found in PATH: {command}"))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{runner::ScriptStep, ui::SilentUi};

    #[test]
    fn failed_command_reports_exit_code() {
        let err = run_command_check_status(
            Command::new("sh").args(["-c", "echo oops >&2; exit 3"]),
            &SilentUi,
        )
        .unwrap_err();

        assert_eq!(err.exit_code(), Some(3));
        assert!(err.to_string().contains("oops"));
    }

    #[test]
    fn missing_program_is_a_spawn_error() {
        let err = run_command_check_status(
            &mut Command::new("definitely_not_a_real_command_12345"),
            &SilentUi,
        )
        .unwrap_err();

        assert!(matches!(err, CommandError::Spawn { .. }));
        assert_eq!(err.exit_code(), None);
    }

    #[test]
    fn missing_files_are_each_reported() {
        let temp = tempfile::TempDir::new().unwrap();
        let root = Utf8Path::from_path(temp.path()).unwrap();
        let present = root.join("present.iso");
        std::fs::write(&present, b"iso").unwrap();

        let missing = check_file_prerequisites(&[
            present,
            root.join("a.iso"),
            root.to_path_buf(),
        ]);

        assert_eq!(missing.len(), 2);
        assert!(missing[0].ends_with("a.iso"));
    }

    #[test]
    fn missing_executables_are_reported_once() {
        let steps: Vec<ScriptStep<()>> = vec![
            ScriptStep::with_prereqs(
                "first",
                |_, _| Ok(()),
                &["sh", "definitely_not_a_real_command_12345"],
            ),
            ScriptStep::with_prereqs(
                "second",
                |_, _| Ok(()),
                &["definitely_not_a_real_command_12345"],
            ),
        ];

        let missing = check_executable_prerequisites(&steps);
        assert_eq!(missing.len(), 1);
        assert!(missing[0].contains("definitely_not_a_real_command_12345"));
    }
}
