// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Progress reporting handed to each script step.

use indicatif::ProgressBar;

/// Implemented by objects that can show a running step's progress.
pub trait Ui {
    /// Describes the piece of work the current step is doing right now.
    fn set_substep(&self, substep: &str);
}

/// Reports substeps on a step's spinner, prefixed with the step's label.
pub struct ProgressUi<'a> {
    label: &'static str,
    bar: &'a ProgressBar,
}

impl<'a> ProgressUi<'a> {
    pub fn new(label: &'static str, bar: &'a ProgressBar) -> Self {
        Self { label, bar }
    }
}

impl Ui for ProgressUi<'_> {
    fn set_substep(&self, substep: &str) {
        self.bar.set_message(format!("{}: {}", self.label, substep));
    }
}

/// Discards all progress messages.
#[cfg(test)]
pub struct SilentUi;

#[cfg(test)]
impl Ui for SilentUi {
    fn set_substep(&self, _substep: &str) {}
}
