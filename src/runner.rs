// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Structs, traits, and functions for defining and running a set of scripted
//! operations.

use std::io::{Read, Write};

use colored::Colorize;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

use crate::{
    error::BuildError,
    ui::{ProgressUi, Ui},
};

const PROGRESS_TICK_INTERVAL: std::time::Duration =
    std::time::Duration::from_millis(100);

type StepFn<C> = dyn Fn(&mut C, &dyn Ui) -> Result<(), BuildError>;

/// A step in a scripted procedure.
pub struct ScriptStep<C> {
    /// A descriptive label for this procedure step.
    label: &'static str,

    /// The function to execute to run this procedure step.
    func: Box<StepFn<C>>,

    /// A list of commands that this step expects to launch via
    /// `[std::process::Command]`. The script runner uses these to check for
    /// missing dependencies before running the script.
    prereq_commands: Vec<&'static str>,
}

impl<C> ScriptStep<C> {
    pub fn new(
        label: &'static str,
        func: impl Fn(&mut C, &dyn Ui) -> Result<(), BuildError> + 'static,
    ) -> Self {
        Self { label, func: Box::new(func), prereq_commands: Vec::new() }
    }

    pub fn with_prereqs(
        label: &'static str,
        func: impl Fn(&mut C, &dyn Ui) -> Result<(), BuildError> + 'static,
        commands: &[&'static str],
    ) -> Self {
        Self { label, func: Box::new(func), prereq_commands: commands.to_vec() }
    }

    pub fn prereq_commands(&self) -> &[&'static str] {
        self.prereq_commands.as_slice()
    }
}

/// The outcome of a script's prerequisite check. Errors prevent the script
/// from running; warnings are shown to the user but do not.
#[derive(Debug, Default)]
pub struct MissingPrerequisites {
    errors: Vec<String>,
    warnings: Vec<String>,
}

impl MissingPrerequisites {
    pub fn from_messages(errors: Vec<String>, warnings: Vec<String>) -> Self {
        Self { errors, warnings }
    }

    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }
}

/// Implemented by objects that can be used as scripts.
pub trait Script {
    /// The state threaded through each of this script's steps.
    type Context;

    /// Yields a slice of steps that can be executed to run this script.
    fn steps(&self) -> &[ScriptStep<Self::Context>];

    fn print_configuration(
        &self,
        w: &mut dyn std::io::Write,
    ) -> std::io::Result<()>;

    /// Checks everything that can be checked before any step runs. This must
    /// not modify the filesystem.
    fn check_prerequisites(&self) -> MissingPrerequisites;

    /// Yields the context the script's first step receives.
    fn initial_context(&self) -> Self::Context;
}

struct StepAndProgress<'a, C> {
    step: &'a ScriptStep<C>,
    bar: ProgressBar,
}

fn style(template: &'static str) -> ProgressStyle {
    ProgressStyle::with_template(template)
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
}

/// Runs a script, pretty-printing its various labels and the outcomes of each
/// step. Returns the script's context as left by its final step.
pub fn run_script<S: Script + ?Sized>(
    script: &S,
    interactive: bool,
) -> Result<S::Context, BuildError> {
    let mut stdout = std::io::stdout();
    script
        .print_configuration(&mut stdout)
        .and_then(|_| writeln!(stdout))
        .map_err(BuildError::Terminal)?;

    let missing = script.check_prerequisites();
    if !missing.warnings().is_empty() {
        println!("{}", "Warnings:".bold().yellow());
        for warning in missing.warnings() {
            println!("  {}", warning);
        }

        println!();
    }

    if !missing.errors().is_empty() {
        println!("{}", "Some prerequisites were not satisfied:".bold());
        for unsatisfied in missing.errors() {
            println!("  {}", unsatisfied);
        }

        println!();
        return Err(BuildError::Precondition(missing.errors));
    }

    if interactive {
        println!("Press Enter to continue or CTRL-C to cancel.");
        stdout.flush().map_err(BuildError::Terminal)?;
        std::io::stdin().read(&mut [0u8]).map_err(BuildError::Terminal)?;
    }

    let mut ctx = script.initial_context();
    let multi = interactive.then(MultiProgress::new);

    let steps_with_progress: Vec<StepAndProgress<S::Context>> = script
        .steps()
        .iter()
        .map(|step| {
            let bar = if let Some(multi) = &multi {
                multi.add(ProgressBar::new_spinner())
            } else {
                ProgressBar::new_spinner()
            };

            bar.set_message(step.label);
            bar.set_style(style("  {msg:.dim}"));
            bar.tick();
            StepAndProgress { step, bar }
        })
        .collect();

    for step in steps_with_progress {
        step.bar.set_style(ProgressStyle::default_spinner());
        step.bar.enable_steady_tick(PROGRESS_TICK_INTERVAL);
        let ui = ProgressUi::new(step.step.label, &step.bar);
        match (step.step.func)(&mut ctx, &ui) {
            Ok(()) => {
                step.bar.set_message(step.step.label);
                step.bar.set_style(style("✓ {msg:.green}"));
                step.bar.finish();
            }
            Err(e) => {
                step.bar.set_style(style("⚠ {msg:.bold.red}"));
                step.bar.finish();
                return Err(e);
            }
        }
    }

    Ok(ctx)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct CountingScript {
        steps: Vec<ScriptStep<Vec<&'static str>>>,
        errors: Vec<String>,
    }

    impl Script for CountingScript {
        type Context = Vec<&'static str>;

        fn steps(&self) -> &[ScriptStep<Self::Context>] {
            &self.steps
        }

        fn print_configuration(
            &self,
            w: &mut dyn std::io::Write,
        ) -> std::io::Result<()> {
            writeln!(w, "counting script")
        }

        fn check_prerequisites(&self) -> MissingPrerequisites {
            MissingPrerequisites::from_messages(self.errors.clone(), vec![])
        }

        fn initial_context(&self) -> Self::Context {
            Vec::new()
        }
    }

    fn steps() -> Vec<ScriptStep<Vec<&'static str>>> {
        vec![
            ScriptStep::new("one", |ctx: &mut Vec<&'static str>, _| {
                ctx.push("one");
                Ok(())
            }),
            ScriptStep::new("two", |ctx: &mut Vec<&'static str>, ui| {
                ui.set_substep("halfway");
                ctx.push("two");
                Ok(())
            }),
        ]
    }

    #[test]
    fn steps_run_in_order() {
        let script = CountingScript { steps: steps(), errors: vec![] };
        let ctx = run_script(&script, false).unwrap();
        assert_eq!(ctx, vec!["one", "two"]);
    }

    #[test]
    fn unsatisfied_prerequisites_prevent_steps() {
        let script = CountingScript {
            steps: vec![ScriptStep::new("boom", |_, _| {
                panic!("step should not run")
            })],
            errors: vec!["first".to_string(), "second".to_string()],
        };

        match run_script(&script, false) {
            Err(BuildError::Precondition(errors)) => {
                assert_eq!(errors, vec!["first", "second"])
            }
            _ => panic!("expected a precondition failure"),
        }
    }

    #[test]
    fn failing_step_stops_the_script() {
        let mut steps = steps();
        steps.insert(
            1,
            ScriptStep::new("fail", |_, _| {
                Err(BuildError::Staging(anyhow::anyhow!("no space")))
            }),
        );

        let script = CountingScript { steps, errors: vec![] };
        assert!(matches!(
            run_script(&script, false),
            Err(BuildError::Staging(_))
        ));
    }
}
