// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Defines a script for assembling a single Ubuntu autoinstall ISO that
//! carries the NoCloud payloads of several hosts and a GRUB menu to choose
//! between them at boot.
//!
//! A build moves through these phases:
//!
//! - Validating: every input is checked and every problem is reported. Nothing
//!   is written during this phase.
//! - Staging: payloads are copied into a fresh working directory along with
//!   the rendered boot menu.
//! - Compositing: the staged files are overlaid onto a copy of the base ISO,
//!   replacing any image left by an earlier build of the same name.
//! - Recording: a manifest and summary are written beside the image.
//!
//! The working directory is removed on every exit path.

use std::{fmt, rc::Rc};

use anyhow::Context as _;
use camino::{Utf8Path, Utf8PathBuf};
use colored::Colorize;
use itertools::Itertools;
use time::OffsetDateTime;

use crate::{
    bootmenu::{BootMenu, MenuError},
    compositor::{Compositor, OverlayRequest},
    error::BuildError,
    manifest::{utc_timestamp, Manifest},
    payload::{identical_payload_groups, PayloadStore},
    runner::{MissingPrerequisites, Script, ScriptStep},
    staging::{StagedTree, StagingArea},
    ui::Ui,
    util::{check_executable_prerequisites, check_file_prerequisites},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BuildPhase {
    Validating,
    Staging,
    Compositing,
    Recording,
}

impl fmt::Display for BuildPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BuildPhase::Validating => "validating",
            BuildPhase::Staging => "staging",
            BuildPhase::Compositing => "compositing",
            BuildPhase::Recording => "recording",
        })
    }
}

/// The directories a build reads from and writes to.
#[derive(Clone, Debug)]
pub struct BuildConfig {
    /// Holds one rendered payload directory per host.
    pub generated_root: Utf8PathBuf,

    /// Holds one directory per artifact name.
    pub output_root: Utf8PathBuf,

    /// Parent of each build's working directory.
    pub tmp_root: Utf8PathBuf,
}

impl BuildConfig {
    pub fn artifact_dir(&self, name: &str) -> Utf8PathBuf {
        self.output_root.join(name)
    }

    pub fn output_image(&self, name: &str) -> Utf8PathBuf {
        self.artifact_dir(name)
            .join(format!("ubuntu-autoinstall-{name}.iso"))
    }
}

#[derive(Clone, Debug)]
pub struct BuildRequest {
    pub ubuntu_iso: Utf8PathBuf,
    pub name: String,
    pub hosts: Vec<String>,
    pub default_host: Option<String>,
    pub timeout: i64,
}

impl BuildRequest {
    /// The host whose entry is selected when the menu times out.
    pub fn effective_default_host(&self) -> Option<&str> {
        self.default_host.as_deref().or(self.hosts.first().map(String::as_str))
    }
}

/// Returns why `name` can't be used as a single path component, if it can't.
fn path_component_problem(name: &str) -> Option<&'static str> {
    if name.is_empty() {
        Some("is empty")
    } else if name == "." || name == ".." {
        Some("is a relative directory reference")
    } else if name.contains('/') {
        Some("contains '/'")
    } else {
        None
    }
}

/// Characters GRUB script treats as syntax.
const GRUB_METACHARACTERS: [char; 10] =
    [';', '$', '{', '}', '|', '&', '<', '>', '`', '#'];

/// Returns why `host` can't appear in a payload path and a quoted menu title,
/// if it can't.
fn host_name_problem(host: &str) -> Option<&'static str> {
    path_component_problem(host).or_else(|| {
        if host.chars().any(char::is_whitespace) {
            Some("contains whitespace")
        } else if host.contains(['\'', '"', '\\']) {
            Some("contains a quote or backslash")
        } else if host.contains(GRUB_METACHARACTERS) {
            Some("contains a character GRUB treats as script syntax")
        } else {
            None
        }
    })
}

/// The state threaded through the build steps.
pub struct BuildContext {
    request: BuildRequest,
    config: BuildConfig,
    compositor: Rc<dyn Compositor>,
    staging: Option<StagingArea>,
    staged: Option<StagedTree>,
    output_image: Option<Utf8PathBuf>,
}

impl BuildContext {
    pub fn output_image(&self) -> Option<&Utf8Path> {
        self.output_image.as_deref()
    }
}

pub struct BuildMultiIsoScript {
    steps: Vec<ScriptStep<BuildContext>>,
    request: BuildRequest,
    config: BuildConfig,
    compositor: Rc<dyn Compositor>,
}

impl BuildMultiIsoScript {
    pub fn new(
        request: BuildRequest,
        config: BuildConfig,
        compositor: Rc<dyn Compositor>,
    ) -> Self {
        let steps = get_script(compositor.as_ref());
        Self { steps, request, config, compositor }
    }

    fn validation_errors(&self) -> Vec<String> {
        let request = &self.request;
        let mut errors = check_file_prerequisites(&[&request.ubuntu_iso]);

        if let Some(problem) = path_component_problem(&request.name) {
            errors.push(format!("artifact name '{}' {problem}", request.name));
        }

        if request.hosts.is_empty() {
            errors.push("at least one host must be provided".to_string());
        }

        match BootMenu::new(&request.hosts, request.timeout, None) {
            Ok(_) | Err(MenuError::NoHosts) => {}
            Err(e) => errors.push(e.to_string()),
        }

        for host in request.hosts.iter().duplicates() {
            errors.push(format!("host '{host}' is listed more than once"));
        }

        let mut checkable = Vec::new();
        for host in request.hosts.iter().unique() {
            match host_name_problem(host) {
                Some(problem) => {
                    errors.push(format!("host name '{host}' {problem}"))
                }
                None => checkable.push(host.as_str()),
            }
        }

        if let Some(default) = &request.default_host {
            if !request.hosts.contains(default) {
                errors.push(format!(
                    "default host '{default}' is not part of the ISO host list"
                ));
            }
        }

        if let Err(missing) = self.store().resolve_all(&checkable) {
            errors.extend(missing.iter().map(ToString::to_string));
        }

        errors.extend(check_executable_prerequisites(self.steps()));
        errors
    }

    fn validation_warnings(&self) -> Vec<String> {
        let hosts: Vec<&str> = self
            .request
            .hosts
            .iter()
            .unique()
            .filter(|host| host_name_problem(host).is_none())
            .map(String::as_str)
            .collect();

        let Ok(payloads) = self.store().resolve_all(&hosts) else {
            return Vec::new();
        };

        match identical_payload_groups(&payloads) {
            Ok(groups) => groups
                .into_iter()
                .map(|group| {
                    format!(
                        "hosts {} have byte-identical payloads",
                        group.iter().map(|h| format!("'{h}'")).join(", ")
                    )
                })
                .collect(),
            Err(e) => vec![format!("could not compare host payloads: {e:#}")],
        }
    }

    fn store(&self) -> PayloadStore {
        PayloadStore::new(&self.config.generated_root)
    }
}

impl Script for BuildMultiIsoScript {
    type Context = BuildContext;

    fn steps(&self) -> &[ScriptStep<BuildContext>] {
        self.steps.as_slice()
    }

    fn print_configuration(
        &self,
        w: &mut dyn std::io::Write,
    ) -> std::io::Result<()> {
        writeln!(
            w,
            "Creating a multi-host autoinstall ISO with these options:\n"
        )?;

        let request = &self.request;
        let config = &self.config;
        writeln!(w, "  {}: {}", "Ubuntu ISO".bold(), request.ubuntu_iso)?;
        writeln!(w, "  {}: {}", "Artifact name".bold(), request.name)?;
        writeln!(w, "  {}: {}", "Hosts".bold(), request.hosts.join(", "))?;

        // Invalid input is reported by the prerequisite check that follows.
        if let Ok(menu) = BootMenu::new(
            &request.hosts,
            request.timeout,
            request.default_host.as_deref(),
        ) {
            writeln!(
                w,
                "  {}: {} (entry {})",
                "Default boot entry".bold(),
                menu.default_entry().host(),
                menu.default_index() + 1
            )?;

            if menu.timeout_secs() == 0 {
                writeln!(w, "  Menu timeout: none, boots the default entry immediately")?;
            } else {
                writeln!(w, "  Menu timeout: {} seconds", menu.timeout_secs())?;
            }
        }

        writeln!(w)?;
        writeln!(w, "  {}: {}", "Payload root".bold(), config.generated_root)?;
        writeln!(w, "  {}: {}", "Temporary root".bold(), config.tmp_root)?;
        writeln!(
            w,
            "  {}: {}",
            "Output file".bold(),
            config.output_image(&request.name)
        )?;

        Ok(())
    }

    fn check_prerequisites(&self) -> MissingPrerequisites {
        let errors = self.validation_errors();
        let warnings = if errors.is_empty() {
            self.validation_warnings()
        } else {
            Vec::new()
        };

        MissingPrerequisites::from_messages(errors, warnings)
    }

    fn initial_context(&self) -> BuildContext {
        BuildContext {
            request: self.request.clone(),
            config: self.config.clone(),
            compositor: Rc::clone(&self.compositor),
            staging: None,
            staged: None,
            output_image: None,
        }
    }
}

fn stage_payloads(ctx: &mut BuildContext, ui: &dyn Ui) -> Result<(), BuildError> {
    let request = &ctx.request;
    let menu = BootMenu::new(
        &request.hosts,
        request.timeout,
        request.default_host.as_deref(),
    )
    .map_err(|e| BuildError::precondition(e.to_string()))?;

    ui.set_substep("creating working directory");
    let staging =
        StagingArea::create(&ctx.config.tmp_root).map_err(BuildError::Staging)?;

    ui.set_substep(&format!("staging into {}", staging.path()));
    let store = PayloadStore::new(&ctx.config.generated_root);
    let staged =
        staging.stage(&store, &menu, ui).map_err(BuildError::Staging)?;

    ctx.staging = Some(staging);
    ctx.staged = Some(staged);
    Ok(())
}

fn remove_previous_image(image: &Utf8Path) -> anyhow::Result<()> {
    match std::fs::remove_file(image) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e).with_context(|| format!("removing previous image {image}")),
    }
}

fn composite_image(ctx: &mut BuildContext, ui: &dyn Ui) -> Result<(), BuildError> {
    let staged = ctx.staged.as_ref().ok_or_else(|| {
        BuildError::Staging(anyhow::anyhow!("no staged payloads to composite"))
    })?;

    let name = &ctx.request.name;
    let artifact_dir = ctx.config.artifact_dir(name);
    let output_image = ctx.config.output_image(name);

    std::fs::create_dir_all(&artifact_dir)
        .with_context(|| format!("creating {artifact_dir}"))
        .map_err(BuildError::Output)?;

    ui.set_substep("removing previous image");
    remove_previous_image(&output_image).map_err(BuildError::Output)?;

    let request =
        OverlayRequest::from_staged(&ctx.request.ubuntu_iso, &output_image, staged);
    ctx.compositor
        .composite(&request, ui)
        .map_err(BuildError::Mastering)?;

    if !output_image.is_file() {
        return Err(BuildError::MissingOutput(output_image));
    }

    ctx.output_image = Some(output_image);
    Ok(())
}

fn discard_working_directory(
    ctx: &mut BuildContext,
    _ui: &dyn Ui,
) -> Result<(), BuildError> {
    ctx.staged = None;
    match ctx.staging.take() {
        Some(staging) => staging.close().map_err(BuildError::Cleanup),
        None => Ok(()),
    }
}

fn record_manifest(ctx: &mut BuildContext, ui: &dyn Ui) -> Result<(), BuildError> {
    let request = &ctx.request;
    let ubuntu_iso = request
        .ubuntu_iso
        .canonicalize_utf8()
        .with_context(|| format!("resolving {}", request.ubuntu_iso))
        .map_err(BuildError::Recording)?;

    let manifest = Manifest {
        name: request.name.clone(),
        hosts: request.hosts.clone(),
        default_host: request
            .effective_default_host()
            .unwrap_or_default()
            .to_owned(),
        ubuntu_iso,
        created_at: utc_timestamp(OffsetDateTime::now_utc()),
    };

    ui.set_substep("writing manifest.json and SUMMARY.txt");
    manifest
        .write(&ctx.config.artifact_dir(&request.name), &request.ubuntu_iso)
        .map_err(BuildError::Recording)
}

fn get_script(compositor: &dyn Compositor) -> Vec<ScriptStep<BuildContext>> {
    vec![
        ScriptStep::new("stage host payloads and boot menu", stage_payloads),
        ScriptStep::with_prereqs(
            "composite multi-host image",
            composite_image,
            compositor.required_commands(),
        ),
        ScriptStep::new("discard working directory", discard_working_directory),
        ScriptStep::new("record manifest and summary", record_manifest),
    ]
}

/// Runs a complete build and returns the path of the produced image.
pub fn build_multi_iso(
    request: BuildRequest,
    config: BuildConfig,
    compositor: Rc<dyn Compositor>,
    interactive: bool,
) -> Result<Utf8PathBuf, BuildError> {
    let fallback = config.output_image(&request.name);
    let script = BuildMultiIsoScript::new(request, config, compositor);
    let ctx = crate::runner::run_script(&script, interactive)?;
    ctx.output_image()
        .map(Utf8Path::to_path_buf)
        .ok_or(BuildError::MissingOutput(fallback))
}
