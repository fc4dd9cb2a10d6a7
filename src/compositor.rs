// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Produces a new bootable image by overlaying staged files onto a read-only
//! base image.

use std::process::Command;

use camino::{Utf8Path, Utf8PathBuf};

use crate::{
    staging::StagedTree,
    ui::Ui,
    util::{run_command_check_status, CommandError},
};

/// Where the boot menu lives inside the installer image.
pub const IMAGE_GRUB_CFG: &str = "/boot/grub/grub.cfg";
pub const IMAGE_LOOPBACK_CFG: &str = "/boot/grub/loopback.cfg";

/// Where the per-host payload tree lives inside the installer image. Must
/// agree with the seed path in the boot menu entries.
pub const IMAGE_NOCLOUD_DIR: &str = "/nocloud";

/// A local file or directory and the path at which it should appear inside
/// the produced image.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OverlayMapping {
    pub local: Utf8PathBuf,
    pub image_path: &'static str,
}

/// Everything a compositor needs to produce one image.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OverlayRequest {
    pub source: Utf8PathBuf,
    pub destination: Utf8PathBuf,
    pub mappings: Vec<OverlayMapping>,
}

impl OverlayRequest {
    /// Maps the staged boot menu files and payload tree to their fixed
    /// locations in the image.
    pub fn from_staged(
        source: &Utf8Path,
        destination: &Utf8Path,
        staged: &StagedTree,
    ) -> Self {
        let mappings = vec![
            OverlayMapping {
                local: staged.grub_cfg.clone(),
                image_path: IMAGE_GRUB_CFG,
            },
            OverlayMapping {
                local: staged.loopback_cfg.clone(),
                image_path: IMAGE_LOOPBACK_CFG,
            },
            OverlayMapping {
                local: staged.nocloud_dir.clone(),
                image_path: IMAGE_NOCLOUD_DIR,
            },
        ];

        Self {
            source: source.to_path_buf(),
            destination: destination.to_path_buf(),
            mappings,
        }
    }
}

/// Implemented by objects that can overlay files onto a base image. The base
/// image must never be modified.
pub trait Compositor {
    /// Commands this compositor launches, checked before a build starts.
    fn required_commands(&self) -> &[&'static str];

    /// Writes a new image at `request.destination`. The destination does not
    /// exist when this is called.
    fn composite(
        &self,
        request: &OverlayRequest,
        ui: &dyn Ui,
    ) -> Result<(), CommandError>;
}

/// Composites with `xorriso`, replaying the base image's boot setup so the
/// output stays bootable on both BIOS and EFI.
pub struct Xorriso {
    program: &'static str,
    required: [&'static str; 1],
}

impl Xorriso {
    pub fn new() -> Self {
        Self::with_program("xorriso")
    }

    pub fn with_program(program: &'static str) -> Self {
        Self { program, required: [program] }
    }

    fn args(request: &OverlayRequest) -> Vec<String> {
        let mut args = vec![
            "-indev".to_string(),
            request.source.to_string(),
            "-outdev".to_string(),
            request.destination.to_string(),
        ];

        for mapping in &request.mappings {
            args.push("-map".to_string());
            args.push(mapping.local.to_string());
            args.push(mapping.image_path.to_string());
        }

        args.extend(["-boot_image", "any", "replay"].map(String::from));
        args
    }
}

impl Default for Xorriso {
    fn default() -> Self {
        Self::new()
    }
}

impl Compositor for Xorriso {
    fn required_commands(&self) -> &[&'static str] {
        &self.required
    }

    fn composite(
        &self,
        request: &OverlayRequest,
        ui: &dyn Ui,
    ) -> Result<(), CommandError> {
        run_command_check_status(
            Command::new(self.program).args(Self::args(request)),
            ui,
        )
        .map(|_| ())
    }
}
