// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};

use crate::build_multi_iso::{BuildConfig, BuildRequest};

#[derive(Parser)]
#[command(version, about)]
pub struct App {
    /// Forces the tool to run in an interactive or non-interactive mode. If not
    /// set, the tool infers whether to run interactively from whether it is
    /// running in an interactive terminal.
    #[arg(long, global = true)]
    pub interactive: Option<bool>,

    #[command(flatten)]
    pub roots: Roots,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Builds a single Ubuntu autoinstall ISO containing the NoCloud payloads
    /// of several hosts and a GRUB menu to pick one of them at boot.
    BuildMultiIso {
        #[command(flatten)]
        args: BuildArgs,
    },

    /// Lists the hosts whose rendered payloads are complete and can be
    /// included in an ISO.
    ListHosts,
}

#[derive(Args, Clone, Debug)]
pub struct Roots {
    /// The directory containing one rendered payload directory per host. Each
    /// host directory must contain non-empty `user-data` and `meta-data`
    /// files.
    #[arg(long, global = true, default_value = "baremetal/autoinstall/generated")]
    pub generated_root: Utf8PathBuf,

    /// The directory in which to create one output directory per artifact
    /// name. Defaults to `_multi` under the generated root.
    #[arg(long, global = true)]
    pub output_root: Option<Utf8PathBuf>,

    /// The directory in which to create each build's temporary working
    /// directory.
    #[arg(long, global = true, env = "TMPDIR", default_value = ".cache/tmp")]
    pub tmp_dir: Utf8PathBuf,
}

impl Roots {
    pub fn build_config(&self) -> BuildConfig {
        BuildConfig {
            generated_root: self.generated_root.clone(),
            output_root: self
                .output_root
                .clone()
                .unwrap_or_else(|| self.generated_root.join("_multi")),
            tmp_root: self.tmp_dir.clone(),
        }
    }
}

#[derive(Args, Clone, Debug)]
pub struct BuildArgs {
    /// The path to the official Ubuntu live-server ISO to use as the base
    /// image. This file is never modified.
    #[arg(long)]
    pub ubuntu_iso: Utf8PathBuf,

    /// The name of the generated artifact. This names the output directory and
    /// the ISO file; an existing artifact with the same name is replaced.
    #[arg(long)]
    pub name: String,

    /// A host to include. Repeat to include several hosts; menu entries appear
    /// in the order given.
    #[arg(long = "host", value_name = "HOST", required = true)]
    pub hosts: Vec<String>,

    /// The number of seconds the GRUB menu waits before booting the default
    /// entry. Zero boots it immediately.
    #[arg(long, default_value_t = 10, allow_negative_numbers = true)]
    pub timeout: i64,

    /// The host whose entry is selected by default. Must be one of the hosts
    /// passed with --host. Defaults to the first host.
    #[arg(long)]
    pub default_host: Option<String>,
}

impl BuildArgs {
    pub fn request(&self) -> BuildRequest {
        BuildRequest {
            ubuntu_iso: self.ubuntu_iso.clone(),
            name: self.name.clone(),
            hosts: self.hosts.clone(),
            default_host: self.default_host.clone(),
            timeout: self.timeout,
        }
    }
}
