// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Renders the GRUB menu that lets an operator pick, at boot time, which
//! host's autoinstall configuration to apply.
//!
//! Each menu entry boots the installer kernel with a NoCloud data source
//! pointing at `/cdrom/nocloud/<host>/`. The staging area must therefore place
//! each host's payload at `nocloud/<host>/` inside the image.

use std::fmt::Write as _;

/// The image-internal directory under which per-host payloads live, as seen
/// by the running installer.
const NOCLOUD_SEED_ROOT: &str = "/cdrom/nocloud";
const KERNEL_PATH: &str = "/casper/vmlinuz";
const INITRD_PATH: &str = "/casper/initrd";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum MenuError {
    #[error("boot menu timeout must not be negative (got {0})")]
    NegativeTimeout(i64),

    #[error("boot menu timeout {0} is too large")]
    TimeoutTooLarge(i64),

    #[error("boot menu needs at least one host")]
    NoHosts,
}

/// One selectable installer entry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BootEntry {
    host: String,
}

impl BootEntry {
    pub fn host(&self) -> &str {
        &self.host
    }

    /// The NoCloud seed URL the installer reads this host's payload from.
    pub fn seed_path(&self) -> String {
        format!("{NOCLOUD_SEED_ROOT}/{}/", self.host)
    }

    fn render(&self, out: &mut String) {
        let _ = writeln!(out, "menuentry 'Install: {}' {{", self.host);
        let _ = writeln!(out, "    set gfxpayload=keep");
        // Quoted, or GRUB ends the command at the `;`.
        let _ = writeln!(
            out,
            "    linux   {KERNEL_PATH} autoinstall 'ds=nocloud;s={}' ---",
            self.seed_path()
        );
        let _ = writeln!(out, "    initrd  {INITRD_PATH}");
        let _ = writeln!(out, "}}");
    }
}

/// An ordered boot menu with a default selection and a countdown.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BootMenu {
    entries: Vec<BootEntry>,
    default_index: usize,
    timeout_secs: u32,
}

impl BootMenu {
    /// Builds a menu with one entry per host, in the order given.
    ///
    /// The default entry is the position of `default_host` in `hosts`, or the
    /// first entry if no default is given or it isn't one of the hosts. A
    /// timeout of zero boots the default entry without waiting.
    pub fn new<S: AsRef<str>>(
        hosts: &[S],
        timeout: i64,
        default_host: Option<&str>,
    ) -> Result<Self, MenuError> {
        if timeout < 0 {
            return Err(MenuError::NegativeTimeout(timeout));
        }

        let timeout_secs = u32::try_from(timeout)
            .map_err(|_| MenuError::TimeoutTooLarge(timeout))?;

        if hosts.is_empty() {
            return Err(MenuError::NoHosts);
        }

        let default_index = default_host
            .and_then(|default| {
                hosts.iter().position(|host| host.as_ref() == default)
            })
            .unwrap_or(0);

        let entries = hosts
            .iter()
            .map(|host| BootEntry { host: host.as_ref().to_owned() })
            .collect();

        Ok(Self { entries, default_index, timeout_secs })
    }

    pub fn entries(&self) -> &[BootEntry] {
        &self.entries
    }

    pub fn default_index(&self) -> usize {
        self.default_index
    }

    pub fn default_entry(&self) -> &BootEntry {
        &self.entries[self.default_index]
    }

    pub fn timeout_secs(&self) -> u32 {
        self.timeout_secs
    }

    /// Produces the GRUB configuration text. The output depends only on the
    /// menu's contents.
    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "set default={}", self.default_index);
        let _ = writeln!(out, "set timeout_style=menu");
        let _ = writeln!(out, "set timeout={}", self.timeout_secs);
        let _ = writeln!(out, "if [ $grub_platform = \"efi\" ]; then");
        let _ = writeln!(out, "    insmod efi_gop");
        let _ = writeln!(out, "    insmod efi_uga");
        let _ = writeln!(out, "fi");

        for entry in &self.entries {
            entry.render(&mut out);
        }

        out
    }
}
