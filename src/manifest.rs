// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The manifest and human-readable summary written next to each produced
//! image.

use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

pub const MANIFEST_FILE: &str = "manifest.json";
pub const SUMMARY_FILE: &str = "SUMMARY.txt";

/// Provenance of one produced multi-host image.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub name: String,
    pub hosts: Vec<String>,
    pub default_host: String,
    pub ubuntu_iso: Utf8PathBuf,
    pub created_at: String,
}

/// Formats `when` as a UTC ISO-8601 timestamp with second precision, e.g.
/// `2024-05-01T12:34:56Z`.
pub fn utc_timestamp(when: OffsetDateTime) -> String {
    let when = when.to_offset(time::UtcOffset::UTC);
    format!(
        "{:04}-{:02}-{:02}T{:02}:{:02}:{:02}Z",
        when.year(),
        when.month() as u8,
        when.day(),
        when.hour(),
        when.minute(),
        when.second()
    )
}

impl Manifest {
    pub fn summary(&self, source_display: &Utf8Path) -> String {
        [
            format!("Multi-host ISO '{}'", self.name),
            format!("Hosts: {}", self.hosts.join(", ")),
            format!("Default boot entry: {}", self.default_host),
            format!("Ubuntu ISO source: {}", source_display),
            format!("Generated at: {}", self.created_at),
            String::new(),
            "Flash the ISO with `dd` or `ventoy` and pick the GRUB entry \
             matching the target host."
                .to_string(),
        ]
        .join("\n")
    }

    /// Writes `manifest.json` and `SUMMARY.txt` into `dir`, replacing any
    /// left by an earlier build.
    pub fn write(&self, dir: &Utf8Path, source_display: &Utf8Path) -> Result<()> {
        let manifest_path = dir.join(MANIFEST_FILE);
        let json = serde_json::to_string_pretty(self)
            .context("serializing manifest")?;
        std::fs::write(&manifest_path, json)
            .with_context(|| format!("writing {manifest_path}"))?;

        let summary_path = dir.join(SUMMARY_FILE);
        std::fs::write(&summary_path, self.summary(source_display))
            .with_context(|| format!("writing {summary_path}"))?;

        Ok(())
    }

    #[cfg(test)]
    pub fn read(dir: &Utf8Path) -> Result<Self> {
        let path = dir.join(MANIFEST_FILE);
        let json = std::fs::read_to_string(&path)
            .with_context(|| format!("reading {path}"))?;
        serde_json::from_str(&json).with_context(|| format!("parsing {path}"))
    }
}
