// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Locates the rendered NoCloud payloads (`user-data` and `meta-data`) for
//! each host under the generated-artifacts root.

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use camino::Utf8PathBuf;
use itertools::Itertools;
use sha2::{Digest, Sha256};

pub const USER_DATA: &str = "user-data";
pub const META_DATA: &str = "meta-data";

/// The files every host payload must contain.
pub const PAYLOAD_FILES: &[&str] = &[USER_DATA, META_DATA];

/// A host's complete payload: both files present and non-empty.
#[derive(Clone, Debug)]
pub struct HostPayload {
    host: String,
    dir: Utf8PathBuf,
}

impl HostPayload {
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Yields `(file name, path)` for each payload file.
    pub fn files(&self) -> impl Iterator<Item = (&'static str, Utf8PathBuf)> + '_ {
        PAYLOAD_FILES.iter().map(move |name| (*name, self.dir.join(name)))
    }

    fn digest(&self) -> Result<[u8; 32]> {
        let mut hasher = Sha256::new();
        for (name, path) in self.files() {
            let contents = std::fs::read(&path)
                .with_context(|| format!("reading {path}"))?;
            hasher.update(name.as_bytes());
            hasher.update((contents.len() as u64).to_le_bytes());
            hasher.update(&contents);
        }

        Ok(hasher.finalize().into())
    }
}

/// A host's payload file that is absent or empty.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MissingPayloadFile {
    pub host: String,
    pub file: &'static str,
    pub path: Utf8PathBuf,
    pub empty: bool,
}

impl std::fmt::Display for MissingPayloadFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.empty {
            write!(f, "host '{}' has an empty {} ({})", self.host, self.file, self.path)
        } else {
            write!(f, "host '{}' is missing {} ({})", self.host, self.file, self.path)
        }
    }
}

/// The directory tree holding one rendered payload directory per host.
#[derive(Clone, Debug)]
pub struct PayloadStore {
    root: Utf8PathBuf,
}

impl PayloadStore {
    pub fn new(root: impl Into<Utf8PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn host_dir(&self, host: &str) -> Utf8PathBuf {
        self.root.join(host)
    }

    fn missing_files(&self, host: &str) -> Vec<MissingPayloadFile> {
        let dir = self.host_dir(host);
        PAYLOAD_FILES
            .iter()
            .filter_map(|file| {
                let path = dir.join(file);
                let empty = match std::fs::metadata(&path) {
                    Ok(meta) if meta.is_file() && meta.len() > 0 => return None,
                    Ok(meta) => meta.is_file(),
                    Err(_) => false,
                };

                Some(MissingPayloadFile {
                    host: host.to_owned(),
                    file: *file,
                    path,
                    empty,
                })
            })
            .collect()
    }

    /// Resolves the payload for every host. If any host is incomplete, every
    /// missing or empty file across all of `hosts` is returned.
    pub fn resolve_all<S: AsRef<str>>(
        &self,
        hosts: &[S],
    ) -> Result<Vec<HostPayload>, Vec<MissingPayloadFile>> {
        let missing: Vec<MissingPayloadFile> = hosts
            .iter()
            .flat_map(|host| self.missing_files(host.as_ref()))
            .collect();

        if !missing.is_empty() {
            return Err(missing);
        }

        Ok(hosts
            .iter()
            .map(|host| HostPayload {
                host: host.as_ref().to_owned(),
                dir: self.host_dir(host.as_ref()),
            })
            .collect())
    }

    /// Lists, in sorted order, every host under the root whose payload is
    /// complete. Hidden directories and directories whose names start with
    /// `_` (such as the multi-host output root) are skipped.
    pub fn list_hosts(&self) -> Result<Vec<String>> {
        let entries = self
            .root
            .read_dir_utf8()
            .with_context(|| format!("listing {}", self.root))?;

        let mut hosts = Vec::new();
        for entry in entries {
            let entry = entry.with_context(|| format!("listing {}", self.root))?;
            let name = entry.file_name();
            if name.starts_with('.') || name.starts_with('_') {
                continue;
            }

            if entry.path().is_dir() && self.missing_files(name).is_empty() {
                hosts.push(name.to_owned());
            }
        }

        hosts.sort();
        Ok(hosts)
    }
}

/// Finds groups of hosts whose payloads are byte-for-byte identical, which
/// usually means a payload directory was copied by accident.
pub fn identical_payload_groups(payloads: &[HostPayload]) -> Result<Vec<Vec<String>>> {
    let mut by_digest: BTreeMap<[u8; 32], Vec<String>> = BTreeMap::new();
    for payload in payloads {
        by_digest
            .entry(payload.digest()?)
            .or_default()
            .push(payload.host.clone());
    }

    Ok(by_digest
        .into_values()
        .filter(|hosts| hosts.len() > 1)
        .sorted()
        .collect())
}
