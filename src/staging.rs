// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The ephemeral working directory in which host payloads and the rendered
//! boot menu are assembled before they are overlaid onto the base image.
//!
//! The layout mirrors what ends up in the image:
//!
//! ```text
//! <workdir>/
//!   grub.cfg
//!   loopback.cfg            (same contents as grub.cfg)
//!   nocloud/<host>/user-data
//!   nocloud/<host>/meta-data
//! ```

use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use tempfile::TempDir;

use crate::{
    bootmenu::BootMenu,
    payload::{HostPayload, PayloadStore},
    ui::Ui,
};

pub const NOCLOUD_DIR: &str = "nocloud";

/// The boot menu is written under both of these names. BIOS/EFI boots read
/// `grub.cfg`; loopback boots of the ISO (e.g. from Ventoy) read
/// `loopback.cfg`.
pub const MENU_FILE_NAMES: [&str; 2] = ["grub.cfg", "loopback.cfg"];

const WORKDIR_PREFIX: &str = "multi-iso-";

/// The files staged for compositing, all inside the working directory.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StagedTree {
    pub nocloud_dir: Utf8PathBuf,
    pub grub_cfg: Utf8PathBuf,
    pub loopback_cfg: Utf8PathBuf,
}

/// An exclusively owned temporary directory. Dropping it removes the
/// directory and everything staged in it.
#[derive(Debug)]
pub struct StagingArea {
    dir: TempDir,
    path: Utf8PathBuf,
}

impl StagingArea {
    /// Creates a fresh working directory under `tmp_root`, creating
    /// `tmp_root` itself if necessary.
    pub fn create(tmp_root: &Utf8Path) -> Result<Self> {
        std::fs::create_dir_all(tmp_root)
            .with_context(|| format!("creating temporary root {tmp_root}"))?;

        let dir = tempfile::Builder::new()
            .prefix(WORKDIR_PREFIX)
            .tempdir_in(tmp_root)
            .with_context(|| format!("creating working directory in {tmp_root}"))?;

        let path = Utf8PathBuf::from_path_buf(dir.path().to_path_buf())
            .map_err(|p| {
                anyhow::anyhow!("working directory {} is not UTF-8", p.display())
            })?;

        Ok(Self { dir, path })
    }

    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    /// Copies the payload of each host in `menu` into `nocloud/<host>/` and
    /// writes the rendered menu under both menu file names.
    ///
    /// Every host is resolved before anything is copied, so an incomplete
    /// host fails the whole staging run and names every missing file.
    pub fn stage(
        &self,
        store: &PayloadStore,
        menu: &BootMenu,
        ui: &dyn Ui,
    ) -> Result<StagedTree> {
        let hosts: Vec<&str> =
            menu.entries().iter().map(|entry| entry.host()).collect();
        let payloads = store.resolve_all(&hosts).map_err(|missing| {
            let lines: Vec<String> =
                missing.iter().map(ToString::to_string).collect();
            anyhow::anyhow!("incomplete host payloads:\n  {}", lines.join("\n  "))
        })?;

        let nocloud_dir = self.path.join(NOCLOUD_DIR);
        for payload in &payloads {
            ui.set_substep(&format!("copying payload for {}", payload.host()));
            copy_payload(payload, &nocloud_dir.join(payload.host()))?;
        }

        ui.set_substep("writing boot menu");
        let config = menu.render();
        let [grub_cfg, loopback_cfg] = MENU_FILE_NAMES.map(|name| self.path.join(name));
        for target in [&grub_cfg, &loopback_cfg] {
            std::fs::write(target, &config)
                .with_context(|| format!("writing {target}"))?;
        }

        Ok(StagedTree { nocloud_dir, grub_cfg, loopback_cfg })
    }

    /// Removes the working directory now, reporting any failure to do so.
    pub fn close(self) -> Result<()> {
        let path = self.path;
        self.dir
            .close()
            .with_context(|| format!("removing working directory {path}"))
    }
}

fn copy_payload(payload: &HostPayload, target_dir: &Utf8Path) -> Result<()> {
    std::fs::create_dir_all(target_dir)
        .with_context(|| format!("creating {target_dir}"))?;

    for (name, src) in payload.files() {
        let dst = target_dir.join(name);
        std::fs::copy(&src, &dst)
            .with_context(|| format!("copying {src} to {dst}"))?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        payload::tests::{utf8_root, write_payload},
        payload::{META_DATA, USER_DATA},
        ui::SilentUi,
    };

    struct Fixture {
        _temp: TempDir,
        generated: Utf8PathBuf,
        tmp_root: Utf8PathBuf,
    }

    fn fixture(hosts: &[&str]) -> Fixture {
        let temp = TempDir::new().unwrap();
        let root = utf8_root(&temp);
        let generated = root.join("generated");
        for host in hosts {
            write_payload(&generated, host);
        }

        Fixture { _temp: temp, generated, tmp_root: root.join("tmp") }
    }

    fn entries(dir: &Utf8Path) -> usize {
        std::fs::read_dir(dir).map(|d| d.count()).unwrap_or(0)
    }

    #[test]
    fn stages_payloads_and_both_menu_files() {
        let fx = fixture(&["alpha", "beta"]);
        let store = PayloadStore::new(&fx.generated);
        let menu = BootMenu::new(&["alpha", "beta"], 5, Some("beta")).unwrap();

        let area = StagingArea::create(&fx.tmp_root).unwrap();
        assert!(area.path().starts_with(&fx.tmp_root));
        let tree = area.stage(&store, &menu, &SilentUi).unwrap();

        for host in ["alpha", "beta"] {
            for file in [USER_DATA, META_DATA] {
                let staged = std::fs::read(tree.nocloud_dir.join(host).join(file)).unwrap();
                let original = std::fs::read(fx.generated.join(host).join(file)).unwrap();
                assert_eq!(staged, original);
            }
        }

        let grub = std::fs::read_to_string(&tree.grub_cfg).unwrap();
        let loopback = std::fs::read_to_string(&tree.loopback_cfg).unwrap();
        assert_eq!(grub, menu.render());
        assert_eq!(grub, loopback);
        assert_eq!(tree.grub_cfg.file_name(), Some("grub.cfg"));
        assert_eq!(tree.loopback_cfg.file_name(), Some("loopback.cfg"));
    }

    #[test]
    fn originals_are_left_in_place() {
        let fx = fixture(&["alpha"]);
        let store = PayloadStore::new(&fx.generated);
        let menu = BootMenu::new(&["alpha"], 10, None).unwrap();

        let area = StagingArea::create(&fx.tmp_root).unwrap();
        area.stage(&store, &menu, &SilentUi).unwrap();

        assert!(fx.generated.join("alpha").join(USER_DATA).is_file());
        assert!(fx.generated.join("alpha").join(META_DATA).is_file());
        assert_eq!(entries(&fx.generated.join("alpha")), 2);
    }

    #[test]
    fn incomplete_host_stages_nothing() {
        let fx = fixture(&["alpha", "beta"]);
        std::fs::remove_file(fx.generated.join("beta").join(META_DATA)).unwrap();
        let store = PayloadStore::new(&fx.generated);
        let menu = BootMenu::new(&["alpha", "beta"], 10, None).unwrap();

        let area = StagingArea::create(&fx.tmp_root).unwrap();
        let err = area
            .stage(&store, &menu, &SilentUi)
            .unwrap_err();

        assert!(err.to_string().contains("host 'beta' is missing meta-data"));
        assert_eq!(entries(area.path()), 0);
    }

    #[test]
    fn working_directory_is_removed_on_drop_and_close() {
        let fx = fixture(&["alpha"]);

        let dropped = StagingArea::create(&fx.tmp_root).unwrap();
        let dropped_path = dropped.path().to_path_buf();
        drop(dropped);
        assert!(!dropped_path.exists());

        let closed = StagingArea::create(&fx.tmp_root).unwrap();
        let closed_path = closed.path().to_path_buf();
        closed.close().unwrap();
        assert!(!closed_path.exists());

        assert_eq!(entries(&fx.tmp_root), 0);
    }
}
