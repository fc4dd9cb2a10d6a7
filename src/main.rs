// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! autoiso: assembles one Ubuntu autoinstall ISO from which an operator can
//! install any of several bare-metal hosts, chosen from a boot menu.

use std::{process::ExitCode, rc::Rc};

use anyhow::Context as _;
use app::{App, Command};
use clap::Parser;
use colored::Colorize;

pub mod app;
pub mod bootmenu;
pub mod build_multi_iso;
pub mod compositor;
pub mod error;
pub mod manifest;
pub mod payload;
pub mod runner;
pub mod staging;
pub mod ui;
pub mod util;

fn run(app: &App, interactive: bool) -> anyhow::Result<()> {
    match &app.command {
        Command::BuildMultiIso { args } => {
            let image = build_multi_iso::build_multi_iso(
                args.request(),
                app.roots.build_config(),
                Rc::new(compositor::Xorriso::new()),
                interactive,
            )?;

            println!("Created {}", image);
        }
        Command::ListHosts => {
            let store = payload::PayloadStore::new(&app.roots.generated_root);
            let hosts = store.list_hosts().with_context(|| {
                format!("listing hosts in {}", app.roots.generated_root)
            })?;

            for host in hosts {
                println!("{}", host);
            }
        }
    }

    Ok(())
}

fn main() -> ExitCode {
    let app = App::parse();
    let interactive = match app.interactive {
        Some(val) => val,
        None => atty::is(atty::Stream::Stdout),
    };

    match run(&app, interactive) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            match e.downcast_ref::<error::BuildError>() {
                Some(build_error) => {
                    eprintln!(
                        "{} build failed while {}: {:#}",
                        "error:".bold().red(),
                        build_error.phase(),
                        e
                    );
                    ExitCode::from(build_error.exit_code())
                }
                None => {
                    eprintln!("{} {:#}", "error:".bold().red(), e);
                    ExitCode::FAILURE
                }
            }
        }
    }
}
