/*
 * SPDX-FileCopyrightText: 2023 Andrew Gunnerson
 * SPDX-License-Identifier: GPL-3.0-only
 */

use std::{
    fs::File,
    io::{self, BufWriter, Write},
    path::PathBuf,
};

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use clap_complete::Shell;

use crate::cli::args::Cli;

const BIN_NAME: &str = "blobtool";

fn write_completion(shell: Shell, writer: &mut dyn Write) {
    clap_complete::generate(shell, &mut Cli::command(), BIN_NAME, writer);
}

pub fn completion_main(cli: &CompletionCli) -> Result<()> {
    match &cli.output {
        Some(path) => {
            let mut writer = File::create(path)
                .map(BufWriter::new)
                .with_context(|| format!("Failed to open for writing: {path:?}"))?;

            write_completion(cli.shell, &mut writer);

            writer
                .flush()
                .with_context(|| format!("Failed to write completions: {path:?}"))?;
        }
        None => write_completion(cli.shell, &mut io::stdout().lock()),
    }

    Ok(())
}

/// Generate shell tab completion configs.
#[derive(Debug, Parser)]
pub struct CompletionCli {
    /// The shell to generate completions for.
    #[arg(short, long, value_name = "SHELL", value_parser)]
    pub shell: Shell,

    /// Write the completions to a file instead of stdout.
    #[arg(short, long, value_name = "FILE", value_parser)]
    pub output: Option<PathBuf>,
}
