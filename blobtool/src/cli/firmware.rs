/*
 * SPDX-FileCopyrightText: 2023 Andrew Gunnerson
 * SPDX-License-Identifier: GPL-3.0-only
 */

use std::{
    ffi::OsStr,
    fs::{self, File},
    io::{BufReader, BufWriter, Write},
    path::PathBuf,
    sync::atomic::AtomicBool,
};

use anyhow::{Context, Result};
use clap::Parser;
use tempfile::NamedTempFile;
use tracing::info;
use zip::{ZipArchive, ZipWriter};

use crate::{
    config::Config,
    format::edify::EdifyScript,
    patch::firmware::{self, InstallInfo, OtaKind},
    util,
};

pub fn firmware_main(cli: &FirmwareCli, cancel_signal: &AtomicBool) -> Result<()> {
    let config = Config::load_optional(cli.config.as_deref())?;
    let images = if config.firmware.is_empty() {
        firmware::default_images()
    } else {
        config.firmware
    };

    let reader = File::open(&cli.input)
        .map(BufReader::new)
        .with_context(|| format!("Failed to open target files for reading: {:?}", cli.input))?;
    let mut input_zip = ZipArchive::new(reader)
        .with_context(|| format!("Failed to read target files zip: {:?}", cli.input))?;

    // The output only appears at its final path once it's complete.
    let temp_writer = NamedTempFile::with_prefix_in(
        cli.output
            .file_name()
            .unwrap_or_else(|| OsStr::new("blobtool.tmp")),
        util::parent_path(&cli.output),
    )
    .context("Failed to open temporary output file")?;
    let temp_path = temp_writer.path().to_owned();
    let mut output_zip = ZipWriter::new(BufWriter::new(temp_writer));

    let mut script = EdifyScript::new();
    let kind = if cli.incremental {
        OtaKind::Incremental
    } else {
        OtaKind::Full
    };

    InstallInfo {
        input_zip: &mut input_zip,
        output_zip: &mut output_zip,
        script: &mut script,
    }
    .install_end(kind, &images, cancel_signal)
    .context("Failed to add firmware images")?;

    let buffered_writer = output_zip
        .finish()
        .context("Failed to finalize output zip")?;
    let mut temp_writer = buffered_writer
        .into_inner()
        .context("Failed to flush output zip")?;
    temp_writer.flush().context("Failed to flush output zip")?;

    temp_writer.persist(&cli.output).with_context(|| {
        format!(
            "Failed to move temporary file to output path: {temp_path:?} -> {:?}",
            cli.output,
        )
    })?;

    // stdout may be carrying the script.
    info!("Added {} firmware images to {:?}", images.len(), cli.output);

    match &cli.script {
        Some(path) => fs::write(path, script.to_string())
            .with_context(|| format!("Failed to write script: {path:?}"))?,
        None => print!("{script}"),
    }

    Ok(())
}

/// Copy firmware images from target files into an update package.
///
/// Each image is read from the IMAGES/ directory of the target files zip and
/// stored at the root of the output zip. The installer script statements that
/// flash the images are written to --script or stdout.
#[derive(Debug, Parser)]
pub struct FirmwareCli {
    /// Path to input target files zip.
    #[arg(short, long, value_name = "FILE", value_parser)]
    pub input: PathBuf,

    /// Path to output zip.
    #[arg(short, long, value_name = "FILE", value_parser)]
    pub output: PathBuf,

    /// Path to output installer script fragment.
    #[arg(short, long, value_name = "FILE", value_parser)]
    pub script: Option<PathBuf>,

    /// Generate statements for an incremental OTA.
    #[arg(long)]
    pub incremental: bool,

    /// Path to device tree config TOML.
    ///
    /// The [[firmware]] tables, if any, replace the default image list.
    #[arg(long, value_name = "FILE", value_parser)]
    pub config: Option<PathBuf>,
}
