/*
 * SPDX-FileCopyrightText: 2023 Andrew Gunnerson
 * SPDX-License-Identifier: GPL-3.0-only
 */

use std::{
    fs, io,
    path::{Path, PathBuf},
};

use serde::Deserialize;
use thiserror::Error;

use crate::{patch::firmware::FirmwareImage, util};

pub const DEFAULT_VENDOR: &str = "xiaomi";
pub const DEFAULT_DEVICE: &str = "mt6768-common";

#[derive(Debug, Error)]
pub enum Error {
    #[error("Failed to read config: {0:?}")]
    Read(PathBuf, #[source] io::Error),
    #[error("Failed to parse config: {0:?}")]
    Parse(PathBuf, #[source] toml_edit::de::Error),
}

type Result<T> = std::result::Result<T, Error>;

/// Per device tree settings. Every field is optional and command line
/// arguments take precedence.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub vendor: Option<String>,
    pub device: Option<String>,
    pub manifest: Option<PathBuf>,
    pub vendor_dir: Option<PathBuf>,
    pub firmware: Vec<FirmwareImage>,
}

impl Config {
    pub fn parse(data: &str, path: &Path) -> Result<Self> {
        toml_edit::de::from_str(data).map_err(|e| Error::Parse(path.to_owned(), e))
    }

    /// Relative paths are resolved against the directory containing `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let data = fs::read_to_string(path).map_err(|e| Error::Read(path.to_owned(), e))?;
        let mut config = Self::parse(&data, path)?;
        config.rebase(util::parent_path(path));

        Ok(config)
    }

    /// Make relative paths relative to `base` instead.
    pub fn rebase(&mut self, base: &Path) {
        for path in [&mut self.manifest, &mut self.vendor_dir].into_iter().flatten() {
            if path.is_relative() {
                *path = base.join(&*path);
            }
        }
    }

    /// Load `path` if specified, otherwise use the defaults.
    pub fn load_optional(path: Option<&Path>) -> Result<Self> {
        path.map_or_else(|| Ok(Self::default()), Self::load)
    }
}

/// Location of the extracted proprietary blobs for a device tree, relative to
/// the device tree directory.
pub fn vendor_dir(vendor: &str, device: &str) -> PathBuf {
    ["..", "..", "..", "vendor", vendor, device, "proprietary"]
        .iter()
        .collect()
}
