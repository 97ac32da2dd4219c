// SPDX-FileCopyrightText: 2023-2025 Andrew Gunnerson
// SPDX-License-Identifier: GPL-3.0-only

//! Release tools hook for flashing extra partition images. The images are
//! copied from the target files into the update package and extracted
//! directly to their block devices at the end of the installation.

use std::{
    io::{self, Read, Seek, Write},
    path::Path,
    sync::atomic::AtomicBool,
};

use serde::Deserialize;
use thiserror::Error;
use tracing::debug;
use zip::{
    CompressionMethod, DateTime, ZipArchive, ZipWriter, result::ZipError,
    write::SimpleFileOptions,
};

use crate::{format::edify::EdifyScript, stream, util};

pub const IMAGES_DIR: &str = "IMAGES";

pub const INSTALL_MESSAGE: &str = "Patching firmware images...";

/// Images flashed by default, in order.
const DEFAULT_IMAGES: &[(&str, &str)] = &[
    ("vbmeta.img", "/dev/block/by-name/vbmeta"),
    ("vbmeta_system.img", "/dev/block/by-name/vbmeta_system"),
    ("vbmeta_vendor.img", "/dev/block/by-name/vbmeta_vendor"),
    ("dtbo.img", "/dev/block/by-name/dtbo"),
];

#[derive(Debug, Error)]
pub enum Error {
    #[error("Image name is empty")]
    EmptyImageName,
    #[error("Invalid image name: {0:?}")]
    InvalidImageName(String, #[source] util::Error),
    #[error("Image not found in target files: {0}")]
    MissingImage(String),
    #[error("Failed to open zip entry: {0}")]
    ZipRead(String, #[source] ZipError),
    #[error("Failed to begin new zip entry: {0}")]
    ZipWrite(String, #[source] ZipError),
    #[error("Failed to copy zip entry: {0}")]
    DataCopy(String, #[source] io::Error),
}

type Result<T> = std::result::Result<T, Error>;

/// An image in the target files `IMAGES/` directory and the block device it is
/// flashed to.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct FirmwareImage {
    pub image: String,
    pub device: String,
}

impl FirmwareImage {
    pub fn new(image: impl Into<String>, device: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            device: device.into(),
        }
    }

    /// The image name is used as a path in both zips, so it must stay inside
    /// of them.
    pub fn validate(&self) -> Result<()> {
        if self.image.is_empty() {
            return Err(Error::EmptyImageName);
        }

        util::path_join(Path::new(""), &self.image)
            .map_err(|e| Error::InvalidImageName(self.image.clone(), e))?;

        Ok(())
    }
}

pub fn default_images() -> Vec<FirmwareImage> {
    DEFAULT_IMAGES
        .iter()
        .map(|(image, device)| FirmwareImage::new(*image, *device))
        .collect()
}

/// Which kind of OTA is being generated. Both kinds flash the same images.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OtaKind {
    Full,
    Incremental,
}

/// The state handed to the hook: the target files to read images from, the
/// update package being written, and its installer script.
pub struct InstallInfo<'a, R, W: Write + Seek> {
    pub input_zip: &'a mut ZipArchive<R>,
    pub output_zip: &'a mut ZipWriter<W>,
    pub script: &'a mut EdifyScript,
}

impl<R: Read + Seek, W: Write + Seek> InstallInfo<'_, R, W> {
    /// Copy `IMAGES/<image>` into the root of the update package and extract
    /// it to `device` during installation.
    pub fn add_image(&mut self, image: &FirmwareImage, cancel_signal: &AtomicBool) -> Result<()> {
        image.validate()?;

        let input_path = format!("{IMAGES_DIR}/{}", image.image);

        let mut reader = self
            .input_zip
            .by_name(&input_path)
            .map_err(|e| match e {
                ZipError::FileNotFound => Error::MissingImage(input_path.clone()),
                e => Error::ZipRead(input_path.clone(), e),
            })?;

        let options = SimpleFileOptions::default()
            .last_modified_time(DateTime::default())
            .compression_method(CompressionMethod::Deflated);

        self.output_zip
            .start_file(image.image.as_str(), options)
            .map_err(|e| Error::ZipWrite(image.image.clone(), e))?;

        let n = stream::copy(&mut reader, &mut *self.output_zip, cancel_signal)
            .map_err(|e| Error::DataCopy(input_path.clone(), e))?;

        debug!("Copied {input_path} ({n} bytes) -> {}", image.device);

        self.script.package_extract_file(&image.image, &image.device);

        Ok(())
    }

    /// Run at the end of the installation script.
    pub fn install_end(
        &mut self,
        kind: OtaKind,
        images: &[FirmwareImage],
        cancel_signal: &AtomicBool,
    ) -> Result<()> {
        debug!("Adding {} firmware images to {kind:?} OTA", images.len());

        self.script.print(INSTALL_MESSAGE);

        for image in images {
            self.add_image(image, cancel_signal)?;
        }

        Ok(())
    }
}
