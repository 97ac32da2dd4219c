/*
 * SPDX-FileCopyrightText: 2023 Andrew Gunnerson
 * SPDX-License-Identifier: GPL-3.0-only
 */

use std::{
    fs,
    io::{self, Write},
    path::{Component, Path, PathBuf},
};

use tempfile::NamedTempFile;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Path is absolute: {0:?}")]
    AbsolutePath(String),
    #[error("Path escapes its base directory: {0:?}")]
    ParentComponent(String),
}

/// Get the non-empty parent of a path. If the path has no parent in the string,
/// then `.` is returned. This does not perform any filesystem operations.
pub fn parent_path(path: &Path) -> &Path {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            return parent;
        }
    }

    Path::new(".")
}

/// Join a relative path from an untrusted source (eg. a manifest or a zip entry
/// name) onto `base`. Absolute paths and `..` components are rejected so that
/// the result can never point outside of `base`. `.` components are dropped.
pub fn path_join(base: &Path, untrusted: &str) -> Result<PathBuf, Error> {
    let mut result = base.to_path_buf();

    for component in Path::new(untrusted).components() {
        match component {
            Component::Normal(c) => result.push(c),
            Component::CurDir => {}
            Component::ParentDir => return Err(Error::ParentComponent(untrusted.to_owned())),
            Component::RootDir | Component::Prefix(_) => {
                return Err(Error::AbsolutePath(untrusted.to_owned()));
            }
        }
    }

    Ok(result)
}

/// Replace the contents of `path` with `data`. The data is written to a
/// temporary file in the same directory, which is then renamed over `path`. If
/// `path` already exists, its permissions are carried over.
pub fn write_replace(path: &Path, data: &[u8]) -> io::Result<()> {
    let mut temp = NamedTempFile::new_in(parent_path(path))?;
    temp.write_all(data)?;
    temp.as_file().sync_all()?;

    match fs::metadata(path) {
        Ok(m) => fs::set_permissions(temp.path(), m.permissions())?,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(e),
    }

    temp.persist(path).map_err(|e| e.error)?;

    Ok(())
}
