// SPDX-FileCopyrightText: 2023-2025 Andrew Gunnerson
// SPDX-License-Identifier: GPL-3.0-only

//! Parser and rewriter for `proprietary-files.txt` blob manifests.
//!
//! A manifest is a list of lines. Lines starting with `#` are comments, empty
//! lines are ignored, and everything else is an entry of the form:
//!
//! ```text
//! [-]<source>[:<destination>][;<flag>...][|<sha1>]
//! ```
//!
//! Comments also act as group headers. Entries following a comment that
//! contains [`HASH_GROUP_MARKER`] are pinned to the SHA-1 digest of the blob
//! they were extracted from, up until the next comment.

use std::{
    fmt,
    fs::File,
    io,
    path::{Path, PathBuf},
    sync::atomic::AtomicBool,
};

use thiserror::Error;
use tracing::{debug, info};

use crate::{stream, util};

/// Default manifest file name, relative to the device tree.
pub const DEFAULT_FILE_NAME: &str = "proprietary-files.txt";

/// Comments containing this substring begin a group of hash-pinned entries.
pub const HASH_GROUP_MARKER: &str = " - from";

const COMMENT_PREFIX: char = '#';
const HASH_SEPARATOR: char = '|';
const FIELD_SEPARATOR: char = ';';
const PATH_SEPARATOR: char = ':';
const PATH_MARKER: char = '-';

#[derive(Debug, Error)]
pub enum Error {
    #[error("Entry has an empty file path: {0:?}")]
    EmptyPath(String),
    #[error("Entry has an invalid file path: {0:?}")]
    InvalidPath(String, #[source] util::Error),
    #[error("Failed to hash file: {0:?}")]
    HashFile(PathBuf, #[source] io::Error),
}

type Result<T> = std::result::Result<T, Error>;

/// A manifest entry, split at the first `|`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Entry {
    spec: String,
    hash: Option<String>,
}

impl Entry {
    fn parse(line: &str) -> Self {
        match line.split_once(HASH_SEPARATOR) {
            Some((spec, hash)) => Self {
                spec: spec.to_owned(),
                hash: Some(hash.to_owned()),
            },
            None => Self {
                spec: line.to_owned(),
                hash: None,
            },
        }
    }

    /// The entry without its hash suffix.
    pub fn spec(&self) -> &str {
        &self.spec
    }

    /// Everything after the first `|`, if present.
    pub fn hash(&self) -> Option<&str> {
        self.hash.as_deref()
    }

    /// Path of the blob relative to the vendor directory. This is the portion
    /// of the source field after the last `:`, with a single leading `-`
    /// removed.
    pub fn file_path(&self) -> Result<&str> {
        let field = self.spec.split(FIELD_SEPARATOR).next().unwrap_or_default();
        let path = field.rsplit(PATH_SEPARATOR).next().unwrap_or_default();
        let path = path.strip_prefix(PATH_MARKER).unwrap_or(path);

        if path.is_empty() {
            return Err(Error::EmptyPath(self.spec.clone()));
        }

        Ok(path)
    }

    fn strip_hash(&mut self) -> bool {
        self.hash.take().is_some()
    }
}

impl fmt::Display for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.spec)?;

        if let Some(hash) = &self.hash {
            write!(f, "{HASH_SEPARATOR}{hash}")?;
        }

        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Line {
    Blank,
    Comment { text: String, needs_hash: bool },
    Entry(Entry),
}

impl Line {
    pub fn parse(line: &str) -> Self {
        if line.is_empty() {
            Self::Blank
        } else if line.starts_with(COMMENT_PREFIX) {
            Self::Comment {
                text: line.to_owned(),
                needs_hash: line.contains(HASH_GROUP_MARKER),
            }
        } else {
            Self::Entry(Entry::parse(line))
        }
    }
}

impl fmt::Display for Line {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Blank => Ok(()),
            Self::Comment { text, .. } => f.write_str(text),
            Self::Entry(entry) => write!(f, "{entry}"),
        }
    }
}

/// Counts of what a cleanup or update pass did.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Summary {
    pub entries: usize,
    pub hashed: usize,
    pub changed: usize,
    pub stripped: usize,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Manifest {
    lines: Vec<Line>,
}

impl Manifest {
    pub fn parse(data: &str) -> Self {
        Self {
            lines: data.lines().map(Line::parse).collect(),
        }
    }

    pub fn lines(&self) -> &[Line] {
        &self.lines
    }

    pub fn entries(&self) -> impl Iterator<Item = &Entry> {
        self.lines.iter().filter_map(|l| match l {
            Line::Entry(e) => Some(e),
            _ => None,
        })
    }

    /// Remove the hash suffix from every entry. No files are accessed.
    pub fn cleanup(&mut self) -> Summary {
        let mut summary = Summary::default();

        for line in &mut self.lines {
            if let Line::Entry(entry) = line {
                summary.entries += 1;

                if entry.strip_hash() {
                    summary.stripped += 1;
                }
            }
        }

        summary
    }

    /// Recompute the hash of every entry in a hash-marked group. `digest` is
    /// called with the entry's relative file path and returns the new hash.
    /// Entries outside of hash-marked groups are left untouched. If `digest`
    /// fails, the manifest is not modified.
    pub fn update_with(
        &mut self,
        mut digest: impl FnMut(&str) -> Result<String>,
    ) -> Result<Summary> {
        let mut summary = Summary::default();
        let mut lines = self.lines.clone();
        let mut needs_hash = false;

        for line in &mut lines {
            let entry = match line {
                Line::Blank => continue,
                Line::Comment { needs_hash: n, .. } => {
                    needs_hash = *n;
                    continue;
                }
                Line::Entry(entry) => entry,
            };

            summary.entries += 1;

            if !needs_hash {
                continue;
            }

            let old_hash = entry.hash.take();
            let new_hash = digest(entry.file_path()?)?;

            if old_hash.as_deref() != Some(new_hash.as_str()) {
                info!("Hash changed: {}: {old_hash:?} -> {new_hash}", entry.spec);
                summary.changed += 1;
            }

            entry.hash = Some(new_hash);
            summary.hashed += 1;
        }

        self.lines = lines;

        Ok(summary)
    }

    /// Recompute hashes by reading the blobs from `vendor_dir`.
    pub fn update(&mut self, vendor_dir: &Path, cancel_signal: &AtomicBool) -> Result<Summary> {
        self.update_with(|file_path| {
            let path = util::path_join(vendor_dir, file_path)
                .map_err(|e| Error::InvalidPath(file_path.to_owned(), e))?;

            debug!("Hashing {path:?}");

            let file = File::open(&path).map_err(|e| Error::HashFile(path.clone(), e))?;
            stream::sha1_hex(file, cancel_signal).map_err(|e| Error::HashFile(path, e))
        })
    }
}

impl fmt::Display for Manifest {
    /// Lines are joined with `\n` and always end with a trailing newline.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, line) in self.lines.iter().enumerate() {
            if i > 0 {
                f.write_str("\n")?;
            }
            write!(f, "{line}")?;
        }

        f.write_str("\n")
    }
}
