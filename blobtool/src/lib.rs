/*
 * SPDX-FileCopyrightText: 2023 Andrew Gunnerson
 * SPDX-License-Identifier: GPL-3.0-only
 */

//! Tools for maintaining an Android device tree: keeping the proprietary blob
//! manifest's SHA-1 pins in sync with the extracted vendor files, and flashing
//! extra firmware images from OTA packages.
//!
//! The semver versioning covers the CLI only. The Rust APIs can change at any
//! time.

pub mod cli;
pub mod config;
pub mod format;
pub mod patch;
pub mod stream;
pub mod util;
