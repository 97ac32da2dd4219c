/*
 * SPDX-FileCopyrightText: 2023 Andrew Gunnerson
 * SPDX-License-Identifier: GPL-3.0-only
 */

use std::{
    fs,
    path::{Path, PathBuf},
    sync::atomic::AtomicBool,
};

use anyhow::{Context, Result, bail};
use clap::Parser;
use tracing::info;

use crate::{
    cli::{status, warning},
    config::{self, Config},
    format::manifest::{self, Manifest, Summary},
    util,
};

/// Resolved manifest and vendor directory paths.
#[derive(Debug, PartialEq, Eq)]
struct Paths {
    manifest: PathBuf,
    vendor_dir: PathBuf,
}

impl Paths {
    /// Command line arguments win over the config, which wins over the
    /// defaults. An explicit --vendor or --device also wins over a vendor
    /// directory from the config.
    fn resolve(cli: &Sha1sumsCli, config: &Config) -> Self {
        let manifest = cli
            .manifest
            .as_ref()
            .or(config.manifest.as_ref())
            .cloned()
            .unwrap_or_else(|| PathBuf::from(manifest::DEFAULT_FILE_NAME));

        let from_names = || {
            let vendor = cli
                .vendor
                .as_deref()
                .or(config.vendor.as_deref())
                .unwrap_or(config::DEFAULT_VENDOR);
            let device = cli
                .device
                .as_deref()
                .or(config.device.as_deref())
                .unwrap_or(config::DEFAULT_DEVICE);

            config::vendor_dir(vendor, device)
        };

        let vendor_dir = if let Some(dir) = &cli.vendor_dir {
            dir.clone()
        } else if cli.vendor.is_some() || cli.device.is_some() {
            from_names()
        } else if let Some(dir) = &config.vendor_dir {
            dir.clone()
        } else {
            from_names()
        };

        Self {
            manifest,
            vendor_dir,
        }
    }
}

fn read_manifest(path: &Path) -> Result<(String, Manifest)> {
    let data =
        fs::read_to_string(path).with_context(|| format!("Failed to read manifest: {path:?}"))?;
    let manifest = Manifest::parse(&data);

    Ok((data, manifest))
}

fn display_summary(cli: &Sha1sumsCli, summary: &Summary) {
    if cli.cleanup {
        status!(
            "Stripped {} of {} entry hashes",
            summary.stripped,
            summary.entries,
        );
    } else {
        status!(
            "Hashed {} of {} entries ({} changed)",
            summary.hashed,
            summary.entries,
            summary.changed,
        );
    }
}

fn sync_manifest(cli: &Sha1sumsCli, cancel_signal: &AtomicBool) -> Result<Summary> {
    let config = Config::load_optional(cli.config.as_deref())?;
    let paths = Paths::resolve(cli, &config);

    let (data, mut manifest) = read_manifest(&paths.manifest)?;

    let summary = if cli.cleanup {
        manifest.cleanup()
    } else {
        info!("Reading vendor files from {:?}", paths.vendor_dir);

        let summary = manifest
            .update(&paths.vendor_dir, cancel_signal)
            .with_context(|| format!("Failed to update hashes: {:?}", paths.manifest))?;

        if summary.hashed == 0 && summary.entries > 0 {
            warning!(
                "No comment contains {:?}; nothing was hashed",
                manifest::HASH_GROUP_MARKER,
            );
        }

        summary
    };

    display_summary(cli, &summary);

    let new_data = manifest.to_string();

    if cli.check {
        if new_data != data {
            bail!("Manifest is out of date: {:?}", paths.manifest);
        }

        status!("Manifest is up to date");
        return Ok(summary);
    }

    util::write_replace(&paths.manifest, new_data.as_bytes())
        .with_context(|| format!("Failed to write manifest: {:?}", paths.manifest))?;

    Ok(summary)
}

pub fn sha1sums_main(cli: &Sha1sumsCli, cancel_signal: &AtomicBool) -> Result<()> {
    sync_manifest(cli, cancel_signal).map(|_| ())
}

/// Update or strip the SHA-1 hashes in a proprietary files manifest.
///
/// Entries that follow a comment containing " - from" are pinned to the hash
/// of the corresponding file in the vendor directory. The pins for all other
/// entries are left as is.
#[derive(Debug, Default, Parser)]
pub struct Sha1sumsCli {
    /// Strip all hashes instead of updating them.
    ///
    /// No vendor files are read in this mode.
    #[arg(short, long)]
    pub cleanup: bool,

    /// Fail if the manifest is not up to date instead of writing it.
    #[arg(long, conflicts_with = "cleanup")]
    pub check: bool,

    /// Path to manifest.
    #[arg(short, long, value_name = "FILE", value_parser)]
    pub manifest: Option<PathBuf>,

    /// Vendor name used to locate the vendor directory.
    #[arg(long, value_name = "NAME")]
    pub vendor: Option<String>,

    /// Device name used to locate the vendor directory.
    #[arg(long, value_name = "NAME")]
    pub device: Option<String>,

    /// Path to the extracted proprietary files.
    ///
    /// Defaults to ../../../vendor/<vendor>/<device>/proprietary.
    #[arg(long, value_name = "DIR", value_parser, conflicts_with_all = ["vendor", "device"])]
    pub vendor_dir: Option<PathBuf>,

    /// Path to device tree config TOML.
    ///
    /// Relative manifest and vendor_dir paths in the config are relative to
    /// the directory containing the config file.
    #[arg(long, value_name = "FILE", value_parser)]
    pub config: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use tempfile::TempDir;

    use super::*;

    const FOOBAR_SHA1: &str = "8843d7f92416211de9ebb963ff4ce28125932878";

    const UNHASHED: &str = "\
# Prebuilt - from xiaomi
vendor/app/Foo.apk
vendor/app/Stale.apk|deadbeef

# Prebuilt
vendor/app/Bar.apk|keep
";

    fn hashed() -> String {
        format!(
            "\
# Prebuilt - from xiaomi
vendor/app/Foo.apk|{FOOBAR_SHA1}
vendor/app/Stale.apk|{FOOBAR_SHA1}

# Prebuilt
vendor/app/Bar.apk|keep
"
        )
    }

    struct Tree {
        temp_dir: TempDir,
    }

    impl Tree {
        fn new(manifest: &str) -> Self {
            let temp_dir = tempfile::tempdir().unwrap();
            let app_dir = temp_dir.path().join("proprietary/vendor/app");

            fs::create_dir_all(&app_dir).unwrap();
            fs::write(app_dir.join("Foo.apk"), b"foobar").unwrap();
            fs::write(app_dir.join("Stale.apk"), b"foobar").unwrap();
            fs::write(temp_dir.path().join("proprietary-files.txt"), manifest).unwrap();

            Self { temp_dir }
        }

        fn manifest_path(&self) -> PathBuf {
            self.temp_dir.path().join("proprietary-files.txt")
        }

        fn read_manifest(&self) -> String {
            fs::read_to_string(self.manifest_path()).unwrap()
        }

        fn cli(&self) -> Sha1sumsCli {
            Sha1sumsCli {
                manifest: Some(self.manifest_path()),
                vendor_dir: Some(self.temp_dir.path().join("proprietary")),
                ..Default::default()
            }
        }
    }

    #[test]
    fn update_writes_manifest() {
        let cancel_signal = AtomicBool::new(false);
        let tree = Tree::new(UNHASHED);

        let summary = sync_manifest(&tree.cli(), &cancel_signal).unwrap();

        assert_eq!(tree.read_manifest(), hashed());
        assert_eq!(
            summary,
            Summary {
                entries: 3,
                hashed: 2,
                changed: 2,
                stripped: 0,
            }
        );

        let summary = sync_manifest(&tree.cli(), &cancel_signal).unwrap();

        assert_eq!(tree.read_manifest(), hashed());
        assert_eq!(summary.changed, 0);
    }

    #[test]
    fn cleanup_writes_manifest() {
        let cancel_signal = AtomicBool::new(false);
        let tree = Tree::new(&hashed());
        let cli = Sha1sumsCli {
            cleanup: true,
            // Nothing is read from here in cleanup mode.
            vendor_dir: Some(tree.temp_dir.path().join("missing")),
            ..tree.cli()
        };

        let summary = sync_manifest(&cli, &cancel_signal).unwrap();

        assert_eq!(
            tree.read_manifest(),
            "\
# Prebuilt - from xiaomi
vendor/app/Foo.apk
vendor/app/Stale.apk

# Prebuilt
vendor/app/Bar.apk
"
        );
        assert_eq!(summary.stripped, 3);
        assert_eq!(summary.hashed, 0);
    }

    #[test]
    fn failed_update_does_not_write() {
        let cancel_signal = AtomicBool::new(false);
        let data = format!("{UNHASHED}# More - from xiaomi\nvendor/app/Missing.apk|abc\n");
        let tree = Tree::new(&data);

        let err = sha1sums_main(&tree.cli(), &cancel_signal).unwrap_err();

        assert_matches!(
            err.downcast_ref::<manifest::Error>(),
            Some(manifest::Error::HashFile(p, _)) if p.ends_with("vendor/app/Missing.apk")
        );
        assert_eq!(tree.read_manifest(), data);
    }

    #[test]
    fn check_up_to_date() {
        let cancel_signal = AtomicBool::new(false);
        let tree = Tree::new(&hashed());
        let cli = Sha1sumsCli {
            check: true,
            ..tree.cli()
        };

        sha1sums_main(&cli, &cancel_signal).unwrap();
        assert_eq!(tree.read_manifest(), hashed());
    }

    #[test]
    fn check_out_of_date() {
        let cancel_signal = AtomicBool::new(false);
        let tree = Tree::new(UNHASHED);
        let cli = Sha1sumsCli {
            check: true,
            ..tree.cli()
        };

        let err = sha1sums_main(&cli, &cancel_signal).unwrap_err();

        assert!(err.to_string().starts_with("Manifest is out of date"), "{err}");
        assert_eq!(tree.read_manifest(), UNHASHED);
    }

    #[test]
    fn config_paths_used_when_not_overridden() {
        let cancel_signal = AtomicBool::new(false);
        let tree = Tree::new(UNHASHED);
        let config_path = tree.temp_dir.path().join("blobtool.toml");
        fs::write(
            &config_path,
            "manifest = \"proprietary-files.txt\"\nvendor_dir = \"proprietary\"\n",
        )
        .unwrap();

        let cli = Sha1sumsCli {
            config: Some(config_path),
            ..Default::default()
        };

        sync_manifest(&cli, &cancel_signal).unwrap();
        assert_eq!(tree.read_manifest(), hashed());
    }

    #[test]
    fn resolve_defaults() {
        let paths = Paths::resolve(&Sha1sumsCli::default(), &Config::default());

        assert_eq!(
            paths,
            Paths {
                manifest: PathBuf::from("proprietary-files.txt"),
                vendor_dir: PathBuf::from("../../../vendor/xiaomi/mt6768-common/proprietary"),
            }
        );
    }

    #[test]
    fn resolve_config_over_defaults() {
        let config = Config {
            vendor: Some("google".to_owned()),
            manifest: Some(PathBuf::from("cfg/blobs.txt")),
            ..Default::default()
        };

        let paths = Paths::resolve(&Sha1sumsCli::default(), &config);

        assert_eq!(paths.manifest, Path::new("cfg/blobs.txt"));
        assert_eq!(
            paths.vendor_dir,
            Path::new("../../../vendor/google/mt6768-common/proprietary"),
        );

        let config = Config {
            vendor_dir: Some(PathBuf::from("/cfg/dir")),
            ..config
        };

        let paths = Paths::resolve(&Sha1sumsCli::default(), &config);
        assert_eq!(paths.vendor_dir, Path::new("/cfg/dir"));
    }

    #[test]
    fn resolve_cli_over_config() {
        let config = Config {
            vendor: Some("xiaomi".to_owned()),
            device: Some("redfin".to_owned()),
            manifest: Some(PathBuf::from("cfg/blobs.txt")),
            vendor_dir: Some(PathBuf::from("/cfg/dir")),
            ..Default::default()
        };

        // --vendor beats the config's vendor_dir. The device still comes from
        // the config.
        let cli = Sha1sumsCli {
            vendor: Some("google".to_owned()),
            manifest: Some(PathBuf::from("blobs.txt")),
            ..Default::default()
        };
        let paths = Paths::resolve(&cli, &config);

        assert_eq!(paths.manifest, Path::new("blobs.txt"));
        assert_eq!(
            paths.vendor_dir,
            Path::new("../../../vendor/google/redfin/proprietary"),
        );

        let cli = Sha1sumsCli {
            device: Some("oriole".to_owned()),
            ..Default::default()
        };
        assert_eq!(
            Paths::resolve(&cli, &config).vendor_dir,
            Path::new("../../../vendor/xiaomi/oriole/proprietary"),
        );

        let cli = Sha1sumsCli {
            vendor_dir: Some(PathBuf::from("cli/dir")),
            ..Default::default()
        };
        assert_eq!(
            Paths::resolve(&cli, &config).vendor_dir,
            Path::new("cli/dir"),
        );
    }
}
