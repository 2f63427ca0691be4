//! Application build installation
//!
//! A build is a package archive, either on disk or behind an http(s) URL.
//! The installed version is recorded in `version.txt` inside the install
//! directory, so reinstalling the same build is a no-op unless forced.

mod archive;
mod download;

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;

use crate::common::{Error, Result};
use crate::process;

pub use archive::{extract_zip, ArchiveFormat};
pub use download::download_file;

pub const VERSION_FILE: &str = "version.txt";

static VERSION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\d+\.\d+\.\d+(?:-[0-9A-Za-z]+(?:\.[0-9A-Za-z]+)*)?").expect("valid regex")
});

/// Where a build package comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PackageSource {
    Local(PathBuf),
    Remote(String),
}

impl PackageSource {
    pub fn parse(build: &str) -> Self {
        if build.starts_with("http://") || build.starts_with("https://") {
            PackageSource::Remote(build.to_string())
        } else {
            PackageSource::Local(PathBuf::from(build))
        }
    }

    /// Package file name, without any URL query or fragment
    pub fn file_name(&self) -> Option<String> {
        match self {
            PackageSource::Local(path) => path.file_name().map(|n| n.to_string_lossy().to_string()),
            PackageSource::Remote(url) => {
                let path = url.split(['?', '#']).next().unwrap_or(url);
                path.rsplit('/')
                    .next()
                    .filter(|name| !name.is_empty())
                    .map(str::to_string)
            }
        }
    }
}

/// Version encoded in a package file name
///
/// The first semantic version in the name wins; names without one use the
/// file stem.
pub fn package_version(file_name: &str) -> String {
    let stem = ArchiveFormat::strip_suffix(file_name);
    VERSION_RE
        .find_iter(stem)
        .find_map(|m| semver::Version::parse(m.as_str()).ok())
        .map(|v| v.to_string())
        .unwrap_or_else(|| stem.to_string())
}

/// Write version info to the install directory
pub fn write_version_file(dir: &Path, version: &str) -> Result<()> {
    let version_file = dir.join(VERSION_FILE);
    std::fs::write(&version_file, version).map_err(|e| Error::FileWrite {
        path: version_file.display().to_string(),
        error: e.to_string(),
    })
}

/// Read the installed version, if any
pub fn read_version_file(dir: &Path) -> Option<String> {
    std::fs::read_to_string(dir.join(VERSION_FILE))
        .ok()
        .map(|s| s.trim().to_string())
}

/// What an install request did
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallOutcome {
    pub version: String,
    /// `false` when the requested version was already installed
    pub installed: bool,
}

/// Install `build` into `install_dir`
pub async fn install_build(build: &str, install_dir: &Path, force: bool) -> Result<InstallOutcome> {
    let source = PackageSource::parse(build);
    let file_name = source
        .file_name()
        .ok_or_else(|| Error::Install(format!("Cannot determine package name of {}", build)))?;
    let format = ArchiveFormat::detect(&file_name)
        .ok_or_else(|| Error::Install(format!("Unsupported package format: {}", file_name)))?;
    let version = package_version(&file_name);
    if let PackageSource::Local(path) = &source {
        if !path.is_file() {
            return Err(Error::Install(format!(
                "Package not found: {}",
                path.display()
            )));
        }
    }

    let installed = read_version_file(install_dir);
    if !force && installed.as_deref() == Some(version.as_str()) {
        tracing::info!("{} {} already installed", install_dir.display(), version);
        return Ok(InstallOutcome {
            version,
            installed: false,
        });
    }

    if install_dir.exists() {
        tracing::info!(
            "Removing previous installation {} ({})",
            install_dir.display(),
            installed.as_deref().unwrap_or("unknown version")
        );
        tokio::fs::remove_dir_all(install_dir).await?;
    }
    tokio::fs::create_dir_all(install_dir).await?;

    let staging = tempfile::tempdir()?;
    let archive = match &source {
        PackageSource::Local(path) => path.clone(),
        PackageSource::Remote(url) => {
            println!("Downloading {}", url);
            let dest = staging.path().join(&file_name);
            download_file(url, &dest).await?;
            dest
        }
    };

    tracing::info!("Extracting {} into {}", archive.display(), install_dir.display());
    let dest = install_dir.to_path_buf();
    tokio::task::spawn_blocking(move || format.extract(&archive, &dest))
        .await
        .map_err(|e| Error::Internal(format!("Extraction task failed: {}", e)))??;

    write_version_file(install_dir, &version)?;
    process::grant_full_access(install_dir).await?;

    tracing::info!("Installed {} {}", install_dir.display(), version);
    Ok(InstallOutcome {
        version,
        installed: true,
    })
}
