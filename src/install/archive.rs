//! Package archive extraction

use std::path::Path;

use crate::common::{Error, Result};

/// Supported package formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    Zip,
    TarGz,
    TarXz,
}

impl ArchiveFormat {
    const SUFFIXES: &'static [(&'static str, ArchiveFormat)] = &[
        (".zip", ArchiveFormat::Zip),
        (".tar.gz", ArchiveFormat::TarGz),
        (".tgz", ArchiveFormat::TarGz),
        (".tar.xz", ArchiveFormat::TarXz),
        (".txz", ArchiveFormat::TarXz),
    ];

    /// Detect the format from a file name
    pub fn detect(file_name: &str) -> Option<Self> {
        let lower = file_name.to_lowercase();
        Self::SUFFIXES
            .iter()
            .find(|(suffix, _)| lower.ends_with(suffix))
            .map(|(_, format)| *format)
    }

    /// File name without the archive suffix
    pub fn strip_suffix(file_name: &str) -> &str {
        let lower = file_name.to_lowercase();
        Self::SUFFIXES
            .iter()
            .find(|(suffix, _)| lower.ends_with(suffix))
            .map(|(suffix, _)| &file_name[..file_name.len() - suffix.len()])
            .unwrap_or(file_name)
    }

    /// Extract `archive` into `dest`
    pub fn extract(self, archive: &Path, dest: &Path) -> Result<()> {
        match self {
            ArchiveFormat::Zip => extract_zip(archive, dest),
            ArchiveFormat::TarGz => {
                let file = std::fs::File::open(archive)?;
                extract_tar(flate2::read::GzDecoder::new(file), dest)
            }
            ArchiveFormat::TarXz => {
                let file = std::fs::File::open(archive)?;
                extract_tar(xz2::read::XzDecoder::new(file), dest)
            }
        }
    }
}

/// Extract a zip archive
pub fn extract_zip(archive_path: &Path, dest_dir: &Path) -> Result<()> {
    let file = std::fs::File::open(archive_path)?;
    let mut archive = zip::ZipArchive::new(file)
        .map_err(|e| Error::Install(format!("Failed to open zip: {}", e)))?;

    for i in 0..archive.len() {
        let mut file = archive
            .by_index(i)
            .map_err(|e| Error::Install(format!("Failed to read zip entry: {}", e)))?;

        let outpath = match file.enclosed_name() {
            Some(path) => dest_dir.join(path),
            None => continue,
        };

        if file.is_dir() {
            std::fs::create_dir_all(&outpath)?;
        } else {
            if let Some(parent) = outpath.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let mut outfile = std::fs::File::create(&outpath)?;
            std::io::copy(&mut file, &mut outfile)?;
        }

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Some(mode) = file.unix_mode() {
                std::fs::set_permissions(&outpath, std::fs::Permissions::from_mode(mode))?;
            }
        }
    }

    Ok(())
}

fn extract_tar<R: std::io::Read>(reader: R, dest_dir: &Path) -> Result<()> {
    let mut archive = tar::Archive::new(reader);
    archive
        .unpack(dest_dir)
        .map_err(|e| Error::Install(format!("Failed to extract tar archive: {}", e)))
}
