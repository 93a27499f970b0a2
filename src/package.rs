//! Release metadata: the server version marker and the build stamp inside
//! the published exercise package archive.

use std::fs::{self, File};
use std::io::{BufRead, BufReader};
use std::path::Path;
use tracing::debug;

use crate::error::StoreError;

/// Trimmed contents of the version marker file.
pub fn read_version<P: AsRef<Path>>(path: P) -> Result<String, StoreError> {
    Ok(fs::read_to_string(path)?.trim().to_string())
}

/// First line of `entry` inside the archive at `archive_path`, trimmed.
pub fn read_package_timestamp<P: AsRef<Path>>(
    archive_path: P,
    entry: &str,
) -> Result<String, StoreError> {
    let archive_path = archive_path.as_ref();
    let mut archive = zip::ZipArchive::new(File::open(archive_path)?)?;
    let file = archive.by_name(entry)?;

    let mut first_line = String::new();
    BufReader::new(file).read_line(&mut first_line)?;

    debug!(archive = %archive_path.display(), entry = %entry, "Read package timestamp");
    Ok(first_line.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;
    use zip::write::SimpleFileOptions;

    #[test]
    fn test_read_version() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("version");
        fs::write(&path, "  3.0.2\n").unwrap();
        assert_eq!(read_version(&path).unwrap(), "3.0.2");
    }

    #[test]
    fn test_read_package_timestamp() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("exercises.zip");

        let mut writer = zip::ZipWriter::new(File::create(&path).unwrap());
        let options =
            SimpleFileOptions::default().compression_method(zip::CompressionMethod::Stored);
        writer.start_file("config.txt", options).unwrap();
        writer.write_all(b"1714521600\n[Introduction]\n").unwrap();
        writer.finish().unwrap();

        assert_eq!(read_package_timestamp(&path, "config.txt").unwrap(), "1714521600");
        assert!(matches!(
            read_package_timestamp(&path, "missing.txt"),
            Err(StoreError::Archive(_))
        ));
    }
}
