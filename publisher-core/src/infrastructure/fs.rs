// publisher-core/src/infrastructure/fs.rs

use std::fs;
use std::io::Write;
use std::path::Path;

use crate::error::PublisherError;
use crate::infrastructure::error::InfrastructureError;

/// Write content to a file atomically using a temporary file in the same
/// directory, then renaming it over the target.
///
/// The temporary file is created with owner-only permissions (0600 on Unix),
/// which the rename preserves, so this is also how credential files are
/// written.
pub fn atomic_write<P: AsRef<Path>, C: AsRef<[u8]>>(
    path: P,
    content: C,
) -> Result<(), InfrastructureError> {
    let path = path.as_ref();
    let parent = path.parent().unwrap_or_else(|| Path::new("."));

    let mut temp_file = tempfile::NamedTempFile::new_in(parent)?;
    temp_file.write_all(content.as_ref())?;
    temp_file
        .persist(path)
        .map_err(|e| InfrastructureError::from(e.error))?;

    Ok(())
}

/// Replaces `dst` with a copy of the contents of `src`.
pub fn replace_dir_with_copy(src: &Path, dst: &Path) -> Result<(), InfrastructureError> {
    if dst.exists() {
        fs::remove_dir_all(dst)?;
    }
    fs::create_dir_all(dst)?;

    let mut options = fs_extra::dir::CopyOptions::new();
    options.content_only = true;
    options.overwrite = true;

    fs_extra::dir::copy(src, dst, &options)
        .map(|_| ())
        .map_err(|e| {
            InfrastructureError::from(std::io::Error::other(format!(
                "copying {} to {}: {}",
                src.display(),
                dst.display(),
                e
            )))
        })
}

/// Extracts a zip archive into `dest`. Entries escaping `dest` are refused by
/// the zip reader.
pub fn unpack_zip(archive: &Path, dest: &Path) -> Result<(), InfrastructureError> {
    let file = fs::File::open(archive)?;
    let mut zip = zip::ZipArchive::new(file).map_err(|e| {
        InfrastructureError::Archive(format!("{} is not a readable zip: {}", archive.display(), e))
    })?;
    fs::create_dir_all(dest)?;
    zip.extract(dest).map_err(|e| {
        InfrastructureError::Archive(format!("extracting {}: {}", archive.display(), e))
    })
}

/// Empties `path` (creating it if needed).
pub fn reset_dir(path: &Path) -> std::io::Result<()> {
    if path.exists() {
        fs::remove_dir_all(path)?;
    }
    fs::create_dir_all(path)
}

/// Runs blocking filesystem work off the async worker.
pub async fn blocking<T, F>(work: F) -> Result<T, PublisherError>
where
    F: FnOnce() -> Result<T, InfrastructureError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| PublisherError::InternalError(format!("blocking task failed: {}", e)))?
        .map_err(PublisherError::from)
}
