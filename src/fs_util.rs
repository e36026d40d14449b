use std::io::ErrorKind;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::error::{CredentialError, Result};

pub const CREDENTIAL_FILE_MODE: u32 = 0o600;
pub const ASSETS_DIR_MODE: u32 = 0o700;

/// Ensures the assets directory exists and is private to the owner.
///
/// # Errors
/// Returns an error if the directory cannot be created or permissions cannot be set.
pub async fn ensure_assets_dir(path: &Path) -> Result<()> {
    fs::create_dir_all(path)
        .await
        .map_err(|e| CredentialError::disk_io("create assets dir", path, e))?;
    fs::set_permissions(path, std::fs::Permissions::from_mode(ASSETS_DIR_MODE))
        .await
        .map_err(|e| CredentialError::disk_io("set permissions on", path, e))?;
    Ok(())
}

/// Writes a credential file, creating or truncating it, readable by the owner only.
///
/// Permissions are re-applied after the write so that a pre-existing file
/// with a looser mode is tightened as well.
///
/// # Errors
/// Returns an error if the file cannot be written or its permissions cannot be set.
pub async fn write_credential_file(path: &Path, contents: &[u8]) -> Result<()> {
    let mut file = fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(CREDENTIAL_FILE_MODE)
        .open(path)
        .await
        .map_err(|e| CredentialError::disk_io("open", path, e))?;
    file.write_all(contents)
        .await
        .map_err(|e| CredentialError::disk_io("write", path, e))?;
    file.flush()
        .await
        .map_err(|e| CredentialError::disk_io("flush", path, e))?;
    fs::set_permissions(path, std::fs::Permissions::from_mode(CREDENTIAL_FILE_MODE))
        .await
        .map_err(|e| CredentialError::disk_io("set permissions on", path, e))?;
    Ok(())
}

/// Reads a file, returning `None` when it does not exist.
///
/// # Errors
/// Returns an error for any failure other than the file being absent.
pub async fn read_if_exists(path: &Path) -> Result<Option<Vec<u8>>> {
    match fs::read(path).await {
        Ok(contents) => Ok(Some(contents)),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
        Err(err) => Err(CredentialError::disk_io("read", path, err)),
    }
}

/// Removes a file, returning whether anything was removed.
///
/// # Errors
/// Returns an error for any failure other than the file being absent.
pub async fn remove_if_exists(path: &Path) -> Result<bool> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(true),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
        Err(err) => Err(CredentialError::disk_io("remove", path, err)),
    }
}
