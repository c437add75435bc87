//! Restrictive filesystem permissions for private key material (§6.1).
//! A documented no-op off unix.

use std::fs::File;
use std::path::Path;

/// Restricts `file` to user read/write only (unix mode `0600`).
#[cfg(unix)]
pub fn set_private_file_perm(file: &File) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let mut perm = file.metadata()?.permissions();
    perm.set_mode(0o600);
    file.set_permissions(perm)
}

#[cfg(not(unix))]
pub fn set_private_file_perm(_file: &File) -> std::io::Result<()> {
    Ok(())
}

/// Restricts `dir` to user read/write/execute only (unix mode `0700`).
#[cfg(unix)]
pub fn set_private_dir_perm(dir: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let mut perm = std::fs::metadata(dir)?.permissions();
    perm.set_mode(0o700);
    std::fs::set_permissions(dir, perm)
}

#[cfg(not(unix))]
pub fn set_private_dir_perm(_dir: &Path) -> std::io::Result<()> {
    Ok(())
}
