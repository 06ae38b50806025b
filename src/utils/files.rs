// src/utils/files.rs
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::Path;

/// Writes `bytes` to `path` so the contents are never readable by group or others.
///
/// New files are created with mode 0600. An existing file is narrowed to 0600
/// before it is truncated, so old permissions never apply to the new contents.
pub fn write_owner_only(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let mut options = OpenOptions::new();
    options.write(true).create(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options.open(path)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        file.set_permissions(std::fs::Permissions::from_mode(0o600))?;
    }

    file.set_len(0)?;
    file.write_all(bytes)?;
    file.sync_all()
}
