use crate::whitelist::Whitelist;
use crate::WhitelistError;
use std::ffi::OsString;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::info;

/// File name used when no output path is given; placed next to the stairsplus dump.
pub const DEFAULT_FILE_NAME: &str = "stairsplus.whitelist";

pub fn default_output_path(dump_path: &Path) -> PathBuf {
    dump_path
        .parent()
        .unwrap_or_else(|| Path::new(""))
        .join(DEFAULT_FILE_NAME)
}

/// Sorted names joined by `\n`, without a trailing newline.
pub fn render(whitelist: &Whitelist) -> Vec<u8> {
    whitelist.iter().collect::<Vec<_>>().join(&b'\n')
}

/// Write the whitelist atomically: render fully, write a uniquely named sibling
/// temp file, then rename it over `dest`.
///
/// The destination is left untouched if anything fails, and the temp file is removed.
pub fn write_whitelist(whitelist: &Whitelist, dest: &Path) -> Result<(), WhitelistError> {
    let bytes = render(whitelist);
    write_atomic(&bytes, dest).map_err(|source| WhitelistError::Write {
        path: dest.to_path_buf(),
        source,
    })?;

    info!(
        path = %dest.display(),
        entries = whitelist.len(),
        bytes = bytes.len(),
        "whitelist written"
    );
    Ok(())
}

fn write_atomic(bytes: &[u8], dest: &Path) -> io::Result<()> {
    let name = dest
        .file_name()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "output path has no file name"))?;
    let dir = match dest.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut prefix: OsString = OsString::from(".");
    prefix.push(name);
    prefix.push(".");
    let mut tmp = tempfile::Builder::new()
        .prefix(&prefix)
        .suffix(".tmp")
        .tempfile_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(dest).map_err(|e| e.error)?;
    Ok(())
}
