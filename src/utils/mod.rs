pub mod config;
pub mod errors;

pub use config::AppConfig;
pub use errors::{BatchTranslatorError, FieldFailurePolicy, ItemFailurePolicy, Result};

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Object key for a flush, zero padded so keys sort in flush order.
pub fn sequence_key(prefix: &str, sequence: usize) -> String {
    format!("{}{:05}.json", prefix, sequence)
}

/// Writes `data` to `<path>.tmp`, syncs it, then renames it over `path`.
pub fn write_atomic(path: &Path, data: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(".tmp");
    let tmp_path = PathBuf::from(tmp_name);

    {
        let mut file = File::create(&tmp_path)?;
        file.write_all(data)?;
        file.sync_all()?;
    }
    fs::rename(&tmp_path, path)?;
    Ok(())
}
