use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;

use fr_domain::error::{Error, Result};

/// Read a JSON document, or `T::default()` when the file does not exist.
///
/// A file that exists but fails to parse is an error: silently starting
/// empty would overwrite it on the next save.
pub(crate) fn load<T: DeserializeOwned + Default>(path: &Path) -> Result<T> {
    if !path.exists() {
        return Ok(T::default());
    }
    let raw = std::fs::read_to_string(path).map_err(Error::Io)?;
    if raw.trim().is_empty() {
        return Ok(T::default());
    }
    serde_json::from_str(&raw)
        .map_err(|e| Error::Store(format!("parsing {}: {e}", path.display())))
}

/// Write a JSON document via a temp file and rename.
pub(crate) async fn save<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)
        .map_err(|e| Error::Store(format!("serializing {}: {e}", path.display())))?;
    let tmp = tmp_path(path);
    tokio::fs::write(&tmp, json).await.map_err(Error::Io)?;
    tokio::fs::rename(&tmp, path).await.map_err(Error::Io)?;
    Ok(())
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}
