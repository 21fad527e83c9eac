//! Location of cached datasets on local storage.
use crate::{DatasetError, Result};
use std::ffi::OsString;
use std::path::{Path, PathBuf};

/// Environment variable overriding the cache root.
pub const DATA_HOME_ENV: &str = "TABULAR_DATASETS_HOME";

/// Directory created under the user's home when no override is given.
const DEFAULT_DIR_NAME: &str = "tabular_datasets";

/// Root directory holding one subdirectory per dataset.
///
/// Resolving paths never touches the filesystem: directories are created by
/// the fetcher when something is written into them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataHome {
    root: PathBuf,
}

impl DataHome {
    /// Use `root` as the cache root.
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self { root: root.into() }
    }

    /// Resolve the cache root from [`DATA_HOME_ENV`], falling back to
    /// `~/tabular_datasets`.
    pub fn from_env() -> Result<Self> {
        resolve(std::env::var_os(DATA_HOME_ENV), dirs::home_dir())
    }

    /// The cache root itself.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory of the cache entry for `name`.
    pub fn dataset_dir(&self, name: &str) -> Result<PathBuf> {
        check_component("dataset name", name)?;
        Ok(self.root.join(name))
    }

    /// Path of `filename` inside the cache entry for `name`.
    pub fn path_of(&self, name: &str, filename: &str) -> Result<PathBuf> {
        check_component("file name", filename)?;
        Ok(self.dataset_dir(name)?.join(filename))
    }
}

fn resolve(env_value: Option<OsString>, home: Option<PathBuf>) -> Result<DataHome> {
    match env_value {
        Some(value) if value.is_empty() => Err(DatasetError::Configuration(format!(
            "{DATA_HOME_ENV} is set but empty"
        ))),
        Some(value) => Ok(DataHome::new(value)),
        None => home
            .map(|home| DataHome::new(home.join(DEFAULT_DIR_NAME)))
            .ok_or_else(|| {
                DatasetError::Configuration(format!(
                    "cannot determine the home directory, set {DATA_HOME_ENV}"
                ))
            }),
    }
}

/// Cache entries are keyed by plain names; anything that could escape the
/// root is refused.
fn check_component(kind: &str, value: &str) -> Result<()> {
    let invalid = value.is_empty()
        || value == "."
        || value == ".."
        || value.contains('/')
        || value.contains('\\');
    if invalid {
        return Err(DatasetError::Configuration(format!(
            "invalid {kind}: {value:?}"
        )));
    }
    Ok(())
}
