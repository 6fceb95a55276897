use std::{
    env,
    ffi::OsString,
    path::{
        Path,
        PathBuf,
    },
};

use crate::error::{
    DevCertError,
    Result,
};

pub const HOME_ENV_VAR: &str = "DEVCERT_HOME";

const BASE_DIR_NAME: &str = ".devcert";
const STORE_DIR_NAME: &str = "store-v1";
const TEMP_DIR_NAME: &str = "temp";

/// Where the certificate store and the transient trust files live.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DevCertConfig {
    pub store_dir: PathBuf,
    pub temp_dir: PathBuf,
}

impl DevCertConfig {
    pub fn from_env() -> Result<Self> {
        Ok(Self::with_base_dir(get_config_dir()?))
    }

    pub fn with_base_dir(base_dir: impl AsRef<Path>) -> Self {
        let base_dir = base_dir.as_ref();
        Self {
            store_dir: base_dir.join(STORE_DIR_NAME),
            temp_dir: base_dir.join(TEMP_DIR_NAME),
        }
    }
}

pub fn get_config_dir() -> Result<PathBuf> {
    resolve_config_dir(env::var_os(HOME_ENV_VAR), dirs::home_dir())
}

fn resolve_config_dir(
    override_dir: Option<OsString>, home_dir: Option<PathBuf>,
) -> Result<PathBuf> {
    if let Some(dir) = override_dir.filter(|dir| !dir.is_empty()) {
        return Ok(PathBuf::from(dir));
    }

    if let Some(mut path) = home_dir {
        path.push(BASE_DIR_NAME);
        return Ok(path);
    }

    Err(DevCertError::ConfigDir(
        "Unable to determine the user's home directory".to_string(),
    ))
}
