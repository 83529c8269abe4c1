use std::fmt;
use std::path::PathBuf;

use serde::Deserialize;

use crate::error::{OraRsError, Result};
use crate::native::{ConnCreateParams, ContextParams};

const DEFAULT_DRIVER_NAME: &str = "orars";

/// Privilege the session is opened with.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthorizationMode {
    #[default]
    Default,
    Prelim,
    SysAsm,
    SysBackup,
    SysDba,
    SysDgd,
    SysKmt,
    SysOper,
    SysRac,
}

impl AuthorizationMode {
    /// The native mode bits (`DPI_MODE_AUTH_*`).
    pub fn native_mode(self) -> u32 {
        match self {
            AuthorizationMode::Default => 0x0000_0000,
            AuthorizationMode::SysDba => 0x0000_0002,
            AuthorizationMode::SysOper => 0x0000_0004,
            AuthorizationMode::Prelim => 0x0000_0008,
            AuthorizationMode::SysAsm => 0x0000_8000,
            AuthorizationMode::SysBackup => 0x0002_0000,
            AuthorizationMode::SysDgd => 0x0004_0000,
            AuthorizationMode::SysKmt => 0x0008_0000,
            AuthorizationMode::SysRac => 0x0010_0000,
        }
    }
}

/// Everything needed to open a connection.
#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct ConnectOptions {
    pub username: String,
    pub password: String,
    pub connection_string: String,
    /// Directory to load the native client library from. When loading from
    /// here fails, the default search path is tried.
    #[serde(default)]
    pub client_lib_dir: Option<PathBuf>,
    #[serde(default)]
    pub client_config_dir: Option<PathBuf>,
    #[serde(default)]
    pub driver_name: Option<String>,
    #[serde(default)]
    pub auth_mode: AuthorizationMode,
}

impl ConnectOptions {
    pub fn new(
        username: impl Into<String>,
        password: impl Into<String>,
        connection_string: impl Into<String>,
    ) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            connection_string: connection_string.into(),
            client_lib_dir: None,
            client_config_dir: None,
            driver_name: None,
            auth_mode: AuthorizationMode::Default,
        }
    }

    /// Reads `ORA_USER`, `ORA_PWD` and `ORA_CONN`, plus the optional
    /// `ORA_CLIENT_LIB_DIR`.
    pub fn from_env() -> Result<Self> {
        let var = |name: &str| {
            std::env::var(name)
                .map_err(|_| OraRsError::CantOpen(format!("environment variable {} is not set", name)))
        };

        let mut options = Self::new(var("ORA_USER")?, var("ORA_PWD")?, var("ORA_CONN")?);
        options.client_lib_dir = std::env::var_os("ORA_CLIENT_LIB_DIR").map(PathBuf::from);
        Ok(options)
    }

    pub fn client_lib_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.client_lib_dir = Some(dir.into());
        self
    }

    pub fn auth_mode(mut self, mode: AuthorizationMode) -> Self {
        self.auth_mode = mode;
        self
    }

    pub fn driver_name(mut self, name: impl Into<String>) -> Self {
        self.driver_name = Some(name.into());
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.connection_string.trim().is_empty() {
            return Err(OraRsError::CantOpen(
                "connection string is empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Context parameters. With `with_lib_dir` false the library directory
    /// override is left out.
    pub(crate) fn context_params(&self, with_lib_dir: bool) -> ContextParams {
        ContextParams {
            driver_name: Some(
                self.driver_name
                    .clone()
                    .unwrap_or_else(|| DEFAULT_DRIVER_NAME.to_string()),
            ),
            client_lib_dir: if with_lib_dir {
                self.client_lib_dir.clone()
            } else {
                None
            },
            client_config_dir: self.client_config_dir.clone(),
        }
    }

    pub(crate) fn conn_create_params(&self) -> ConnCreateParams {
        ConnCreateParams {
            auth_mode: self.auth_mode.native_mode(),
        }
    }
}

impl fmt::Debug for ConnectOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectOptions")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("connection_string", &self.connection_string)
            .field("client_lib_dir", &self.client_lib_dir)
            .field("client_config_dir", &self.client_config_dir)
            .field("driver_name", &self.driver_name)
            .field("auth_mode", &self.auth_mode)
            .finish()
    }
}
