//! Error and status types for the session lifecycle.

use crate::subsystem::SubsystemKind;
use std::path::PathBuf;
use thiserror::Error;

/// Flat status reported by the run loop and recorded for the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResultStatus {
    Success,
    ErrorNotInitialized,
    ErrorGetLoader,
    ErrorSystemMode,
    ErrorLoader,
    ErrorLoaderEncrypted,
    ErrorLoaderInvalidFormat,
    ErrorVideoCore,
    ErrorVideoCoreGenericDrivers,
    ErrorVideoCoreBelowGl33,
    /// Cooperative termination, not a failure.
    ShutdownRequested,
    ErrorUnknown,
}

impl ResultStatus {
    pub fn is_error(self) -> bool {
        !matches!(self, ResultStatus::Success | ResultStatus::ShutdownRequested)
    }
}

/// Failures reported by a program loader.
#[derive(Debug, Error)]
pub enum LoaderError {
    #[error("program image is encrypted")]
    Encrypted,
    #[error("program image has an invalid format")]
    InvalidFormat,
    #[error("operation not supported by this loader")]
    NotImplemented,
    #[error("program image was already loaded")]
    AlreadyLoaded,
    #[error("malformed program image: {0}")]
    Malformed(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failures raised while bringing up a collaborator subsystem.
#[derive(Debug, Error)]
pub enum SubsystemError {
    #[error("video core failed to initialize")]
    VideoCore,
    #[error("video core: generic drivers detected")]
    VideoCoreGenericDrivers,
    #[error("video core: OpenGL 3.3 or newer is required")]
    VideoCoreBelowGl33,
    #[error("{kind} failed to initialize: {reason}")]
    Failed { kind: SubsystemKind, reason: String },
}

/// Errors from session lifecycle operations.
#[derive(Debug, Error)]
pub enum SystemError {
    #[error("no loader recognised {}", path.display())]
    GetLoader { path: PathBuf },
    #[error("failed to determine system mode: {0}")]
    SystemMode(#[source] LoaderError),
    #[error("program image is encrypted")]
    LoaderEncrypted,
    #[error("program image has an invalid format")]
    LoaderInvalidFormat,
    #[error("failed to load program: {0}")]
    Loader(#[source] LoaderError),
    #[error(transparent)]
    Subsystem(#[from] SubsystemError),
    #[error("no session is loaded")]
    NotInitialized,
}

impl SystemError {
    /// Translate a loader failure raised while reading the system mode.
    pub fn from_system_mode(err: LoaderError) -> Self {
        match err {
            LoaderError::Encrypted => SystemError::LoaderEncrypted,
            LoaderError::InvalidFormat => SystemError::LoaderInvalidFormat,
            other => SystemError::SystemMode(other),
        }
    }

    /// Translate a loader failure raised while loading the program image.
    pub fn from_load(err: LoaderError) -> Self {
        match err {
            LoaderError::Encrypted => SystemError::LoaderEncrypted,
            LoaderError::InvalidFormat => SystemError::LoaderInvalidFormat,
            other => SystemError::Loader(other),
        }
    }

    pub fn status(&self) -> ResultStatus {
        match self {
            SystemError::GetLoader { .. } => ResultStatus::ErrorGetLoader,
            SystemError::SystemMode(_) => ResultStatus::ErrorSystemMode,
            SystemError::LoaderEncrypted => ResultStatus::ErrorLoaderEncrypted,
            SystemError::LoaderInvalidFormat => ResultStatus::ErrorLoaderInvalidFormat,
            SystemError::Loader(_) => ResultStatus::ErrorLoader,
            SystemError::Subsystem(SubsystemError::VideoCore) => ResultStatus::ErrorVideoCore,
            SystemError::Subsystem(SubsystemError::VideoCoreGenericDrivers) => {
                ResultStatus::ErrorVideoCoreGenericDrivers
            }
            SystemError::Subsystem(SubsystemError::VideoCoreBelowGl33) => {
                ResultStatus::ErrorVideoCoreBelowGl33
            }
            SystemError::Subsystem(SubsystemError::Failed { .. }) => ResultStatus::ErrorUnknown,
            SystemError::NotInitialized => ResultStatus::ErrorNotInitialized,
        }
    }
}

/// Errors reading the title override table.
#[derive(Debug, Error)]
pub enum OverridesError {
    #[error("failed to read override table: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse override table: {0}")]
    Parse(#[from] serde_json::Error),
}
