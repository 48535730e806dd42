// Copyright 2026 Daniel Pelikan
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Error types.

use thiserror::Error;
use uuid::Uuid;

use crate::bluetooth::adapter::RadioOperation;
use crate::bluetooth::ble_constants::GattStatus;
use crate::state::LinkState;

/// Reasons a scan could not be started, as reported by the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanFailureReason {
    AlreadyStarted,
    RegistrationFailed,
    InternalError,
    Unsupported,
    OutOfHardwareResources,
    TooFrequent,
    Unknown(i32),
}

impl ScanFailureReason {
    /// Map a platform scan failure code.
    pub fn from_code(code: i32) -> Self {
        match code {
            1 => Self::AlreadyStarted,
            2 => Self::RegistrationFailed,
            3 => Self::InternalError,
            4 => Self::Unsupported,
            5 => Self::OutOfHardwareResources,
            6 => Self::TooFrequent,
            other => Self::Unknown(other),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AlreadyStarted => "SCAN_FAILED_ALREADY_STARTED",
            Self::RegistrationFailed => "SCAN_FAILED_APPLICATION_REGISTRATION_FAILED",
            Self::InternalError => "SCAN_FAILED_INTERNAL_ERROR",
            Self::Unsupported => "SCAN_FAILED_FEATURE_UNSUPPORTED",
            Self::OutOfHardwareResources => "SCAN_FAILED_OUT_OF_HARDWARE_RESOURCES",
            Self::TooFrequent => "SCAN_FAILED_SCANNING_TOO_FREQUENTLY",
            Self::Unknown(_) => "SCAN_FAILED_UNKNOWN",
        }
    }
}

impl std::fmt::Display for ScanFailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unknown(code) => write!(f, "{} ({})", self.as_str(), code),
            _ => f.write_str(self.as_str()),
        }
    }
}

/// Errors surfaced by the central.
///
/// None of these are fatal to the host process: connection failures end in
/// cleanup, everything else is reported and the prior state is kept.
#[derive(Debug, Clone, Error)]
pub enum CentralError {
    #[error("scan could not be started: {reason}")]
    ScanStartFailure { reason: ScanFailureReason },

    #[error("connection failed with status {status}")]
    ConnectionFailure { status: GattStatus },

    #[error("service discovery failed with status {status}")]
    ServiceDiscoveryFailure { status: GattStatus },

    #[error("characteristic {uuid} not found")]
    CharacteristicNotFound { uuid: Uuid },

    #[error("characteristic {uuid} is not readable")]
    CharacteristicNotReadable { uuid: Uuid },

    #[error("characteristic {uuid} is not writable")]
    CharacteristicNotWritable { uuid: Uuid },

    #[error("adapter rejected {operation} request")]
    SubmissionRejected { operation: RadioOperation },

    #[error("could not decode payload from characteristic {characteristic}")]
    DecodeFailure { characteristic: Uuid },

    #[error("permission denied for {operation}")]
    PermissionDenied { operation: RadioOperation },

    #[error("bluetooth radio is disabled")]
    RadioDisabled,

    #[error("a session is already active ({state:?})")]
    SessionBusy { state: LinkState },

    #[error("central is no longer running")]
    Closed,
}

/// Why an adapter did not accept a request for submission.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AdapterError {
    #[error("permission denied")]
    PermissionDenied,
    #[error("adapter is not enabled")]
    NotEnabled,
    #[error("adapter is busy")]
    Busy,
    #[error("unknown connection handle")]
    UnknownHandle,
    #[error("{0}")]
    Platform(String),
}

impl CentralError {
    /// Convert a rejected submission for `operation` into the taxonomy.
    pub fn from_adapter(operation: RadioOperation, err: AdapterError) -> Self {
        match err {
            AdapterError::PermissionDenied => Self::PermissionDenied { operation },
            AdapterError::NotEnabled => Self::RadioDisabled,
            _ => Self::SubmissionRejected { operation },
        }
    }
}
