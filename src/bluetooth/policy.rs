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

//! What happens after a session ends.

use super::ble_constants::GattStatus;
use crate::error::CentralError;

/// Why a session was torn down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationCause {
    /// The caller asked to disconnect.
    UserRequested { status: GattStatus },
    /// The link never came up.
    ConnectionFailed { status: GattStatus },
    ServiceDiscoveryFailed { status: GattStatus },
    /// An established link went away.
    LinkLost { status: GattStatus },
    AdapterOff,
    Shutdown,
}

impl std::fmt::Display for TerminationCause {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UserRequested { status } => write!(f, "disconnect requested ({})", status),
            Self::ConnectionFailed { status } => write!(f, "connection failed ({})", status),
            Self::ServiceDiscoveryFailed { status } => {
                write!(f, "service discovery failed ({})", status)
            }
            Self::LinkLost { status } => write!(f, "link lost ({})", status),
            Self::AdapterOff => f.write_str("bluetooth turned off"),
            Self::Shutdown => f.write_str("shutdown"),
        }
    }
}

impl TerminationCause {
    /// The failure this teardown reports to observers, if any.
    pub fn error(&self) -> Option<CentralError> {
        match *self {
            Self::ConnectionFailed { status } => Some(CentralError::ConnectionFailure { status }),
            Self::LinkLost { status } if !status.is_success() => {
                Some(CentralError::ConnectionFailure { status })
            }
            Self::ServiceDiscoveryFailed { status } => {
                Some(CentralError::ServiceDiscoveryFailure { status })
            }
            Self::AdapterOff => Some(CentralError::RadioDisabled),
            Self::UserRequested { .. } | Self::LinkLost { .. } | Self::Shutdown => None,
        }
    }
}

/// How far the ending session got.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionProgress {
    /// The link came up at least once.
    pub established: bool,
    /// Services were discovered and polling could start.
    pub ready: bool,
}

/// Decides whether to alert the user and whether scanning resumes.
#[derive(Debug, Clone, Copy)]
pub struct ReconnectPolicy {
    auto_resume: bool,
}

impl ReconnectPolicy {
    pub fn new(auto_resume: bool) -> Self {
        Self { auto_resume }
    }

    /// Whether the user is told the peripheral was lost.
    ///
    /// A first connection attempt that never came up stays silent; a
    /// disconnect the user asked for never alerts.
    pub fn should_notify(&self, cause: TerminationCause, progress: SessionProgress) -> bool {
        match cause {
            TerminationCause::UserRequested { .. } | TerminationCause::Shutdown => false,
            TerminationCause::ConnectionFailed { .. } => progress.established,
            TerminationCause::ServiceDiscoveryFailed { .. } => true,
            TerminationCause::LinkLost { status } => !status.is_success() || progress.ready,
            TerminationCause::AdapterOff => true,
        }
    }

    /// Whether discovery restarts once cleanup is done.
    pub fn should_resume_discovery(&self, cause: TerminationCause, radio_enabled: bool) -> bool {
        self.auto_resume
            && radio_enabled
            && !matches!(cause, TerminationCause::Shutdown | TerminationCause::AdapterOff)
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::new(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FRESH: SessionProgress = SessionProgress {
        established: false,
        ready: false,
    };
    const READY: SessionProgress = SessionProgress {
        established: true,
        ready: true,
    };

    #[test]
    fn test_first_attempt_failure_is_silent() {
        let policy = ReconnectPolicy::default();
        let cause = TerminationCause::ConnectionFailed {
            status: GattStatus::ERROR,
        };
        assert!(!policy.should_notify(cause, FRESH));
        assert!(policy.should_notify(
            cause,
            SessionProgress {
                established: true,
                ready: false
            }
        ));
    }

    #[test]
    fn test_user_requested_never_alerts() {
        let policy = ReconnectPolicy::default();
        let cause = TerminationCause::UserRequested {
            status: GattStatus::SUCCESS,
        };
        assert!(!policy.should_notify(cause, READY));
        assert!(policy.should_resume_discovery(cause, true));
    }

    #[test]
    fn test_link_lost() {
        let policy = ReconnectPolicy::default();
        let clean = TerminationCause::LinkLost {
            status: GattStatus::SUCCESS,
        };
        let dropped = TerminationCause::LinkLost {
            status: GattStatus::CONN_TIMEOUT,
        };
        assert!(policy.should_notify(clean, READY));
        assert!(!policy.should_notify(
            clean,
            SessionProgress {
                established: true,
                ready: false
            }
        ));
        assert!(policy.should_notify(dropped, FRESH));
    }

    #[test]
    fn test_resume_conditions() {
        let policy = ReconnectPolicy::default();
        let cause = TerminationCause::LinkLost {
            status: GattStatus::CONN_TIMEOUT,
        };
        assert!(policy.should_resume_discovery(cause, true));
        assert!(!policy.should_resume_discovery(cause, false));
        assert!(!policy.should_resume_discovery(TerminationCause::Shutdown, true));
        assert!(!policy.should_resume_discovery(TerminationCause::AdapterOff, true));
        assert!(!ReconnectPolicy::new(false).should_resume_discovery(cause, true));
    }

    #[test]
    fn test_service_discovery_failure_alerts() {
        let policy = ReconnectPolicy::default();
        let cause = TerminationCause::ServiceDiscoveryFailed {
            status: GattStatus::FAILURE,
        };
        assert!(policy.should_notify(cause, FRESH));
        assert!(!policy.should_notify(TerminationCause::Shutdown, READY));
    }

    #[test]
    fn test_reported_errors() {
        let failed = TerminationCause::ConnectionFailed {
            status: GattStatus::ERROR,
        };
        assert!(matches!(
            failed.error(),
            Some(CentralError::ConnectionFailure {
                status: GattStatus::ERROR
            })
        ));

        let discovery = TerminationCause::ServiceDiscoveryFailed {
            status: GattStatus::FAILURE,
        };
        assert!(matches!(
            discovery.error(),
            Some(CentralError::ServiceDiscoveryFailure { .. })
        ));

        let clean = TerminationCause::LinkLost {
            status: GattStatus::SUCCESS,
        };
        assert!(clean.error().is_none());
        assert!(TerminationCause::Shutdown.error().is_none());
        assert!(matches!(
            TerminationCause::AdapterOff.error(),
            Some(CentralError::RadioDisabled)
        ));
    }
}
