//! Process exit codes

use obs_core::Error;

/// Exit status of an obsctl invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    Success = 0,
    /// Unclassified failure (local I/O, serialization)
    GeneralError = 1,
    /// Bad arguments or configuration
    UsageError = 2,
    NetworkError = 3,
    /// Identity exchange or service catalog failure
    AuthError = 4,
    NotFound = 5,
    /// The command ran but at least one item failed
    PartialFailure = 6,
    /// Cancelled by Ctrl-C
    Interrupted = 130,
}

impl ExitCode {
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    pub fn from_i32(code: i32) -> Option<Self> {
        match code {
            0 => Some(Self::Success),
            1 => Some(Self::GeneralError),
            2 => Some(Self::UsageError),
            3 => Some(Self::NetworkError),
            4 => Some(Self::AuthError),
            5 => Some(Self::NotFound),
            6 => Some(Self::PartialFailure),
            130 => Some(Self::Interrupted),
            _ => None,
        }
    }

    /// Exit code for a fatal command error
    pub fn from_error(error: &Error) -> Self {
        match error {
            Error::Usage(_) | Error::Config(_) | Error::TomlParse(_) => Self::UsageError,
            Error::Auth(_) | Error::Catalog(_) => Self::AuthError,
            Error::Transfer { status: 404, .. } | Error::NotFound(_) => Self::NotFound,
            Error::Transfer { .. } | Error::Network(_) => Self::NetworkError,
            Error::Cancelled(_) => Self::Interrupted,
            Error::Filesystem { .. } | Error::Io(_) | Error::Json(_) => Self::GeneralError,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_codes() {
        for code in [
            ExitCode::Success,
            ExitCode::UsageError,
            ExitCode::PartialFailure,
            ExitCode::Interrupted,
        ] {
            assert_eq!(ExitCode::from_i32(code.as_i32()), Some(code));
        }
        assert_eq!(ExitCode::from_i32(42), None);
    }

    #[test]
    fn test_from_error() {
        assert_eq!(
            ExitCode::from_error(&Error::Config("missing region".into())),
            ExitCode::UsageError
        );
        assert_eq!(
            ExitCode::from_error(&Error::Auth("HTTP 401".into())),
            ExitCode::AuthError
        );
        assert_eq!(
            ExitCode::from_error(&Error::Transfer {
                operation: "GET",
                path: "obs://b/k".into(),
                status: 404,
                message: "Not Found".into(),
            }),
            ExitCode::NotFound
        );
        assert_eq!(
            ExitCode::from_error(&Error::Transfer {
                operation: "GET",
                path: "obs://b/k".into(),
                status: 503,
                message: "Service Unavailable".into(),
            }),
            ExitCode::NetworkError
        );
        assert_eq!(
            ExitCode::from_error(&Error::fs("/tmp/x", std::io::Error::other("denied"))),
            ExitCode::GeneralError
        );
    }
}
