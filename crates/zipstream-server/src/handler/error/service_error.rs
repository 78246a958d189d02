//! Conversion of service layer errors into HTTP errors.

use crate::handler::{Error, ErrorKind};
use crate::{Error as ServiceError, ErrorKind as ServiceErrorKind};

/// Tracing target for service error conversion.
const TRACING_TARGET: &str = "zipstream_server::handler::error";

impl From<ServiceError> for Error<'static> {
    fn from(error: ServiceError) -> Self {
        tracing::error!(
            target: TRACING_TARGET,
            kind = %error.kind(),
            error = %error,
            "service error"
        );

        let message = match error.kind() {
            ServiceErrorKind::Process => "The archiver could not be started",
            ServiceErrorKind::FileSystem => "A required file could not be read",
            ServiceErrorKind::Config | ServiceErrorKind::Internal => "Unexpected service failure",
        };

        ErrorKind::InternalServerError
            .with_message(message)
            .with_context(error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn service_errors_are_internal() {
        let error = Error::from(ServiceError::process("zip", "failed to spawn archiver"));

        assert_eq!(error.kind(), ErrorKind::InternalServerError);
        assert_eq!(error.message(), Some("The archiver could not be started"));
        assert!(error.context().is_some_and(|context| context.contains("zip")));
    }
}
