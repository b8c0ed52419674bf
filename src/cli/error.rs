//! CLI-level errors (wraps infrastructure errors)

use thiserror::Error;

use crate::application::ApplicationError;
use crate::exitcode;
use crate::infrastructure::InfraError;

/// CLI errors are the top-level error type.
/// These are what get displayed to the user.
#[derive(Error, Debug)]
pub enum CliError {
    #[error("{0}")]
    Infra(#[from] InfraError),

    #[error("invalid arguments: {0}")]
    InvalidArgs(String),

    #[error("{0}")]
    Usage(String),
}

impl From<ApplicationError> for CliError {
    fn from(e: ApplicationError) -> Self {
        CliError::Infra(InfraError::Application(e))
    }
}

/// Result type for CLI operations.
pub type CliResult<T> = Result<T, CliError>;

impl CliError {
    /// Get the appropriate exit code for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::InvalidArgs(_) | CliError::Usage(_) => exitcode::USAGE,
            CliError::Infra(e) => match e {
                InfraError::Io { .. } => exitcode::IOERR,
                InfraError::Application(app) => match app {
                    ApplicationError::ValidationFailed { .. } => exitcode::DATAERR,
                    ApplicationError::ResourceUnavailable { .. } => exitcode::UNAVAILABLE,
                    ApplicationError::Config { .. } => exitcode::CONFIG,
                    ApplicationError::OperationFailed { source, .. } => {
                        if source.is::<std::io::Error>() {
                            exitcode::IOERR
                        } else {
                            exitcode::DATAERR
                        }
                    }
                    ApplicationError::Domain(_) => exitcode::SOFTWARE,
                },
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::DomainError;
    use rstest::rstest;

    #[rstest]
    #[case(ApplicationError::ValidationFailed { errors: vec![] }, exitcode::DATAERR)]
    #[case(ApplicationError::unavailable("view", "gone"), exitcode::UNAVAILABLE)]
    #[case(ApplicationError::Config { message: "bad".into() }, exitcode::CONFIG)]
    #[case(
        ApplicationError::Domain(DomainError::ParentResolutionFailure { id: "a".into(), parent: "b".into() }),
        exitcode::SOFTWARE
    )]
    #[case(
        ApplicationError::OperationFailed {
            context: "read".into(),
            source: Box::new(std::io::Error::from(std::io::ErrorKind::NotFound)),
        },
        exitcode::IOERR
    )]
    fn given_application_error_when_mapping_then_sysexits_code(
        #[case] error: ApplicationError,
        #[case] expected: i32,
    ) {
        assert_eq!(CliError::from(error).exit_code(), expected);
    }

    #[test]
    fn given_usage_error_when_mapping_then_usage_code() {
        assert_eq!(CliError::Usage("x".into()).exit_code(), exitcode::USAGE);
    }
}
