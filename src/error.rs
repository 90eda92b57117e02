/// Main error type for the crate.
#[derive(Debug)]
pub enum BenchError {
    /// Used when the user pass a logical invalid parameter to a function.
    InvalidParameter(String),
    Io(std::io::Error),
    Parser(String),
    /// A named sequence was requested but the dataset does not contain it.
    SequenceNotFound(String),
    /// Registration failed while `suspend_on_failure` was set.
    RegistrationAborted {
        sequence: String,
        frame_index: usize,
        message: String,
    },
    /// Saving a trajectory or the benchmark report failed while
    /// `suspend_on_failure` was set.
    PersistenceFailed(String),
}

impl std::fmt::Display for BenchError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            BenchError::InvalidParameter(err) => write!(f, "Parameter error: {err}"),
            BenchError::Io(err) => write!(f, "IO error: {err}"),
            BenchError::Parser(err) => write!(f, "Parser error: {err}"),
            BenchError::SequenceNotFound(name) => {
                write!(f, "Could not find the sequence {name}")
            }
            BenchError::RegistrationAborted {
                sequence,
                frame_index,
                message,
            } => write!(
                f,
                "Registration failed for sequence {sequence} at frame index {frame_index}: {message}"
            ),
            BenchError::PersistenceFailed(err) => write!(f, "Persistence error: {err}"),
        }
    }
}

impl BenchError {
    /// Create a error with the kind `InvalidParameter`.
    /// # Arguments
    /// * `msg` - The error message.
    pub fn invalid_parameter<T: ToString>(msg: T) -> Self {
        BenchError::InvalidParameter(msg.to_string())
    }
}

impl From<std::io::Error> for BenchError {
    fn from(err: std::io::Error) -> Self {
        BenchError::Io(err)
    }
}

impl std::error::Error for BenchError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            BenchError::Io(err) => Some(err),
            _ => None,
        }
    }
}
