use thiserror::Error;

/// Shorthand result used throughout the crate.
pub type Result<T> = std::result::Result<T, MartechError>;

/// Everything that can go wrong when talking to a device or running a
/// procedure. Device answers that are simply "no" (a setting that did not
/// take) are reported as `Ok(false)` by the drivers, these variants are for
/// the cases where the exchange itself failed.
#[derive(Error, Debug)]
pub enum MartechError {
    /// Local file or stdin/stdout failure.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The serial port could not be opened or configured.
    #[error("serial port error: {0}")]
    Serial(#[from] serialport::Error),

    /// A configuration file was missing or did not deserialise.
    #[error("config error: {0}")]
    Config(#[from] config::ConfigError),

    /// A configuration could not be written back out.
    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// The device answered, but the answer did not contain the field we
    /// were looking for.
    #[error("no match for {pattern:?} in reply to {command:?}: {response:?}")]
    NoMatch {
        /// Command that was sent.
        command: String,
        /// Pattern or field that was expected.
        pattern: String,
        /// Raw reply from the device.
        response: String,
    },

    /// A field was found but could not be converted.
    #[error("could not parse {field} from {value:?}")]
    Parse {
        /// Name of the field.
        field: &'static str,
        /// Raw value.
        value: String,
    },

    /// The controller answered with a NAK.
    #[error("{0} was not acknowledged")]
    Nak(String),

    /// A bulk transfer stopped delivering data.
    #[error("transfer of {filename} stalled after {received} bytes")]
    TransferStalled {
        /// File being transferred.
        filename: String,
        /// Payload bytes received before the stall.
        received: usize,
    },

    /// An argument was outside of what the device accepts.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The device refused a command after all retries.
    #[error("{0}")]
    Rejected(String),
}

impl MartechError {
    /// Helper for the very common "regex did not match" case.
    pub fn no_match(command: &str, pattern: &str, response: &str) -> Self {
        Self::NoMatch {
            command: command.to_string(),
            pattern: pattern.to_string(),
            response: response.to_string(),
        }
    }

    /// Helper for a field that failed to convert.
    pub fn parse(field: &'static str, value: &str) -> Self {
        Self::Parse {
            field,
            value: value.to_string(),
        }
    }
}
