use std::fmt;

#[derive(Debug)]
pub struct Error {
    msg: String,
}

impl Error {
    pub fn msg<M: Into<String>>(msg: M) -> Self {
        Self { msg: msg.into() }
    }

    pub fn context(self, what: impl fmt::Display) -> Self {
        Self::msg(format!("{what}: {}", self.msg))
    }

    pub fn message(&self) -> &str {
        &self.msg
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.msg)
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::msg(format!("I/O error: {err}"))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::msg(format!("JSON error: {err}"))
    }
}

impl From<json5::Error> for Error {
    fn from(err: json5::Error) -> Self {
        Self::msg(format!("config parse error: {err}"))
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_prefixes_message() {
        let err = Error::msg("port out of range").context("invalid value for 'gateway'");
        assert_eq!(err.message(), "invalid value for 'gateway': port out of range");
    }

    #[test]
    fn io_errors_are_labelled() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        assert_eq!(Error::from(io).to_string(), "I/O error: denied");
    }
}
