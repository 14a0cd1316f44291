use crate::utils::error::SessionError;

/// Outcome of a request, reported synchronously.
///
/// An `Ok` code means the request was accepted, not that it succeeded; the
/// eventual outcome reaches registered watchers later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResultCode {
    Ok,
    UnexpectedFailure,
    SessionAlreadyExists,
    BadEndpointScheme,
    NoActiveSession,
    InvalidTopic,
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use]
pub struct Response {
    pub code: ResultCode,
    pub message: String,
}

impl Response {
    pub fn ok() -> Self {
        Self::new(ResultCode::Ok, "")
    }

    pub fn new(code: ResultCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.code == ResultCode::Ok
    }

    pub fn failed(&self) -> bool {
        !self.is_ok()
    }

    pub fn into_result(self) -> Result<(), SessionError> {
        if self.is_ok() {
            Ok(())
        } else {
            Err(SessionError {
                code: self.code,
                message: self.message,
            })
        }
    }
}
