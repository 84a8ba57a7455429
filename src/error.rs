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

//! Errors returned by blobpath.
//!
//! Every public operation returns [`Result<T>`]. Callers that need to branch
//! on the failure class should match on [`Error::kind`]:
//!
//! ```no_run
//! # use blobpath::{ErrorKind, Operator};
//! # async fn example(op: Operator) {
//! if let Err(e) = op.stat("gs://bucket/missing").await {
//!     if e.kind() == ErrorKind::NotFound {
//!         println!("object does not exist")
//!     }
//! }
//! # }
//! ```

use std::fmt;
use std::fmt::Debug;
use std::fmt::Display;
use std::fmt::Formatter;
use std::io;

/// Result that is a wrapper of `std::result::Result<T, blobpath::Error>`.
pub type Result<T> = std::result::Result<T, Error>;

/// ErrorKind is all kinds of errors of blobpath.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum ErrorKind {
    /// blobpath doesn't know what happened here, and no actions other than
    /// returning it back. For example, the service returns an internal error.
    Unexpected,
    /// The operation is not supported by the path's backend.
    Unsupported,
    /// The configuration or credentials are invalid or missing.
    ConfigInvalid,
    /// The path does not exist.
    NotFound,
    /// The path already exists and overwriting is disabled.
    AlreadyExists,
    /// The request was rejected by the service's authorization.
    PermissionDenied,
    /// The path refers to a directory while a file was expected.
    IsADirectory,
    /// The path refers to something that is not a directory.
    NotADirectory,
    /// The directory cannot be removed because it still has entries.
    DirectoryNotEmpty,
    /// A conditional request failed because the object changed underneath us.
    ConditionNotMatch,
    /// Another writer advanced the same object while our stream was open.
    ConcurrentWrite,
    /// The requested byte range lies past the end of the object.
    RangeNotSatisfied,
}

impl ErrorKind {
    /// Convert self into static str.
    pub fn into_static(self) -> &'static str {
        self.into()
    }
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.into_static())
    }
}

impl From<ErrorKind> for &'static str {
    fn from(v: ErrorKind) -> &'static str {
        match v {
            ErrorKind::Unexpected => "Unexpected",
            ErrorKind::Unsupported => "Unsupported",
            ErrorKind::ConfigInvalid => "ConfigInvalid",
            ErrorKind::NotFound => "NotFound",
            ErrorKind::AlreadyExists => "AlreadyExists",
            ErrorKind::PermissionDenied => "PermissionDenied",
            ErrorKind::IsADirectory => "IsADirectory",
            ErrorKind::NotADirectory => "NotADirectory",
            ErrorKind::DirectoryNotEmpty => "DirectoryNotEmpty",
            ErrorKind::ConditionNotMatch => "ConditionNotMatch",
            ErrorKind::ConcurrentWrite => "ConcurrentWrite",
            ErrorKind::RangeNotSatisfied => "RangeNotSatisfied",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ErrorStatus {
    /// Permanent means without external changes, the error never changes.
    Permanent,
    /// Temporary means this error is returned for a temporary reason and the
    /// request is safe to retry.
    Temporary,
    /// Persistent means this error used to be temporary but retries have been
    /// exhausted.
    Persistent,
}

impl Display for ErrorStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            ErrorStatus::Permanent => write!(f, "permanent"),
            ErrorStatus::Temporary => write!(f, "temporary"),
            ErrorStatus::Persistent => write!(f, "persistent"),
        }
    }
}

/// Error is the error type of blobpath.
pub struct Error {
    kind: ErrorKind,
    message: String,

    status: ErrorStatus,
    operation: &'static str,
    context: Vec<(&'static str, String)>,
    source: Option<anyhow::Error>,
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}) at {}", self.kind, self.status, self.operation)?;

        if !self.context.is_empty() {
            write!(f, ", context: {{ ")?;
            write!(
                f,
                "{}",
                self.context
                    .iter()
                    .map(|(k, v)| format!("{k}: {v}"))
                    .collect::<Vec<_>>()
                    .join(", ")
            )?;
            write!(f, " }}")?;
        }

        write!(f, " => {}", self.message)
    }
}

impl Debug for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} ({}) at {} => {}",
            self.kind, self.status, self.operation, self.message
        )?;
        if !self.context.is_empty() {
            writeln!(f)?;
            writeln!(f, "Context:")?;
            for (k, v) in self.context.iter() {
                writeln!(f, "    {k}: {v}")?;
            }
        }
        if let Some(source) = &self.source {
            writeln!(f)?;
            writeln!(f, "Source: {source:?}")?;
        }

        Ok(())
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source.as_ref().map(|v| v.as_ref())
    }
}

impl Error {
    /// Create a new Error with error kind and message.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),

            status: ErrorStatus::Permanent,
            operation: "",
            context: Vec::default(),
            source: None,
        }
    }

    /// Update error's operation.
    ///
    /// If the error already carries an operation, the old one is pushed into
    /// the context as `called`.
    pub fn with_operation(mut self, operation: &'static str) -> Self {
        if !self.operation.is_empty() {
            self.context.push(("called", self.operation.to_string()));
        }

        self.operation = operation;
        self
    }

    /// Add more context to the error.
    pub fn with_context(mut self, key: &'static str, value: impl Into<String>) -> Self {
        self.context.push((key, value.into()));
        self
    }

    /// Set the source of the error.
    pub fn with_source(mut self, src: impl Into<anyhow::Error>) -> Self {
        debug_assert!(self.source.is_none(), "source has been set");

        self.source = Some(src.into());
        self
    }

    /// Mark the error as temporary: the same request may succeed on retry.
    pub fn set_temporary(mut self) -> Self {
        self.status = ErrorStatus::Temporary;
        self
    }

    /// Mark the error as persistent: it was temporary but retries were
    /// exhausted.
    pub fn set_persistent(mut self) -> Self {
        self.status = ErrorStatus::Persistent;
        self
    }

    /// Return the error's kind.
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Check if this error is temporary.
    pub fn is_temporary(&self) -> bool {
        self.status == ErrorStatus::Temporary
    }
}

impl From<Error> for io::Error {
    fn from(err: Error) -> Self {
        let kind = match err.kind() {
            ErrorKind::NotFound => io::ErrorKind::NotFound,
            ErrorKind::AlreadyExists => io::ErrorKind::AlreadyExists,
            ErrorKind::PermissionDenied => io::ErrorKind::PermissionDenied,
            ErrorKind::Unsupported => io::ErrorKind::Unsupported,
            _ => io::ErrorKind::Other,
        };

        io::Error::new(kind, err)
    }
}

/// Convert a `std::io::Error` raised by a local filesystem operation.
pub(crate) fn new_std_io_error(err: io::Error) -> Error {
    let kind = match err.kind() {
        io::ErrorKind::NotFound => ErrorKind::NotFound,
        io::ErrorKind::AlreadyExists => ErrorKind::AlreadyExists,
        io::ErrorKind::PermissionDenied => ErrorKind::PermissionDenied,
        _ => ErrorKind::Unexpected,
    };

    let message = err.to_string();
    Error::new(kind, message).with_source(err)
}

/// Error raised while building a http request.
pub(crate) fn new_request_build_error(err: http::Error) -> Error {
    Error::new(ErrorKind::Unexpected, "building http request")
        .with_operation("http::Request::build")
        .with_source(err)
}

/// Error raised while deserializing a json response body.
pub(crate) fn new_json_deserialize_error(err: serde_json::Error) -> Error {
    Error::new(ErrorKind::Unexpected, "deserializing json").with_source(err)
}

/// Error raised while deserializing an xml response body.
pub(crate) fn new_xml_deserialize_error(err: quick_xml::DeError) -> Error {
    Error::new(ErrorKind::Unexpected, "deserializing xml").with_source(err)
}
