//! Request, outcome and error types for object store operations
//!

use std::{fmt, io::Cursor, pin::Pin};

use tokio::io::AsyncRead;

/// Byte source for an object body. Owned by the request until the
/// operation completes; must not be rewound or dropped while in flight.
pub type ObjectBody = Pin<Box<dyn AsyncRead + Send + Sync + 'static>>;

/// One upload, immutable once submitted.
pub struct PutObjectRequest {
    pub bucket: String,
    pub key: String,
    pub body: ObjectBody,
}

impl PutObjectRequest {
    pub fn new(bucket: &str, key: &str, body: ObjectBody) -> Self {
        Self {
            bucket: bucket.to_string(),
            key: key.to_string(),
            body,
        }
    }

    pub fn from_bytes(bucket: &str, key: &str, data: Vec<u8>) -> Self {
        Self::new(bucket, key, Box::pin(Cursor::new(data)))
    }
}

impl fmt::Debug for PutObjectRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PutObjectRequest")
            .field("bucket", &self.bucket)
            .field("key", &self.key)
            .finish_non_exhaustive()
    }
}

/// Correlation token attached to a submission. Used only for logging and
/// identification, never for dispatch.
#[derive(Debug, Clone)]
pub struct CallerContext {
    uuid: String,
}

impl CallerContext {
    pub fn new() -> Self {
        Self {
            uuid: uuid::Uuid::new_v4().to_string(),
        }
    }

    pub fn with_uuid(uuid: &str) -> Self {
        Self {
            uuid: uuid.to_string(),
        }
    }

    pub fn uuid(&self) -> &str {
        &self.uuid
    }
}

impl Default for CallerContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Success payload of a completed upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PutObjectOutput {
    pub etag: String,
    pub size: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    AccessDenied,
    NoSuchBucket,
    NoSuchKey,
    BucketAlreadyExists,
    InvalidBucketName,
    InvalidArgument,
    EntityTooLarge,
    InternalError,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::AccessDenied => "AccessDenied",
            ErrorCode::NoSuchBucket => "NoSuchBucket",
            ErrorCode::NoSuchKey => "NoSuchKey",
            ErrorCode::BucketAlreadyExists => "BucketAlreadyExists",
            ErrorCode::InvalidBucketName => "InvalidBucketName",
            ErrorCode::InvalidArgument => "InvalidArgument",
            ErrorCode::EntityTooLarge => "EntityTooLarge",
            ErrorCode::InternalError => "InternalError",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure arm of an outcome: an error name plus a human readable message.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{code}: {message}")]
pub struct ServiceError {
    pub code: ErrorCode,
    pub message: String,
}

impl ServiceError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }
}

/// The tagged result of one asynchronous operation, produced exactly once
/// per submitted request.
pub type PutObjectOutcome = Result<PutObjectOutput, ServiceError>;

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn error_displays_code_and_message_verbatim() {
        let error = ServiceError::new(ErrorCode::AccessDenied, "you shall not pass");
        assert_eq!(format!("{}", error), "AccessDenied: you shall not pass");
    }

    #[test]
    fn fresh_contexts_get_distinct_tokens() {
        let one = CallerContext::new();
        let two = CallerContext::new();
        assert_ne!(one.uuid(), two.uuid());
    }

    #[test]
    fn context_keeps_a_supplied_token() {
        let context = CallerContext::with_uuid("fixed-token");
        assert_eq!(context.uuid(), "fixed-token");
    }
}
