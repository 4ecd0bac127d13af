//! Object store seam standing in for the external service client
//!

use std::sync::Arc;

use async_trait::async_trait;
use bytes::BytesMut;
use lazy_static::lazy_static;
use regex::Regex;
use tokio::io::AsyncReadExt;

use crate::{
    acl::AccessControlPolicy,
    model::{
        CallerContext, ErrorCode, ObjectBody, PutObjectOutcome, PutObjectOutput, PutObjectRequest,
        ServiceError,
    },
};

type Result<T, E = ServiceError> = std::result::Result<T, E>;

/// Invoked exactly once with the final outcome of a submission, on a
/// runtime worker, strictly after the submission entry point returned.
pub type CompletionHandler = Box<dyn FnOnce(CallerContext, PutObjectOutcome) + Send + 'static>;

/// The collaborator boundary: everything behind this trait (transport,
/// retries, durability) is the store's own business.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn create_bucket(&self, bucket: &str) -> Result<()>;

    async fn put_object(&self, request: PutObjectRequest) -> Result<PutObjectOutput>;

    async fn contains(&self, bucket: &str, key: &str) -> Result<bool>;

    async fn get_bucket_acl(&self, bucket: &str) -> Result<AccessControlPolicy>;

    async fn put_bucket_acl(&self, bucket: &str, policy: AccessControlPolicy) -> Result<()>;

    async fn get_object_acl(&self, bucket: &str, key: &str) -> Result<AccessControlPolicy>;

    async fn put_object_acl(
        &self,
        bucket: &str,
        key: &str,
        policy: AccessControlPolicy,
    ) -> Result<()>;
}

pub type ObjectStoreInstance = Arc<dyn ObjectStore>;

/// Non-blocking operations layered over any shared store handle.
pub trait ObjectStoreExt {
    /// Hand off an upload without waiting for it. The store runs the
    /// operation on a worker of its own and invokes `on_complete` exactly
    /// once with the final outcome and the untouched caller context.
    fn put_object_async(
        &self,
        request: PutObjectRequest,
        context: CallerContext,
        on_complete: CompletionHandler,
    );
}

impl<S: ObjectStore + ?Sized + 'static> ObjectStoreExt for Arc<S> {
    fn put_object_async(
        &self,
        request: PutObjectRequest,
        context: CallerContext,
        on_complete: CompletionHandler,
    ) {
        let store = Arc::clone(self);
        tokio::spawn(async move {
            let outcome = store.put_object(request).await;
            on_complete(context, outcome);
        });
    }
}

lazy_static! {
    static ref BUCKET_NAME: Regex = Regex::new("^[a-z0-9][a-z0-9.-]{1,61}[a-z0-9]$").unwrap();
}

pub(crate) fn check_bucket_name(name: &str) -> Result<()> {
    if BUCKET_NAME.is_match(name) {
        Ok(())
    } else {
        Err(ServiceError::new(
            ErrorCode::InvalidBucketName,
            format!("'{}' is not a valid bucket name", name),
        ))
    }
}

const READ_CHUNK: usize = 64 * 1024;

/// Drain a request body into memory. The body is consumed; per the
/// submission contract nobody else holds it while the operation runs.
pub(crate) async fn read_body(mut body: ObjectBody) -> std::io::Result<Vec<u8>> {
    let mut data = BytesMut::with_capacity(READ_CHUNK);
    loop {
        let bytes = body.read_buf(&mut data).await?;
        if bytes == 0 {
            break;
        }
    }
    Ok(data.freeze().to_vec())
}

pub mod disk;
pub mod memory;
