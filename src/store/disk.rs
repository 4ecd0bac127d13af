//! On-disk object store backend
//!

use std::{
    io::ErrorKind,
    path::{Component, Path, PathBuf},
    sync::Arc,
};

use async_trait::async_trait;
use tokio::fs;
use tracing::debug;

use crate::{
    acl::{AccessControlPolicy, Owner},
    model::{ErrorCode, PutObjectOutput, PutObjectRequest, ServiceError},
};

use super::{check_bucket_name, read_body, ObjectStore, ObjectStoreInstance, Result};

// Bucket layout under the root:
//   <bucket>/data/<key>              object bytes
//   <bucket>/tmp/                    in-flight uploads
//   <bucket>/acl/_bucket.json        bucket policy
//   <bucket>/acl/objects/<key>.json  object policy
//
// Keys are caller-chosen, so object sidecars and scratch files each get a
// directory of their own; no key can alias the bucket policy or another
// object's temp file.

pub struct DiskStore {
    base: PathBuf,
}

fn io_error(err: std::io::Error, missing: ErrorCode, what: &str) -> ServiceError {
    match err.kind() {
        ErrorKind::NotFound => ServiceError::new(missing, format!("{} not found", what)),
        _ => ServiceError::internal(format!("io error on {}: {:?}", what, err)),
    }
}

fn check_key(key: &str) -> Result<()> {
    let path = Path::new(key);
    let sane = !key.is_empty()
        && path.is_relative()
        && path.components().all(|c| matches!(c, Component::Normal(_)));
    if sane {
        Ok(())
    } else {
        Err(ServiceError::new(
            ErrorCode::InvalidArgument,
            format!("'{}' is not a usable object key", key),
        ))
    }
}

fn local_owner() -> Owner {
    Owner {
        id: "local".to_string(),
        display_name: "local".to_string(),
    }
}

impl DiskStore {
    pub fn instantiate(base: &Path) -> std::io::Result<ObjectStoreInstance> {
        let base = base.to_path_buf();
        std::fs::create_dir_all(&base)?;
        Ok(Arc::new(Self { base }) as ObjectStoreInstance)
    }

    fn bucket_path(&self, bucket: &str) -> PathBuf {
        self.base.join(bucket)
    }

    fn data_path(&self, bucket: &str, key: &str) -> PathBuf {
        self.base.join(bucket).join("data").join(key)
    }

    fn bucket_acl_path(&self, bucket: &str) -> PathBuf {
        self.base.join(bucket).join("acl").join("_bucket.json")
    }

    fn object_acl_path(&self, bucket: &str, key: &str) -> PathBuf {
        self.base
            .join(bucket)
            .join("acl")
            .join("objects")
            .join(format!("{}.json", key))
    }

    async fn require_bucket(&self, bucket: &str) -> Result<()> {
        check_bucket_name(bucket)?;
        match fs::metadata(self.bucket_path(bucket)).await {
            Ok(meta) if meta.is_dir() => Ok(()),
            Ok(_) => Err(ServiceError::internal(format!(
                "bucket path for '{}' is not a directory",
                bucket
            ))),
            Err(e) => Err(io_error(e, ErrorCode::NoSuchBucket, bucket)),
        }
    }

    async fn write_policy(&self, path: &Path, policy: &AccessControlPolicy) -> Result<()> {
        let body = serde_json::to_vec_pretty(policy)
            .map_err(|e| ServiceError::internal(format!("cannot encode policy: {}", e)))?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| io_error(e, ErrorCode::InternalError, "acl directory"))?;
        }
        fs::write(path, body)
            .await
            .map_err(|e| io_error(e, ErrorCode::InternalError, "acl sidecar"))
    }

    async fn read_policy(&self, path: &Path, missing: ErrorCode) -> Result<AccessControlPolicy> {
        let body = fs::read(path)
            .await
            .map_err(|e| io_error(e, missing, "acl sidecar"))?;
        serde_json::from_slice(&body)
            .map_err(|e| ServiceError::internal(format!("corrupt acl sidecar: {}", e)))
    }
}

#[async_trait]
impl ObjectStore for DiskStore {
    async fn create_bucket(&self, bucket: &str) -> Result<()> {
        check_bucket_name(bucket)?;
        let path = self.bucket_path(bucket);
        if fs::metadata(&path).await.is_ok() {
            return Err(ServiceError::new(
                ErrorCode::BucketAlreadyExists,
                format!("bucket '{}' already exists", bucket),
            ));
        }
        fs::create_dir_all(path.join("data"))
            .await
            .map_err(|e| io_error(e, ErrorCode::InternalError, bucket))?;
        fs::create_dir_all(path.join("acl"))
            .await
            .map_err(|e| io_error(e, ErrorCode::InternalError, bucket))?;
        self.write_policy(
            &self.bucket_acl_path(bucket),
            &AccessControlPolicy::owned_by(local_owner()),
        )
        .await
    }

    async fn put_object(&self, request: PutObjectRequest) -> Result<PutObjectOutput> {
        self.require_bucket(&request.bucket).await?;
        check_key(&request.key)?;

        let data = read_body(request.body)
            .await
            .map_err(|e| ServiceError::internal(format!("error reading body: {}", e)))?;
        let etag = sha256::digest(&data[..]);
        let size = data.len() as u64;

        let target = self.data_path(&request.bucket, &request.key);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| io_error(e, ErrorCode::InternalError, "object directory"))?;
        }

        // Write to a scratch path then rename so a crash never leaves a
        // half-written object at the final name. The scratch lives in its
        // own directory under a generated name; a sibling of the target
        // could collide with a stored object whose key carries the suffix
        let scratch = self.bucket_path(&request.bucket).join("tmp");
        fs::create_dir_all(&scratch)
            .await
            .map_err(|e| io_error(e, ErrorCode::InternalError, "scratch directory"))?;
        let writing = scratch.join(format!("{}.tmp", uuid::Uuid::new_v4()));
        fs::write(&writing, &data)
            .await
            .map_err(|e| io_error(e, ErrorCode::InternalError, "object data"))?;
        fs::rename(&writing, &target)
            .await
            .map_err(|e| io_error(e, ErrorCode::InternalError, "object data"))?;
        debug!("stored {}/{} ({} bytes)", request.bucket, request.key, size);

        // A rewritten object starts over with the default policy
        self.write_policy(
            &self.object_acl_path(&request.bucket, &request.key),
            &AccessControlPolicy::owned_by(local_owner()),
        )
        .await?;

        Ok(PutObjectOutput { etag, size })
    }

    async fn contains(&self, bucket: &str, key: &str) -> Result<bool> {
        check_key(key)?;
        match fs::metadata(self.data_path(bucket, key)).await {
            Ok(_) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(io_error(e, ErrorCode::InternalError, key)),
        }
    }

    async fn get_bucket_acl(&self, bucket: &str) -> Result<AccessControlPolicy> {
        self.require_bucket(bucket).await?;
        self.read_policy(&self.bucket_acl_path(bucket), ErrorCode::NoSuchBucket)
            .await
    }

    async fn put_bucket_acl(&self, bucket: &str, policy: AccessControlPolicy) -> Result<()> {
        self.require_bucket(bucket).await?;
        self.write_policy(&self.bucket_acl_path(bucket), &policy).await
    }

    async fn get_object_acl(&self, bucket: &str, key: &str) -> Result<AccessControlPolicy> {
        self.require_bucket(bucket).await?;
        check_key(key)?;
        self.read_policy(&self.object_acl_path(bucket, key), ErrorCode::NoSuchKey)
            .await
    }

    async fn put_object_acl(
        &self,
        bucket: &str,
        key: &str,
        policy: AccessControlPolicy,
    ) -> Result<()> {
        self.require_bucket(bucket).await?;
        check_key(key)?;
        if !self.contains(bucket, key).await? {
            return Err(ServiceError::new(
                ErrorCode::NoSuchKey,
                format!("no object '{}' in bucket '{}'", key, bucket),
            ));
        }
        self.write_policy(&self.object_acl_path(bucket, key), &policy)
            .await
    }
}
