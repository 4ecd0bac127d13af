//! Simple in-memory object store
//!

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::info;

use crate::{
    acl::{AccessControlPolicy, Owner},
    model::{ErrorCode, PutObjectOutput, PutObjectRequest, ServiceError},
};

use super::{check_bucket_name, read_body, ObjectStore, ObjectStoreInstance, Result};

struct ObjectRecord {
    data: Arc<[u8]>,
    etag: String,
    acl: AccessControlPolicy,
}

struct BucketRecord {
    objects: HashMap<String, ObjectRecord>,
    acl: AccessControlPolicy,
}

struct MemoryStoreInner {
    bytes_used: usize,
    byte_limit: usize,
    buckets: HashMap<String, BucketRecord>,
}

pub struct MemoryStore {
    content: Arc<Mutex<MemoryStoreInner>>,
}

fn local_owner() -> Owner {
    Owner {
        id: "local".to_string(),
        display_name: "local".to_string(),
    }
}

fn no_such_bucket(bucket: &str) -> ServiceError {
    ServiceError::new(
        ErrorCode::NoSuchBucket,
        format!("bucket '{}' does not exist", bucket),
    )
}

fn no_such_key(bucket: &str, key: &str) -> ServiceError {
    ServiceError::new(
        ErrorCode::NoSuchKey,
        format!("no object '{}' in bucket '{}'", key, bucket),
    )
}

impl MemoryStore {
    pub fn instantiate(byte_limit: usize) -> ObjectStoreInstance {
        Arc::new(Self {
            content: Arc::new(Mutex::new(MemoryStoreInner {
                bytes_used: 0,
                byte_limit,
                buckets: HashMap::new(),
            })),
        }) as ObjectStoreInstance
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn create_bucket(&self, bucket: &str) -> Result<()> {
        check_bucket_name(bucket)?;
        let mut inner = self.content.lock().await;
        if inner.buckets.contains_key(bucket) {
            return Err(ServiceError::new(
                ErrorCode::BucketAlreadyExists,
                format!("bucket '{}' already exists", bucket),
            ));
        }
        inner.buckets.insert(
            bucket.to_string(),
            BucketRecord {
                objects: HashMap::new(),
                acl: AccessControlPolicy::owned_by(local_owner()),
            },
        );
        Ok(())
    }

    async fn put_object(&self, request: PutObjectRequest) -> Result<PutObjectOutput> {
        check_bucket_name(&request.bucket)?;
        // Drain the body before taking the lock, nothing else may hold it
        let data = read_body(request.body)
            .await
            .map_err(|e| ServiceError::internal(format!("error reading body: {}", e)))?;
        let etag = sha256::digest(&data[..]);
        let size = data.len();

        let mut inner = self.content.lock().await;
        let replaced = match inner.buckets.get(&request.bucket) {
            Some(record) => record.objects.get(&request.key).map(|o| o.data.len()),
            None => return Err(no_such_bucket(&request.bucket)),
        };
        let projected = inner
            .bytes_used
            .saturating_sub(replaced.unwrap_or(0))
            .saturating_add(size);
        if projected > inner.byte_limit {
            return Err(ServiceError::new(
                ErrorCode::EntityTooLarge,
                format!("object of {} bytes exceeds the store's quota", size),
            ));
        }
        if let Some(old_size) = replaced {
            info!("replacing {}/{}", request.bucket, request.key);
            inner.bytes_used -= old_size;
        }
        inner.bytes_used += size;
        let record = inner.buckets.get_mut(&request.bucket).unwrap();
        record.objects.insert(
            request.key.clone(),
            ObjectRecord {
                data: data.into(),
                etag: etag.clone(),
                acl: AccessControlPolicy::owned_by(local_owner()),
            },
        );
        Ok(PutObjectOutput {
            etag,
            size: size as u64,
        })
    }

    async fn contains(&self, bucket: &str, key: &str) -> Result<bool> {
        let inner = self.content.lock().await;
        Ok(inner
            .buckets
            .get(bucket)
            .map(|record| record.objects.contains_key(key))
            .unwrap_or(false))
    }

    async fn get_bucket_acl(&self, bucket: &str) -> Result<AccessControlPolicy> {
        let inner = self.content.lock().await;
        inner
            .buckets
            .get(bucket)
            .map(|record| record.acl.clone())
            .ok_or_else(|| no_such_bucket(bucket))
    }

    async fn put_bucket_acl(&self, bucket: &str, policy: AccessControlPolicy) -> Result<()> {
        let mut inner = self.content.lock().await;
        match inner.buckets.get_mut(bucket) {
            Some(record) => {
                record.acl = policy;
                Ok(())
            }
            None => Err(no_such_bucket(bucket)),
        }
    }

    async fn get_object_acl(&self, bucket: &str, key: &str) -> Result<AccessControlPolicy> {
        let inner = self.content.lock().await;
        let record = inner.buckets.get(bucket).ok_or_else(|| no_such_bucket(bucket))?;
        record
            .objects
            .get(key)
            .map(|object| object.acl.clone())
            .ok_or_else(|| no_such_key(bucket, key))
    }

    async fn put_object_acl(
        &self,
        bucket: &str,
        key: &str,
        policy: AccessControlPolicy,
    ) -> Result<()> {
        let mut inner = self.content.lock().await;
        let record = inner
            .buckets
            .get_mut(bucket)
            .ok_or_else(|| no_such_bucket(bucket))?;
        match record.objects.get_mut(key) {
            Some(object) => {
                object.acl = policy;
                Ok(())
            }
            None => Err(no_such_key(bucket, key)),
        }
    }
}

#[cfg(test)]
mod test {
    use crate::acl::Permission;
    use crate::model::{ErrorCode, PutObjectRequest};

    use super::super::{ObjectStore, Result};
    use super::MemoryStore;

    const MEGABYTE: usize = 1024 * 1024;

    #[tokio::test]
    async fn new_store_has_no_buckets() -> Result<()> {
        let memory = MemoryStore::instantiate(MEGABYTE);
        assert!(!memory.contains("demo", "hello").await?);
        Ok(())
    }

    #[tokio::test]
    async fn can_create_bucket_and_put_object() -> Result<()> {
        let memory = MemoryStore::instantiate(MEGABYTE);
        memory.create_bucket("demo").await?;
        let output = memory
            .put_object(PutObjectRequest::from_bytes("demo", "hello", b"hello".to_vec()))
            .await?;
        assert_eq!(output.size, 5);
        assert_eq!(output.etag, sha256::digest(&b"hello"[..]));
        assert!(memory.contains("demo", "hello").await?);
        Ok(())
    }

    #[tokio::test]
    async fn duplicate_bucket_is_rejected() -> Result<()> {
        let memory = MemoryStore::instantiate(MEGABYTE);
        memory.create_bucket("demo").await?;
        let error = memory.create_bucket("demo").await.unwrap_err();
        assert_eq!(error.code, ErrorCode::BucketAlreadyExists);
        Ok(())
    }

    #[tokio::test]
    async fn invalid_bucket_name_is_rejected() {
        let memory = MemoryStore::instantiate(MEGABYTE);
        let error = memory.create_bucket("Not A Bucket").await.unwrap_err();
        assert_eq!(error.code, ErrorCode::InvalidBucketName);
    }

    #[tokio::test]
    async fn put_into_missing_bucket_fails() {
        let memory = MemoryStore::instantiate(MEGABYTE);
        let error = memory
            .put_object(PutObjectRequest::from_bytes("demo", "hello", b"hello".to_vec()))
            .await
            .unwrap_err();
        assert_eq!(error.code, ErrorCode::NoSuchBucket);
    }

    #[tokio::test]
    async fn quota_is_enforced() -> Result<()> {
        let memory = MemoryStore::instantiate(8);
        memory.create_bucket("demo").await?;
        let error = memory
            .put_object(PutObjectRequest::from_bytes(
                "demo",
                "big",
                b"far too much data".to_vec(),
            ))
            .await
            .unwrap_err();
        assert_eq!(error.code, ErrorCode::EntityTooLarge);
        assert!(!memory.contains("demo", "big").await?);
        Ok(())
    }

    #[tokio::test]
    async fn overwriting_frees_the_old_size() -> Result<()> {
        let memory = MemoryStore::instantiate(8);
        memory.create_bucket("demo").await?;
        memory
            .put_object(PutObjectRequest::from_bytes("demo", "k", b"12345678".to_vec()))
            .await?;
        // Same key again at the same size fits because the old copy goes
        memory
            .put_object(PutObjectRequest::from_bytes("demo", "k", b"abcdefgh".to_vec()))
            .await?;
        Ok(())
    }

    #[tokio::test]
    async fn shrinking_overwrite_frees_quota_for_new_objects() -> Result<()> {
        let memory = MemoryStore::instantiate(8);
        memory.create_bucket("demo").await?;
        memory
            .put_object(PutObjectRequest::from_bytes("demo", "k", b"12345678".to_vec()))
            .await?;
        memory
            .put_object(PutObjectRequest::from_bytes("demo", "k", b"12".to_vec()))
            .await?;
        // The six bytes the shrink released are usable again
        memory
            .put_object(PutObjectRequest::from_bytes("demo", "other", b"123456".to_vec()))
            .await?;
        Ok(())
    }

    #[tokio::test]
    async fn fresh_bucket_grants_owner_full_control() -> Result<()> {
        let memory = MemoryStore::instantiate(MEGABYTE);
        memory.create_bucket("demo").await?;
        let policy = memory.get_bucket_acl("demo").await?;
        assert_eq!(policy.grants.len(), 1);
        assert_eq!(policy.grants[0].grantee.id, policy.owner.id);
        assert_eq!(policy.grants[0].permission, Permission::FullControl);
        Ok(())
    }

    #[tokio::test]
    async fn object_acl_round_trips() -> Result<()> {
        let memory = MemoryStore::instantiate(MEGABYTE);
        memory.create_bucket("demo").await?;
        memory
            .put_object(PutObjectRequest::from_bytes("demo", "hello", b"hello".to_vec()))
            .await?;
        let policy = memory.get_object_acl("demo", "hello").await?;
        let updated = policy.with_grant("friend-1", Permission::Read);
        memory.put_object_acl("demo", "hello", updated.clone()).await?;
        assert_eq!(memory.get_object_acl("demo", "hello").await?, updated);
        Ok(())
    }

    #[tokio::test]
    async fn acl_of_missing_object_fails() -> Result<()> {
        let memory = MemoryStore::instantiate(MEGABYTE);
        memory.create_bucket("demo").await?;
        let error = memory.get_object_acl("demo", "hello").await.unwrap_err();
        assert_eq!(error.code, ErrorCode::NoSuchKey);
        Ok(())
    }
}
