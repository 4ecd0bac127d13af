//! Completion gate for non-blocking uploads
//!
//! Coordinates the submitting task and the store's completion handler
//! around a single in-flight upload: submit hands the request off without
//! waiting, `await_completion` blocks until the handler has delivered the
//! one and only outcome.

use std::{path::Path, sync::Arc, time::Duration};

use tokio::fs;
use tracing::{error, info};

use crate::{
    model::{CallerContext, PutObjectRequest},
    signal::CompletionSignal,
    store::{ObjectStoreExt, ObjectStoreInstance},
};

/// One gate handles at most one in-flight upload at a time; its signal is
/// owned by the instance and shared only with the completion handler, so
/// concurrent uploads simply use one gate each.
///
/// Per upload the gate moves Idle -> Submitted -> Completed; a later
/// `submit` re-arms the signal and starts a fresh cycle. There is no
/// cancellation: once handed off, the upload runs to success or failure.
pub struct CompletionGate {
    signal: Arc<CompletionSignal>,
}

impl CompletionGate {
    pub fn new() -> Self {
        Self {
            signal: Arc::new(CompletionSignal::new()),
        }
    }

    /// Hand `source` off to the store as `bucket`/`key` without waiting.
    ///
    /// Returns false (starting no asynchronous work and leaving the signal
    /// untouched) if the source file is missing or unreadable; returns
    /// true once the upload has been handed off. The outcome itself is
    /// logged by the completion handler; observe completion through
    /// `await_completion`.
    pub async fn submit(
        &self,
        store: ObjectStoreInstance,
        bucket: &str,
        key: &str,
        source: &Path,
    ) -> bool {
        match fs::metadata(source).await {
            Ok(meta) if meta.is_file() => {}
            _ => {
                error!(
                    "NoSuchFile: the specified file {} does not exist",
                    source.display()
                );
                return false;
            }
        }
        let file = match fs::File::open(source).await {
            Ok(file) => file,
            Err(e) => {
                error!("NoSuchFile: cannot read {}: {}", source.display(), e);
                return false;
            }
        };

        let request = PutObjectRequest::new(bucket, key, Box::pin(file));
        let context = CallerContext::new();
        info!("uploading {} as {}/{}", context.uuid(), bucket, key);

        self.signal.arm();
        let signal = Arc::clone(&self.signal);
        store.put_object_async(
            request,
            context,
            Box::new(move |context, outcome| {
                // Log first, then flip the flag; the signal's lock is never
                // held around the logging
                match &outcome {
                    Ok(output) => {
                        info!("finished uploading {} (etag {})", context.uuid(), output.etag)
                    }
                    Err(e) => error!("upload {} failed: {}", context.uuid(), e),
                }
                signal.complete();
            }),
        );
        true
    }

    /// Block until the in-flight upload's handler has run. The only
    /// suspension point in the flow; waits forever if the store never
    /// completes the handoff.
    pub async fn await_completion(&self) {
        self.signal.wait().await;
    }

    /// Bounded wait; true if the upload completed within the limit.
    pub async fn await_completion_timeout(&self, limit: Duration) -> bool {
        self.signal.wait_timeout(limit).await
    }

    /// Whether the current cycle has seen its completion.
    pub fn is_complete(&self) -> bool {
        self.signal.is_complete()
    }
}

impl Default for CompletionGate {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod test {
    use std::io::Write;
    use std::path::Path;
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;

    use super::CompletionGate;
    use crate::acl::AccessControlPolicy;
    use crate::model::{ErrorCode, PutObjectOutput, PutObjectRequest, ServiceError};
    use crate::store::{memory::MemoryStore, ObjectStore, ObjectStoreInstance};

    const MEGABYTE: usize = 1024 * 1024;

    fn scratch_file(dir: &Path, name: &str, content: &[u8]) -> std::path::PathBuf {
        let path = dir.join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(content).unwrap();
        path
    }

    /// Store that reports AccessDenied for every upload.
    struct DenyingStore;

    #[async_trait]
    impl ObjectStore for DenyingStore {
        async fn create_bucket(&self, _bucket: &str) -> Result<(), ServiceError> {
            Ok(())
        }
        async fn put_object(
            &self,
            _request: PutObjectRequest,
        ) -> Result<PutObjectOutput, ServiceError> {
            Err(ServiceError::new(
                ErrorCode::AccessDenied,
                "this store denies everything",
            ))
        }
        async fn contains(&self, _bucket: &str, _key: &str) -> Result<bool, ServiceError> {
            Ok(false)
        }
        async fn get_bucket_acl(&self, _bucket: &str) -> Result<AccessControlPolicy, ServiceError> {
            unimplemented!()
        }
        async fn put_bucket_acl(
            &self,
            _bucket: &str,
            _policy: AccessControlPolicy,
        ) -> Result<(), ServiceError> {
            unimplemented!()
        }
        async fn get_object_acl(
            &self,
            _bucket: &str,
            _key: &str,
        ) -> Result<AccessControlPolicy, ServiceError> {
            unimplemented!()
        }
        async fn put_object_acl(
            &self,
            _bucket: &str,
            _key: &str,
            _policy: AccessControlPolicy,
        ) -> Result<(), ServiceError> {
            unimplemented!()
        }
    }

    #[tokio::test]
    async fn missing_source_fails_fast_without_signal_activity() {
        let store = MemoryStore::instantiate(MEGABYTE);
        let gate = CompletionGate::new();

        let started = gate
            .submit(store, "demo", "hello", Path::new("/no/such/file"))
            .await;

        assert!(!started);
        assert!(!gate.is_complete());
        // Nothing was submitted, so nothing ever completes
        assert!(!gate.await_completion_timeout(Duration::from_millis(30)).await);
    }

    #[tokio::test]
    async fn successful_upload_completes_the_gate() {
        let dir = tempfile::tempdir().unwrap();
        let source = scratch_file(dir.path(), "payload.bin", b"payload bytes");

        let store = MemoryStore::instantiate(MEGABYTE);
        store.create_bucket("demo").await.unwrap();
        let gate = CompletionGate::new();

        assert!(gate.submit(Arc::clone(&store), "demo", "payload.bin", &source).await);
        gate.await_completion().await;

        assert!(gate.is_complete());
        assert!(store.contains("demo", "payload.bin").await.unwrap());
    }

    #[tokio::test]
    async fn failed_upload_still_releases_the_waiter() {
        let dir = tempfile::tempdir().unwrap();
        let source = scratch_file(dir.path(), "payload.bin", b"payload bytes");

        let store: ObjectStoreInstance = Arc::new(DenyingStore);
        let gate = CompletionGate::new();

        assert!(gate.submit(store, "demo", "payload.bin", &source).await);
        // Failure also signals completion, the waiter must not hang
        assert!(gate.await_completion_timeout(Duration::from_secs(5)).await);
    }

    #[tokio::test]
    async fn gate_can_run_two_independent_cycles() {
        let dir = tempfile::tempdir().unwrap();
        let first = scratch_file(dir.path(), "one.bin", b"first");
        let second = scratch_file(dir.path(), "two.bin", b"second");

        let store = MemoryStore::instantiate(MEGABYTE);
        store.create_bucket("demo").await.unwrap();
        let gate = CompletionGate::new();

        assert!(gate.submit(Arc::clone(&store), "demo", "one.bin", &first).await);
        gate.await_completion().await;
        assert!(store.contains("demo", "one.bin").await.unwrap());

        assert!(gate.submit(Arc::clone(&store), "demo", "two.bin", &second).await);
        gate.await_completion().await;
        assert!(store.contains("demo", "two.bin").await.unwrap());
    }

    #[tokio::test]
    async fn directories_do_not_pass_the_precondition() {
        let dir = tempfile::tempdir().unwrap();
        let store = MemoryStore::instantiate(MEGABYTE);
        let gate = CompletionGate::new();

        assert!(!gate.submit(store, "demo", "dir", dir.path()).await);
    }
}
