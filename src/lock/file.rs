// Advisory file locks, shared by every engine process using the same lock dir

use async_trait::async_trait;
use fd_lock::RwLock;
use rand::Rng;
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{self, Seek, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uuid::Uuid;

use super::{LockCoordinator, LockError, LockHandle};

struct HeldFileLock {
    resource_id: String,
    release: oneshot::Sender<()>,
    worker: JoinHandle<()>,
}

/// Lock coordinator backed by `<lock_dir>/<resource>.lock` files.
///
/// Each held lock is owned by a blocking worker that keeps the file guard
/// until `release` signals it.
pub struct FileLockCoordinator {
    lock_dir: PathBuf,
    poll_interval: Duration,
    held: Mutex<HashMap<Uuid, HeldFileLock>>,
}

impl FileLockCoordinator {
    pub fn new(lock_dir: &Path, poll_interval: Duration) -> Result<Self, LockError> {
        std::fs::create_dir_all(lock_dir)?;
        Ok(Self {
            lock_dir: lock_dir.to_path_buf(),
            poll_interval: poll_interval.max(Duration::from_millis(1)),
            held: Mutex::new(HashMap::new()),
        })
    }

    pub fn lock_path(&self, resource_id: &str) -> PathBuf {
        let safe: String = resource_id
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.lock_dir.join(format!("{safe}.lock"))
    }

    fn held(&self) -> Result<std::sync::MutexGuard<'_, HashMap<Uuid, HeldFileLock>>, LockError> {
        self.held.lock().map_err(|_| LockError::Unavailable {
            reason: "lock table poisoned".to_string(),
        })
    }
}

#[async_trait]
impl LockCoordinator for FileLockCoordinator {
    async fn acquire(&self, resource_id: &str, timeout: Duration) -> Result<LockHandle, LockError> {
        let handle = LockHandle::new(resource_id);
        let path = self.lock_path(resource_id);
        let (acquired_tx, acquired_rx) = oneshot::channel();
        let (release_tx, release_rx) = oneshot::channel();

        let request = LockRequest {
            path,
            resource_id: resource_id.to_string(),
            token: handle.token,
            deadline: Instant::now() + timeout,
            timeout,
            poll_interval: self.poll_interval,
        };
        let worker = tokio::task::spawn_blocking(move || hold_lock_file(request, acquired_tx, release_rx));

        match acquired_rx.await {
            Ok(Ok(())) => {
                self.held()?.insert(
                    handle.token,
                    HeldFileLock {
                        resource_id: resource_id.to_string(),
                        release: release_tx,
                        worker,
                    },
                );
                debug!(resource = resource_id, token = %handle.token, "Acquired file lock");
                Ok(handle)
            }
            Ok(Err(e)) => Err(e),
            Err(_) => Err(LockError::Unavailable {
                reason: "lock worker exited before acquiring".to_string(),
            }),
        }
    }

    async fn release(&self, handle: &LockHandle) -> Result<bool, LockError> {
        let Some(held) = self.held()?.remove(&handle.token) else {
            return Ok(false);
        };
        if held.release.send(()).is_err() {
            warn!(resource = %held.resource_id, "Lock worker already gone");
        }
        held.worker.await.map_err(|e| LockError::Unavailable {
            reason: format!("lock worker failed: {e}"),
        })?;
        Ok(true)
    }

    fn is_locked(&self, resource_id: &str) -> bool {
        self.held
            .lock()
            .map(|held| held.values().any(|h| h.resource_id == resource_id))
            .unwrap_or(false)
    }
}

struct LockRequest {
    path: PathBuf,
    resource_id: String,
    token: Uuid,
    deadline: Instant,
    timeout: Duration,
    poll_interval: Duration,
}

fn hold_lock_file(
    request: LockRequest,
    acquired: oneshot::Sender<Result<(), LockError>>,
    release: oneshot::Receiver<()>,
) {
    let file = match OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(&request.path)
    {
        Ok(file) => file,
        Err(e) => {
            let _ = acquired.send(Err(e.into()));
            return;
        }
    };

    let mut lock = RwLock::new(file);
    let mut rng = rand::rng();
    loop {
        match lock.try_write() {
            Ok(mut guard) => {
                if let Err(e) = write_owner(&mut guard, request.token) {
                    warn!(path = %request.path.display(), error = %e, "Could not record lock owner");
                }
                // Caller gave up while we were polling
                if acquired.send(Ok(())).is_err() {
                    return;
                }
                let _ = release.blocking_recv();
                let _ = guard.set_len(0);
                return;
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                let now = Instant::now();
                if now >= request.deadline {
                    let _ = acquired.send(Err(LockError::Timeout {
                        resource_id: request.resource_id,
                        waited_ms: request.timeout.as_millis() as u64,
                    }));
                    return;
                }
                let jitter_ms = rng.random_range(0..=request.poll_interval.as_millis() as u64 / 2);
                let pause = request.poll_interval + Duration::from_millis(jitter_ms);
                std::thread::sleep(pause.min(request.deadline - now));
            }
            Err(e) => {
                let _ = acquired.send(Err(e.into()));
                return;
            }
        }
    }
}

fn write_owner(file: &mut File, token: Uuid) -> io::Result<()> {
    let host = hostname::get()
        .map(|h| h.to_string_lossy().into_owned())
        .unwrap_or_else(|_| "unknown".to_string());
    file.set_len(0)?;
    file.rewind()?;
    writeln!(file, "{host} {} {token}", std::process::id())?;
    file.flush()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn coordinator(dir: &Path) -> FileLockCoordinator {
        FileLockCoordinator::new(dir, Duration::from_millis(5)).unwrap()
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn lock_file_records_owner() {
        let dir = tempfile::tempdir().unwrap();
        let locks = coordinator(dir.path());
        let handle = locks.acquire("project-1", Duration::from_secs(1)).await.unwrap();

        let contents = std::fs::read_to_string(locks.lock_path("project-1")).unwrap();
        assert!(contents.contains(&handle.token.to_string()));
        assert!(locks.is_locked("project-1"));

        assert!(locks.release(&handle).await.unwrap());
        assert!(!locks.is_locked("project-1"));
        assert!(!locks.release(&handle).await.unwrap());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn separate_coordinators_exclude_each_other() {
        let dir = tempfile::tempdir().unwrap();
        let a = coordinator(dir.path());
        let b = Arc::new(coordinator(dir.path()));

        let held = a.acquire("shared", Duration::from_secs(1)).await.unwrap();
        let err = b.acquire("shared", Duration::from_millis(50)).await.unwrap_err();
        assert!(matches!(err, LockError::Timeout { .. }));

        let waiter = {
            let b = b.clone();
            tokio::spawn(async move { b.acquire("shared", Duration::from_secs(5)).await })
        };
        tokio::time::sleep(Duration::from_millis(30)).await;
        a.release(&held).await.unwrap();

        let second = waiter.await.unwrap().unwrap();
        b.release(&second).await.unwrap();
    }

    #[test]
    fn lock_paths_are_sanitized() {
        let dir = tempfile::tempdir().unwrap();
        let locks = coordinator(dir.path());
        let path = locks.lock_path("../etc/passwd");
        assert_eq!(path.parent(), Some(dir.path()));
    }
}
