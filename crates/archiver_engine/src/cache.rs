//! Per-pipeline memoization of stage results.
//!
//! Every stage output (or failure) is stored under a key derived from the stage
//! name and its arguments. Later calls with the same key replay the stored
//! outcome, including failures, without recomputing. Concurrent calls for one
//! key are coalesced: only the first caller runs the computation and the rest
//! wait for its outcome.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use sha2::{Digest, Sha256};
use tokio::sync::OnceCell;

use crate::{FailureKind, StageError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheStage {
    Render,
    Evade,
    Polish,
    Embed,
    Markdown,
    Pdf,
}

impl CacheStage {
    pub fn as_str(self) -> &'static str {
        match self {
            CacheStage::Render => "render",
            CacheStage::Evade => "evade",
            CacheStage::Polish => "polish",
            CacheStage::Embed => "embed",
            CacheStage::Markdown => "markdown",
            CacheStage::Pdf => "pdf",
        }
    }
}

/// SHA-256 over a length-prefixed encoding of the stage and its ordered arguments.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn new(stage: CacheStage, args: &[&str]) -> Self {
        let mut hasher = Sha256::new();
        write_field(&mut hasher, stage.as_str());
        hasher.update((args.len() as u64).to_le_bytes());
        for arg in args {
            write_field(&mut hasher, arg);
        }
        let digest = hasher.finalize();
        let mut hex = String::with_capacity(digest.len() * 2);
        for byte in digest.iter() {
            use std::fmt::Write;
            let _ = write!(&mut hex, "{byte:02x}");
        }
        Self(hex)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn write_field(hasher: &mut Sha256, value: &str) {
    hasher.update((value.len() as u64).to_le_bytes());
    hasher.update(value.as_bytes());
}

type Entry = Result<Arc<dyn Any + Send + Sync>, StageError>;

#[derive(Default)]
pub struct StageCache {
    cells: Mutex<HashMap<CacheKey, Arc<OnceCell<Entry>>>>,
    computations: AtomicUsize,
}

impl fmt::Debug for StageCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StageCache")
            .field("entries", &self.len())
            .field("computations", &self.computations())
            .finish()
    }
}

impl StageCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the stored outcome for `(stage, args)`, running `compute` only if
    /// no outcome exists yet.
    pub async fn get_or_compute<T, F, Fut>(
        &self,
        stage: CacheStage,
        args: &[&str],
        compute: F,
    ) -> Result<T, StageError>
    where
        T: Clone + Send + Sync + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, StageError>>,
    {
        let key = CacheKey::new(stage, args);
        let cell = {
            let mut cells = self.cells.lock().unwrap_or_else(PoisonError::into_inner);
            cells.entry(key.clone()).or_default().clone()
        };

        let entry = cell
            .get_or_init(move || async move {
                self.computations.fetch_add(1, Ordering::Relaxed);
                engine_logging::engine_trace!("cache miss stage={} key={}", stage.as_str(), key);
                compute()
                    .await
                    .map(|value| Arc::new(value) as Arc<dyn Any + Send + Sync>)
            })
            .await;

        match entry {
            Ok(value) => value.downcast_ref::<T>().cloned().ok_or_else(|| {
                StageError::new(
                    FailureKind::Internal,
                    format!("cached {} value has an unexpected type", stage.as_str()),
                )
            }),
            Err(err) => Err(err.clone()),
        }
    }

    pub fn len(&self) -> usize {
        self.cells
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|cell| cell.initialized())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of computations actually executed (cache misses).
    pub fn computations(&self) -> usize {
        self.computations.load(Ordering::Relaxed)
    }
}
