//! State management for managed resources
//!
//! The state store records, per resource address, what the engine last
//! applied. [`FileStateStore`] keeps it in `.skyflow/state.json`;
//! [`MemoryStateStore`] keeps it in process for tests and dry runs.

use crate::error::{EngineError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use skyflow_core::{AttributePath, Attributes, DependencyEdge, ResourceAddress, fingerprint};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, warn};

pub const STATE_VERSION: u32 = 1;
const STATE_FILE: &str = "state.json";
const STATE_BACKUP: &str = "state.json.backup";
const STATE_TEMP: &str = "state.json.tmp";
const LOCK_FILE: &str = "lock.json";
const LOCK_STALE_AFTER_HOURS: i64 = 1;

/// State of a single resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceState {
    /// Provider-assigned identifier
    pub id: String,

    /// Resource kind
    pub resource_type: String,

    /// Current status
    pub status: ResourceStatus,

    /// Last-applied input attributes, references resolved
    #[serde(default)]
    pub attributes: Attributes,

    /// Attributes reported by the provider (ARNs, endpoints, ...)
    #[serde(default)]
    pub outputs: Attributes,

    /// Fingerprint of `attributes`
    pub fingerprint: String,

    /// Addresses this resource depended on when last applied
    #[serde(default)]
    pub dependencies: Vec<ResourceAddress>,

    /// When the resource was created
    pub created_at: DateTime<Utc>,

    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

impl ResourceState {
    pub fn new(id: impl Into<String>, resource_type: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            resource_type: resource_type.into(),
            status: ResourceStatus::Present,
            attributes: Attributes::new(),
            outputs: Attributes::new(),
            fingerprint: fingerprint(&Attributes::new()),
            dependencies: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_status(mut self, status: ResourceStatus) -> Self {
        self.status = status;
        self
    }

    /// Set the input attributes and recompute the fingerprint.
    pub fn with_attributes(mut self, attributes: Attributes) -> Self {
        self.fingerprint = fingerprint(&attributes);
        self.attributes = attributes;
        self
    }

    pub fn with_outputs(mut self, outputs: Attributes) -> Self {
        self.outputs = outputs;
        self
    }

    pub fn with_dependencies(mut self, dependencies: Vec<ResourceAddress>) -> Self {
        self.dependencies = dependencies;
        self
    }

    pub fn is_tainted(&self) -> bool {
        self.status == ResourceStatus::Tainted
    }

    /// Value at `path`: `id` is the provider identifier, otherwise outputs
    /// take precedence over inputs.
    pub fn lookup(&self, path: &AttributePath) -> Option<Value> {
        if path.name() == "id" && path.segments().len() == 1 {
            return Some(Value::String(self.id.clone()));
        }
        path.select(&self.outputs)
            .or_else(|| path.select(&self.attributes))
            .cloned()
    }
}

/// Status of a resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceStatus {
    /// Resource exists as recorded
    Present,
    /// Resource exists but must be replaced on the next apply
    Tainted,
    /// Resource is known to be gone
    Absent,
}

impl fmt::Display for ResourceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceStatus::Present => write!(f, "present"),
            ResourceStatus::Tainted => write!(f, "tainted"),
            ResourceStatus::Absent => write!(f, "absent"),
        }
    }
}

/// Point-in-time copy of the whole state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateSnapshot {
    /// State file version
    pub version: u32,

    /// Last modified timestamp
    pub updated_at: DateTime<Utc>,

    /// Resources indexed by address
    pub resources: BTreeMap<ResourceAddress, ResourceState>,
}

impl Default for StateSnapshot {
    fn default() -> Self {
        Self {
            version: STATE_VERSION,
            updated_at: Utc::now(),
            resources: BTreeMap::new(),
        }
    }
}

impl StateSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, address: &ResourceAddress) -> Option<&ResourceState> {
        self.resources.get(address)
    }

    pub fn contains(&self, address: &ResourceAddress) -> bool {
        self.resources.contains_key(address)
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ResourceAddress, &ResourceState)> {
        self.resources.iter()
    }

    /// Dependencies recorded at apply time, as graph edges
    pub fn recorded_edges(&self) -> Vec<DependencyEdge> {
        self.resources
            .iter()
            .flat_map(|(address, state)| {
                state
                    .dependencies
                    .iter()
                    .map(|to| DependencyEdge::new(address.clone(), to.clone()))
            })
            .collect()
    }

    fn insert(&mut self, address: ResourceAddress, state: ResourceState) {
        self.resources.insert(address, state);
        self.updated_at = Utc::now();
    }

    fn remove(&mut self, address: &ResourceAddress) -> Option<ResourceState> {
        let removed = self.resources.remove(address);
        if removed.is_some() {
            self.updated_at = Utc::now();
        }
        removed
    }
}

/// Durable record of applied resources
#[async_trait]
pub trait StateStore: Send + Sync {
    async fn get(&self, address: &ResourceAddress) -> Result<Option<ResourceState>>;

    /// Insert or replace the record for `address`. Durable on return.
    async fn put(&self, address: &ResourceAddress, state: ResourceState) -> Result<()>;

    /// Remove the record for `address`, returning it.
    async fn delete(&self, address: &ResourceAddress) -> Result<Option<ResourceState>>;

    async fn snapshot(&self) -> Result<StateSnapshot>;
}

/// In-process state store
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    state: RwLock<StateSnapshot>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_snapshot(snapshot: StateSnapshot) -> Self {
        Self {
            state: RwLock::new(snapshot),
        }
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn get(&self, address: &ResourceAddress) -> Result<Option<ResourceState>> {
        Ok(self.state.read().await.get(address).cloned())
    }

    async fn put(&self, address: &ResourceAddress, state: ResourceState) -> Result<()> {
        self.state.write().await.insert(address.clone(), state);
        Ok(())
    }

    async fn delete(&self, address: &ResourceAddress) -> Result<Option<ResourceState>> {
        Ok(self.state.write().await.remove(address))
    }

    async fn snapshot(&self) -> Result<StateSnapshot> {
        Ok(self.state.read().await.clone())
    }
}

/// State store backed by `<dir>/state.json`
///
/// Opening takes an exclusive lock on the directory. The lock is released
/// by [`FileStateStore::close`] or when the store is dropped.
#[derive(Debug)]
pub struct FileStateStore {
    dir: PathBuf,
    state: Mutex<StateSnapshot>,
    lock: Mutex<Option<StateLock>>,
}

impl FileStateStore {
    /// Lock `dir` and load its state.
    pub async fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        ensure_dir(&dir).await?;

        let lock = StateLock::acquire(&dir).await?;
        let state = load_snapshot(&dir).await?;

        Ok(Self {
            dir,
            state: Mutex::new(state),
            lock: Mutex::new(Some(lock)),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Release the lock. Further writes are rejected.
    pub async fn close(&self) -> Result<()> {
        if let Some(lock) = self.lock.lock().await.take() {
            lock.release().await?;
        }
        Ok(())
    }

    async fn mutate<T>(&self, change: impl FnOnce(&mut StateSnapshot) -> T) -> Result<T> {
        if self.lock.lock().await.is_none() {
            return Err(EngineError::LockError("state store is closed".to_string()));
        }

        let mut guard = self.state.lock().await;
        let mut next = guard.clone();
        let out = change(&mut next);
        self.persist(&next).await?;
        *guard = next;
        Ok(out)
    }

    async fn persist(&self, snapshot: &StateSnapshot) -> Result<()> {
        let path = self.dir.join(STATE_FILE);
        let backup = self.dir.join(STATE_BACKUP);
        let temp = self.dir.join(STATE_TEMP);

        let content = serde_json::to_string_pretty(snapshot)?;
        fs::write(&temp, content).await?;

        if fs::try_exists(&path).await? {
            fs::copy(&path, &backup).await?;
        }
        fs::rename(&temp, &path).await?;

        debug!(resources = snapshot.len(), "Saved state");
        Ok(())
    }
}

#[async_trait]
impl StateStore for FileStateStore {
    async fn get(&self, address: &ResourceAddress) -> Result<Option<ResourceState>> {
        Ok(self.state.lock().await.get(address).cloned())
    }

    async fn put(&self, address: &ResourceAddress, state: ResourceState) -> Result<()> {
        let address = address.clone();
        self.mutate(move |s| s.insert(address, state)).await
    }

    async fn delete(&self, address: &ResourceAddress) -> Result<Option<ResourceState>> {
        if !self.state.lock().await.contains(address) {
            return Ok(None);
        }
        self.mutate(|s| s.remove(address)).await
    }

    async fn snapshot(&self) -> Result<StateSnapshot> {
        Ok(self.state.lock().await.clone())
    }
}

async fn ensure_dir(dir: &Path) -> Result<()> {
    if !fs::try_exists(dir).await? {
        fs::create_dir_all(dir).await?;
        debug!("Created state directory: {}", dir.display());
    }
    Ok(())
}

/// Read `<dir>/state.json` without locking. A missing file is empty state.
pub async fn load_snapshot(dir: impl AsRef<Path>) -> Result<StateSnapshot> {
    let path = dir.as_ref().join(STATE_FILE);
    if !fs::try_exists(&path).await? {
        debug!("State file not found, returning empty state");
        return Ok(StateSnapshot::new());
    }

    let content = fs::read_to_string(&path).await?;
    let state: StateSnapshot = serde_json::from_str(&content)?;

    if state.version > STATE_VERSION {
        return Err(EngineError::StateError(format!(
            "State file version {} is newer than supported version {}",
            state.version, STATE_VERSION
        )));
    }

    debug!("Loaded state with {} resources", state.len());
    Ok(state)
}

/// Mark `address` as tainted so the next apply replaces it.
pub async fn taint(store: &dyn StateStore, address: &ResourceAddress) -> Result<ResourceState> {
    set_status(store, address, ResourceStatus::Tainted).await
}

/// Clear a taint mark.
pub async fn untaint(store: &dyn StateStore, address: &ResourceAddress) -> Result<ResourceState> {
    set_status(store, address, ResourceStatus::Present).await
}

async fn set_status(
    store: &dyn StateStore,
    address: &ResourceAddress,
    status: ResourceStatus,
) -> Result<ResourceState> {
    let mut state = store
        .get(address)
        .await?
        .ok_or_else(|| EngineError::ResourceNotFound(address.clone()))?;
    state.status = status;
    state.updated_at = Utc::now();
    store.put(address, state.clone()).await?;
    Ok(state)
}

/// Lock information
#[derive(Debug, Serialize, Deserialize)]
struct LockInfo {
    holder: String,
    pid: u32,
    acquired_at: DateTime<Utc>,
}

/// RAII guard for state lock
#[derive(Debug)]
pub struct StateLock {
    lock_path: PathBuf,
    released: bool,
}

impl StateLock {
    /// Acquire the lock file in `dir`, taking over locks older than an hour.
    pub async fn acquire(dir: &Path) -> Result<Self> {
        let lock_path = dir.join(LOCK_FILE);

        match Self::create(&lock_path).await {
            Ok(lock) => Ok(lock),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                let content = fs::read_to_string(&lock_path).await?;
                let lock_info: LockInfo = serde_json::from_str(&content).map_err(|e| {
                    EngineError::LockError(format!(
                        "Unreadable lock file {}: {}",
                        lock_path.display(),
                        e
                    ))
                })?;

                let age = Utc::now().signed_duration_since(lock_info.acquired_at);
                if age.num_hours() < LOCK_STALE_AFTER_HOURS {
                    return Err(EngineError::LockError(format!(
                        "State is locked by {} (pid {}) since {}",
                        lock_info.holder, lock_info.pid, lock_info.acquired_at
                    )));
                }

                warn!("Removing stale lock from {}", lock_info.holder);
                fs::remove_file(&lock_path).await?;
                Ok(Self::create(&lock_path).await?)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn create(lock_path: &Path) -> std::io::Result<Self> {
        let lock_info = LockInfo {
            holder: std::env::var("HOSTNAME")
                .or_else(|_| std::env::var("HOST"))
                .unwrap_or_else(|_| "unknown".to_string()),
            pid: std::process::id(),
            acquired_at: Utc::now(),
        };
        let content = serde_json::to_vec_pretty(&lock_info)?;

        let mut file = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(lock_path)
            .await?;
        file.write_all(&content).await?;
        file.flush().await?;

        debug!("Acquired state lock");
        Ok(Self {
            lock_path: lock_path.to_path_buf(),
            released: false,
        })
    }

    /// Release the lock
    pub async fn release(mut self) -> Result<()> {
        if !self.released {
            if fs::try_exists(&self.lock_path).await? {
                fs::remove_file(&self.lock_path).await?;
                debug!("Released state lock");
            }
            self.released = true;
        }
        Ok(())
    }
}

impl Drop for StateLock {
    fn drop(&mut self) {
        if !self.released && self.lock_path.exists() {
            let _ = std::fs::remove_file(&self.lock_path);
        }
    }
}
