//! Baseline state for synthesized stacks
//!
//! Manages the `.sorrystack/state.json` file which records the last synthesis
//! that was applied, so later syntheses can be diffed against it.

use crate::error::{CloudError, Result};
use crate::provider::ResourceSet;
use crate::synthesis::Synthesis;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::fs;

const STATE_VERSION: u32 = 1;
const STATE_DIR: &str = ".sorrystack";
const STATE_FILE: &str = "state.json";
const STATE_BACKUP: &str = "state.json.backup";
const LOCK_FILE: &str = "lock.json";

/// Global state containing the baseline of every stack
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobalState {
    /// State file version
    pub version: u32,

    /// Last modified timestamp
    pub updated_at: DateTime<Utc>,

    /// Snapshots indexed by stack name
    pub stacks: BTreeMap<String, StackSnapshot>,
}

impl Default for GlobalState {
    fn default() -> Self {
        Self {
            version: STATE_VERSION,
            updated_at: Utc::now(),
            stacks: BTreeMap::new(),
        }
    }
}

impl GlobalState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a snapshot, replacing any previous one for the stack
    pub fn set_snapshot(&mut self, snapshot: StackSnapshot) {
        self.stacks.insert(snapshot.stack_name.clone(), snapshot);
        self.updated_at = Utc::now();
    }

    /// Remove a stack's snapshot
    pub fn remove_snapshot(&mut self, stack_name: &str) -> Option<StackSnapshot> {
        let result = self.stacks.remove(stack_name);
        if result.is_some() {
            self.updated_at = Utc::now();
        }
        result
    }

    pub fn snapshot(&self, stack_name: &str) -> Option<&StackSnapshot> {
        self.stacks.get(stack_name)
    }

    /// Baseline resources for a stack (empty if never recorded)
    pub fn baseline(&self, stack_name: &str) -> ResourceSet {
        self.snapshot(stack_name)
            .map(|s| s.resources.clone())
            .unwrap_or_default()
    }
}

/// Recorded synthesis of one stack
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StackSnapshot {
    pub stack_name: String,

    /// When the snapshot was recorded
    pub recorded_at: DateTime<Utc>,

    /// Asset hashes referenced by the template
    #[serde(default)]
    pub asset_hashes: Vec<String>,

    pub resources: ResourceSet,
}

impl StackSnapshot {
    pub fn from_synthesis(synthesis: &Synthesis) -> Self {
        Self {
            stack_name: synthesis.stack_name.clone(),
            recorded_at: Utc::now(),
            asset_hashes: synthesis.artifacts.iter().map(|a| a.hash.clone()).collect(),
            resources: synthesis.resources.clone(),
        }
    }
}

/// State manager for reading/writing state files
pub struct StateManager {
    /// Project root directory
    project_root: PathBuf,
}

impl StateManager {
    pub fn new(project_root: impl AsRef<Path>) -> Self {
        Self {
            project_root: project_root.as_ref().to_path_buf(),
        }
    }

    fn state_dir(&self) -> PathBuf {
        self.project_root.join(STATE_DIR)
    }

    /// Get the state file path
    pub fn state_path(&self) -> PathBuf {
        self.state_dir().join(STATE_FILE)
    }

    fn backup_path(&self) -> PathBuf {
        self.state_dir().join(STATE_BACKUP)
    }

    fn lock_path(&self) -> PathBuf {
        self.state_dir().join(LOCK_FILE)
    }

    async fn ensure_state_dir(&self) -> Result<()> {
        let dir = self.state_dir();
        if !dir.exists() {
            fs::create_dir_all(&dir).await?;
            tracing::debug!("Created state directory: {}", dir.display());
        }
        Ok(())
    }

    /// Load the current state
    pub async fn load(&self) -> Result<GlobalState> {
        let path = self.state_path();
        if !path.exists() {
            tracing::debug!("State file not found, returning empty state");
            return Ok(GlobalState::new());
        }

        let content = fs::read_to_string(&path).await?;
        let state: GlobalState = serde_json::from_str(&content)?;

        if state.version > STATE_VERSION {
            return Err(CloudError::StateError(format!(
                "State file version {} is newer than supported version {}",
                state.version, STATE_VERSION
            )));
        }

        tracing::debug!("Loaded state with {} stacks", state.stacks.len());
        Ok(state)
    }

    /// Save the state
    pub async fn save(&self, state: &GlobalState) -> Result<()> {
        self.ensure_state_dir().await?;

        let path = self.state_path();
        let backup = self.backup_path();

        if path.exists() {
            if backup.exists() {
                fs::remove_file(&backup).await?;
            }
            fs::rename(&path, &backup).await?;
            tracing::debug!("Created state backup");
        }

        let content = serde_json::to_string_pretty(state)?;
        fs::write(&path, content).await?;

        tracing::debug!("Saved state with {} stacks", state.stacks.len());
        Ok(())
    }

    /// Record a synthesis as the new baseline under the state lock
    #[tracing::instrument(skip(self, synthesis), fields(stack = %synthesis.stack_name))]
    pub async fn record(&self, synthesis: &Synthesis) -> Result<StackSnapshot> {
        let lock = self.acquire_lock().await?;
        let mut state = self.load().await?;
        let snapshot = StackSnapshot::from_synthesis(synthesis);
        state.set_snapshot(snapshot.clone());
        self.save(&state).await?;
        lock.release().await?;

        tracing::info!(resources = snapshot.resources.len(), "Recorded baseline");
        Ok(snapshot)
    }

    /// Acquire a lock for exclusive access
    pub async fn acquire_lock(&self) -> Result<StateLock> {
        self.ensure_state_dir().await?;

        let lock_path = self.lock_path();

        if lock_path.exists() {
            let content = fs::read_to_string(&lock_path).await?;
            let lock_info: LockInfo = serde_json::from_str(&content)?;

            // 1時間以上前のロックは放棄されたものとみなす
            let age = Utc::now().signed_duration_since(lock_info.acquired_at);
            if age.num_hours() < 1 {
                return Err(CloudError::LockError(format!(
                    "State is locked by {} since {}",
                    lock_info.holder, lock_info.acquired_at
                )));
            }

            tracing::warn!("Removing stale lock from {}", lock_info.holder);
        }

        let lock_info = LockInfo {
            holder: std::env::var("HOSTNAME")
                .or_else(|_| std::env::var("HOST"))
                .unwrap_or_else(|_| "unknown".to_string()),
            acquired_at: Utc::now(),
        };

        let content = serde_json::to_string_pretty(&lock_info)?;
        fs::write(&lock_path, content).await?;

        tracing::debug!("Acquired state lock");
        Ok(StateLock {
            lock_path,
            released: false,
        })
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct LockInfo {
    holder: String,
    acquired_at: DateTime<Utc>,
}

/// RAII guard for state lock
pub struct StateLock {
    lock_path: PathBuf,
    released: bool,
}

impl StateLock {
    /// Release the lock
    pub async fn release(mut self) -> Result<()> {
        if !self.released {
            if self.lock_path.exists() {
                fs::remove_file(&self.lock_path).await?;
                tracing::debug!("Released state lock");
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::ResourceConfig;
    use tempfile::tempdir;

    fn synthesis() -> Synthesis {
        let mut resources = ResourceSet::new();
        resources.add(ResourceConfig::new(
            "AWS::EC2::VPC",
            "Vpc",
            "aws",
            serde_json::json!({ "CidrBlock": "10.1.0.0/16" }),
        ));
        Synthesis {
            stack_name: "TestSorryPageStack".to_string(),
            resources,
            document: serde_json::json!({}),
            artifacts: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_state_save_load() {
        let temp_dir = tempdir().unwrap();
        let manager = StateManager::new(temp_dir.path());

        let mut state = GlobalState::new();
        state.set_snapshot(StackSnapshot::from_synthesis(&synthesis()));
        manager.save(&state).await.unwrap();

        let loaded = manager.load().await.unwrap();
        assert_eq!(loaded.stacks.len(), 1);
        assert!(loaded.baseline("TestSorryPageStack").contains("Vpc"));
    }

    #[tokio::test]
    async fn test_empty_state() {
        let temp_dir = tempdir().unwrap();
        let manager = StateManager::new(temp_dir.path());

        let state = manager.load().await.unwrap();
        assert!(state.stacks.is_empty());
        assert!(state.baseline("anything").is_empty());
    }

    #[tokio::test]
    async fn test_record_creates_backup_and_releases_lock() {
        let temp_dir = tempdir().unwrap();
        let manager = StateManager::new(temp_dir.path());

        manager.record(&synthesis()).await.unwrap();
        manager.record(&synthesis()).await.unwrap();

        let dir = temp_dir.path().join(STATE_DIR);
        assert!(dir.join(STATE_BACKUP).exists());
        assert!(!dir.join(LOCK_FILE).exists());
    }

    #[tokio::test]
    async fn test_lock_is_exclusive() {
        let temp_dir = tempdir().unwrap();
        let manager = StateManager::new(temp_dir.path());

        let lock = manager.acquire_lock().await.unwrap();
        assert!(matches!(
            manager.acquire_lock().await,
            Err(CloudError::LockError(_))
        ));
        lock.release().await.unwrap();
        assert!(manager.acquire_lock().await.is_ok());
    }

    #[tokio::test]
    async fn test_newer_version_rejected() {
        let temp_dir = tempdir().unwrap();
        let manager = StateManager::new(temp_dir.path());
        let dir = temp_dir.path().join(STATE_DIR);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(
            dir.join(STATE_FILE),
            r#"{"version": 99, "updated_at": "2024-01-01T00:00:00Z", "stacks": {}}"#,
        )
        .unwrap();

        assert!(matches!(
            manager.load().await,
            Err(CloudError::StateError(_))
        ));
    }
}
