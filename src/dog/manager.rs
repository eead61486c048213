use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::Utc;

use super::{Assignment, Dog, DogError};
use crate::fsutil::{self, DEFAULT_LOCK_TIMEOUT, LockGuard};

/// Kennel directory, relative to the town root.
pub const DOGS_DIR: &str = "deacon/dogs";

const RECORD_FILE: &str = ".dog.json";
const LOCK_FILE: &str = ".dog.lock";

/// Registry of the dog fleet.
///
/// Each dog lives in `<town>/deacon/dogs/<name>/.dog.json`. The manager is
/// the only thing that writes those records; every write happens under the
/// dog's own lock file and replaces the record atomically.
#[derive(Debug, Clone)]
pub struct DogManager {
    kennel_dir: PathBuf,
    lock_timeout: Duration,
}

impl DogManager {
    pub fn new(town_root: &Path) -> Self {
        Self {
            kennel_dir: town_root.join(DOGS_DIR),
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        }
    }

    #[must_use]
    pub const fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    fn dog_dir(&self, name: &str) -> PathBuf {
        self.kennel_dir.join(name)
    }

    fn record_path(&self, name: &str) -> PathBuf {
        self.dog_dir(name).join(RECORD_FILE)
    }

    fn lock(&self, name: &str) -> Result<LockGuard, DogError> {
        Ok(LockGuard::exclusive(
            &self.dog_dir(name).join(LOCK_FILE),
            self.lock_timeout,
        )?)
    }

    /// All dogs, ordered by name. Unreadable records are skipped with a warning.
    pub fn list(&self) -> Result<Vec<Dog>, DogError> {
        let entries = match fs::read_dir(&self.kennel_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(storage(&self.kennel_dir, e)),
        };

        let mut names = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| storage(&self.kennel_dir, e))?;
            if entry.path().join(RECORD_FILE).is_file() {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        names.sort();

        let mut dogs = Vec::with_capacity(names.len());
        for name in names {
            match self.read(&name) {
                Ok(dog) => dogs.push(dog),
                Err(e) => tracing::warn!(dog = %name, "skipping unreadable dog record: {e}"),
            }
        }
        Ok(dogs)
    }

    pub fn get(&self, name: &str) -> Result<Dog, DogError> {
        self.read(name)
    }

    /// The first idle dog by name, or `None` when the whole fleet is busy.
    pub fn get_idle_dog(&self) -> Result<Option<Dog>, DogError> {
        self.next_idle_dog(&HashSet::new())
    }

    /// The first idle dog by name that is not in `skip`.
    pub fn next_idle_dog(&self, skip: &HashSet<String>) -> Result<Option<Dog>, DogError> {
        Ok(self
            .list()?
            .into_iter()
            .find(|d| d.is_idle() && !skip.contains(&d.name)))
    }

    /// Create a new idle dog.
    pub fn add(&self, name: &str) -> Result<Dog, DogError> {
        validate_name(name)?;
        let _lock = self.lock(name)?;
        if self.record_path(name).exists() {
            return Err(DogError::AlreadyExists(name.to_string()));
        }
        let dog = Dog::new(name);
        self.write(&dog)?;
        tracing::info!(dog = %name, "added dog");
        Ok(dog)
    }

    /// Make sure every named dog exists. Returns the names that were created.
    pub fn provision(&self, names: &[String]) -> Result<Vec<String>, DogError> {
        let mut created = Vec::new();
        for name in names {
            match self.add(name) {
                Ok(_) => created.push(name.clone()),
                Err(DogError::AlreadyExists(_)) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(created)
    }

    /// Claim an idle dog for `work`.
    ///
    /// The state check and the write happen under the dog's lock, so of two
    /// racing callers exactly one succeeds and the other gets `Conflict`.
    pub fn assign_work(&self, name: &str, work: &str) -> Result<Dog, DogError> {
        if work.trim().is_empty() {
            return Err(DogError::InvalidWork(name.to_string()));
        }
        let _lock = self.lock(name)?;
        let mut dog = self.read(name)?;
        if let Assignment::Working { work: current } = &dog.assignment {
            return Err(DogError::Conflict {
                name: name.to_string(),
                work: current.clone(),
            });
        }

        dog.assignment = Assignment::Working {
            work: work.to_string(),
        };
        dog.last_active = Utc::now();
        self.write(&dog)?;
        tracing::debug!(dog = %name, %work, "assigned work");
        Ok(dog)
    }

    /// Return a dog to idle. Clearing an idle dog is a no-op.
    pub fn clear_work(&self, name: &str) -> Result<Dog, DogError> {
        let _lock = self.lock(name)?;
        let mut dog = self.read(name)?;
        if dog.is_idle() {
            return Ok(dog);
        }

        dog.assignment = Assignment::Idle;
        dog.last_active = Utc::now();
        self.write(&dog)?;
        tracing::debug!(dog = %name, "cleared work");
        Ok(dog)
    }

    fn read(&self, name: &str) -> Result<Dog, DogError> {
        let path = self.record_path(name);
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(DogError::NotFound(name.to_string()));
            }
            Err(e) => return Err(storage(&path, e)),
        };
        serde_json::from_str(&raw).map_err(|source| DogError::Corrupt { path, source })
    }

    fn write(&self, dog: &Dog) -> Result<(), DogError> {
        let path = self.record_path(&dog.name);
        let json = serde_json::to_string_pretty(dog).map_err(|source| DogError::Corrupt {
            path: path.clone(),
            source,
        })?;
        fsutil::atomic_write(&path, json.as_bytes()).map_err(|e| storage(&path, e))
    }
}

fn storage(path: &Path, source: io::Error) -> DogError {
    DogError::Storage {
        path: path.to_path_buf(),
        source,
    }
}

/// Dog names become directory names and tmux session names.
fn validate_name(name: &str) -> Result<(), DogError> {
    let valid = !name.is_empty()
        && name.len() <= 64
        && name.bytes().next().is_some_and(|b| b.is_ascii_alphanumeric())
        && name
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_');
    if valid {
        Ok(())
    } else {
        Err(DogError::InvalidName(name.to_string()))
    }
}
