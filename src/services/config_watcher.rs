use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, SystemTime};
use tracing::{debug, info, warn};

use crate::error::{AppError, Result};
use crate::worker::periodic::Tickable;

/// A configuration type the watcher can reload from disk
pub trait ReloadableConfig: Clone + PartialEq + Send + Sync + 'static {
    /// Reads, validates and parses the configuration.
    fn load_and_validate(config_path: &Path, schema_path: &Path) -> Result<Self>;

    /// Single-line JSON rendering for logs
    fn to_diagnostic_json(&self) -> String;
}

struct Slots<C> {
    active: Arc<C>,
    pending: Option<C>,
    last_loaded: SystemTime,
}

/// Detects edits to a config file and publishes changed configurations.
///
/// A reload happens only when the file's modification time changes. A
/// reloaded value that is structurally equal to the active configuration is
/// not published. At most one update waits in the pending slot; a newer one
/// replaces it.
pub struct ConfigWatcher<C: ReloadableConfig> {
    config_path: PathBuf,
    schema_path: PathBuf,
    slots: Mutex<Slots<C>>,
}

impl<C: ReloadableConfig> ConfigWatcher<C> {
    /// Loads the initial configuration. Any failure here is fatal to the caller.
    pub fn new(config_path: impl Into<PathBuf>, schema_path: impl Into<PathBuf>) -> Result<Self> {
        let config_path = config_path.into();
        let schema_path = schema_path.into();

        let last_loaded = modified_time(&config_path)?;
        let initial = C::load_and_validate(&config_path, &schema_path)
            .map_err(|e| AppError::Config(format!("Initial config invalid: {}", e)))?;

        info!(
            path = %config_path.display(),
            config = %initial.to_diagnostic_json(),
            "Loaded configuration"
        );

        Ok(Self {
            config_path,
            schema_path,
            slots: Mutex::new(Slots {
                active: Arc::new(initial),
                pending: None,
                last_loaded,
            }),
        })
    }

    /// The configuration currently in force
    pub fn active_config(&self) -> Arc<C> {
        Arc::clone(&self.lock().active)
    }

    /// Takes the pending update, if any, and makes it the active configuration.
    pub fn consume_pending(&self) -> Option<C> {
        let mut slots = self.lock();
        let next = slots.pending.take()?;
        slots.active = Arc::new(next.clone());
        Some(next)
    }

    /// Reloads the file if its modification time changed.
    /// Returns true when a new configuration was published.
    pub fn check_for_update(&self) -> Result<bool> {
        let modified = modified_time(&self.config_path)?;
        if modified == self.lock().last_loaded {
            return Ok(false);
        }

        debug!(path = %self.config_path.display(), "Config file modified, reloading");
        let reloaded = C::load_and_validate(&self.config_path, &self.schema_path).map_err(|e| {
            AppError::Config(format!("Reload of {} rejected, keeping current config: {}", self.config_path.display(), e))
        })?;

        let mut slots = self.lock();
        slots.last_loaded = modified;

        if *slots.active == reloaded {
            if slots.pending.take().is_some() {
                info!("Config reverted to the active version, dropping pending update");
            } else {
                debug!("Config file touched without changes");
            }
            return Ok(false);
        }

        if slots.pending.is_some() {
            debug!("Replacing unconsumed pending config");
        }
        info!(config = %reloaded.to_diagnostic_json(), "New configuration pending");
        slots.pending = Some(reloaded);
        Ok(true)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Slots<C>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<C: ReloadableConfig> Tickable for ConfigWatcher<C> {
    fn name(&self) -> &str {
        "config-watcher"
    }

    async fn tick(self: Arc<Self>) -> Result<()> {
        self.check_for_update().map(|_| ())
    }

    fn on_timeout(&self, budget: Duration) {
        warn!(
            budget_ms = budget.as_millis() as u64,
            path = %self.config_path.display(),
            "Config check exceeded its budget"
        );
    }
}

fn modified_time(path: &Path) -> Result<SystemTime> {
    std::fs::metadata(path)
        .and_then(|meta| meta.modified())
        .map_err(|e| AppError::Config(format!("Cannot stat {}: {}", path.display(), e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ServiceConfig;
    use std::fs::{self, File};
    use tempfile::{tempdir, TempDir};

    const SCHEMA: &str = r#"{
        "type": "object",
        "required": ["main_exchange", "database_path"],
        "additionalProperties": false,
        "properties": {
            "main_exchange": { "type": "string", "minLength": 1 },
            "database_path": { "type": "string" }
        }
    }"#;

    struct Fixture {
        _dir: TempDir,
        config: PathBuf,
        schema: PathBuf,
        clock: SystemTime,
    }

    impl Fixture {
        fn new(initial: &str) -> Self {
            let dir = tempdir().unwrap();
            let config = dir.path().join("service.json");
            let schema = dir.path().join("service.schema.json");
            fs::write(&schema, SCHEMA).unwrap();

            let mut fixture = Self {
                _dir: dir,
                config,
                schema,
                clock: SystemTime::now(),
            };
            fixture.write(initial);
            fixture
        }

        /// Writes `content` and moves the mtime forward by a full second.
        fn write(&mut self, content: &str) {
            fs::write(&self.config, content).unwrap();
            self.clock += Duration::from_secs(1);
            self.set_mtime(self.clock);
        }

        fn set_mtime(&self, time: SystemTime) {
            File::options()
                .write(true)
                .open(&self.config)
                .unwrap()
                .set_modified(time)
                .unwrap();
        }

        fn watcher(&self) -> ConfigWatcher<ServiceConfig> {
            ConfigWatcher::new(&self.config, &self.schema).unwrap()
        }
    }

    const CONFIG_A: &str = r#"{"main_exchange":"binance","database_path":"a.db"}"#;
    const CONFIG_B: &str = r#"{"main_exchange":"binance","database_path":"b.db"}"#;

    #[test]
    fn test_invalid_initial_config_is_fatal() {
        let fixture = Fixture::new(r#"{"main_exchange":""}"#);
        let result = ConfigWatcher::<ServiceConfig>::new(&fixture.config, &fixture.schema);
        assert!(matches!(result, Err(AppError::Config(_))));
    }

    #[test]
    fn test_touch_without_changes_publishes_nothing() {
        let mut fixture = Fixture::new(CONFIG_A);
        let watcher = fixture.watcher();

        fixture.write(CONFIG_A);
        assert!(!watcher.check_for_update().unwrap());
        assert!(watcher.consume_pending().is_none());
    }

    #[test]
    fn test_change_is_published_once() {
        let mut fixture = Fixture::new(CONFIG_A);
        let watcher = fixture.watcher();
        assert!(!watcher.check_for_update().unwrap());

        fixture.write(CONFIG_B);
        assert!(watcher.check_for_update().unwrap());
        // same mtime, nothing new
        assert!(!watcher.check_for_update().unwrap());

        let next = watcher.consume_pending().unwrap();
        assert_eq!(next.database_path, PathBuf::from("b.db"));
        assert!(watcher.consume_pending().is_none());
        assert_eq!(*watcher.active_config(), next);
    }

    #[test]
    fn test_unchanged_mtime_skips_reload() {
        let mut fixture = Fixture::new(CONFIG_A);
        let watcher = fixture.watcher();
        let original = fixture.clock;

        fixture.write(CONFIG_B);
        fixture.set_mtime(original);

        assert!(!watcher.check_for_update().unwrap());
        assert_eq!(watcher.active_config().database_path, PathBuf::from("a.db"));
    }

    #[test]
    fn test_invalid_reload_keeps_active_config() {
        let mut fixture = Fixture::new(CONFIG_A);
        let watcher = fixture.watcher();

        fixture.write(r#"{"main_exchange": 42}"#);
        assert!(watcher.check_for_update().is_err());
        assert!(watcher.consume_pending().is_none());
        assert_eq!(watcher.active_config().database_path, PathBuf::from("a.db"));

        fixture.write(CONFIG_B);
        assert!(watcher.check_for_update().unwrap());
    }

    #[test]
    fn test_reverted_edit_drops_pending() {
        let mut fixture = Fixture::new(CONFIG_A);
        let watcher = fixture.watcher();

        fixture.write(CONFIG_B);
        assert!(watcher.check_for_update().unwrap());

        fixture.write(CONFIG_A);
        assert!(!watcher.check_for_update().unwrap());
        assert!(watcher.consume_pending().is_none());
    }

    #[test]
    fn test_latest_pending_wins() {
        let mut fixture = Fixture::new(CONFIG_A);
        let watcher = fixture.watcher();

        fixture.write(CONFIG_B);
        watcher.check_for_update().unwrap();
        fixture.write(r#"{"main_exchange":"binance","database_path":"c.db"}"#);
        watcher.check_for_update().unwrap();

        assert_eq!(watcher.consume_pending().unwrap().database_path, PathBuf::from("c.db"));
        assert!(watcher.consume_pending().is_none());
    }

    #[tokio::test]
    async fn test_tick_reports_reload_failure() {
        let mut fixture = Fixture::new(CONFIG_A);
        let watcher = Arc::new(fixture.watcher());

        assert!(Arc::clone(&watcher).tick().await.is_ok());
        fixture.write("{");
        assert!(Arc::clone(&watcher).tick().await.is_err());
    }
}
