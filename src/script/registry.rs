//! Script Registry
//!
//! Loads the NPC dispatch tables from `data/scripts` and swaps them as a
//! unit on reload. Responders read a snapshot through `current()`, so a
//! hook that is mid-flight keeps the tables it started with.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use serde::de::DeserializeOwned;
use tokio::sync::RwLock;
use tracing::{info, warn};

use super::definition::{
    ActivatorFile, ActivatorTable, BuffFile, BuffTable, MasterLevelFile, MasterLevelTable,
    ScholarFile, ScholarTable, ScriptBook, TeleporterFile, TeleporterTable,
};
use super::validate::validate;
use crate::data::ItemRegistry;

fn read_table<T: DeserializeOwned>(dir: &Path, name: &str) -> Result<T, String> {
    let path = dir.join(format!("{}.toml", name));
    let content = std::fs::read_to_string(&path)
        .map_err(|e| format!("Failed to read {:?}: {}", path, e))?;
    toml::from_str(&content).map_err(|e| format!("Failed to parse {:?}: {}", path, e))
}

/// Parse every table in a scripts directory
pub fn load_book(dir: &Path) -> Result<ScriptBook, String> {
    let scholar: ScholarFile = read_table(dir, "scholar")?;
    let activator: ActivatorFile = read_table(dir, "activator")?;
    let teleporter: TeleporterFile = read_table(dir, "teleporter")?;
    let buffs: BuffFile = read_table(dir, "buffs")?;
    let master_level: MasterLevelFile = read_table(dir, "master_level")?;

    Ok(ScriptBook {
        scholar: ScholarTable::from_file(scholar),
        activator: ActivatorTable::from_file(activator),
        teleporter: TeleporterTable::from_file(teleporter),
        buffs: BuffTable::from_file(buffs),
        master_level: MasterLevelTable::from_file(master_level),
    })
}

pub struct ScriptRegistry {
    book: RwLock<Arc<ScriptBook>>,
    scripts_dir: PathBuf,
    items: Arc<ItemRegistry>,
}

impl ScriptRegistry {
    pub fn new(data_dir: &Path, items: Arc<ItemRegistry>) -> Result<Self, String> {
        let scripts_dir = data_dir.join("scripts");
        let book = load_book(&scripts_dir)?;
        report(&book, &items);
        info!("Loaded NPC script tables from {:?}", scripts_dir);

        Ok(Self {
            book: RwLock::new(Arc::new(book)),
            scripts_dir,
            items,
        })
    }

    /// Snapshot of the live tables
    pub async fn current(&self) -> Arc<ScriptBook> {
        self.book.read().await.clone()
    }

    /// Re-read every table. On failure the previous tables stay live.
    pub async fn reload(&self) -> Result<(), String> {
        let book = load_book(&self.scripts_dir)?;
        report(&book, &self.items);
        *self.book.write().await = Arc::new(book);
        info!("Reloaded NPC script tables");
        Ok(())
    }

    /// Start file watcher for hot-reload
    /// Returns a channel receiver that signals when reloads occur
    pub fn start_file_watcher(
        self: &Arc<Self>,
    ) -> Result<tokio::sync::mpsc::Receiver<HotReloadEvent>, String> {
        use notify::{Config, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
        use std::time::Duration;

        if !self.scripts_dir.exists() {
            return Err(format!("Scripts directory {:?} does not exist", self.scripts_dir));
        }

        let (tx, rx) = tokio::sync::mpsc::channel(32);
        let registry = Arc::clone(self);
        let scripts_dir = self.scripts_dir.clone();
        let rt = tokio::runtime::Handle::try_current()
            .map_err(|e| format!("File watcher needs a tokio runtime: {}", e))?;

        std::thread::spawn(move || {
            let (notify_tx, notify_rx) = std::sync::mpsc::channel();

            let mut watcher = match RecommendedWatcher::new(
                move |res: Result<notify::Event, notify::Error>| {
                    if let Ok(event) = res {
                        let _ = notify_tx.send(event);
                    }
                },
                Config::default().with_poll_interval(Duration::from_secs(1)),
            ) {
                Ok(w) => w,
                Err(e) => {
                    tracing::error!("Failed to create file watcher: {}", e);
                    return;
                }
            };

            if let Err(e) = watcher.watch(&scripts_dir, RecursiveMode::Recursive) {
                tracing::error!("Failed to watch scripts directory: {}", e);
                return;
            }

            info!("Script hot-reload watcher started for {:?}", scripts_dir);

            while let Ok(event) = notify_rx.recv() {
                if !matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_)) {
                    continue;
                }
                for path in event.paths {
                    if path.extension().and_then(|e| e.to_str()) != Some("toml") {
                        continue;
                    }
                    info!("Detected change in {:?}, triggering reload", path);

                    let reg = Arc::clone(&registry);
                    let tx = tx.clone();
                    rt.spawn(async move {
                        match reg.reload().await {
                            Ok(()) => {
                                let _ = tx
                                    .send(HotReloadEvent::Reloaded(path.to_string_lossy().to_string()))
                                    .await;
                            }
                            Err(e) => {
                                tracing::error!("Hot-reload failed, keeping previous tables: {}", e);
                                let _ = tx.send(HotReloadEvent::Error(e)).await;
                            }
                        }
                    });
                }
            }
        });

        Ok(rx)
    }
}

fn report(book: &ScriptBook, items: &ItemRegistry) {
    let warnings = validate(book, items);
    for warning in &warnings {
        warn!("Script content: {}", warning);
    }
    if !warnings.is_empty() {
        info!("Script tables loaded with {} content warnings", warnings.len());
    }
}

/// Events from the hot-reload watcher
#[derive(Debug, Clone)]
pub enum HotReloadEvent {
    /// A file was reloaded successfully
    Reloaded(String),
    /// An error occurred during reload
    Error(String),
}
