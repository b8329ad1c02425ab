#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;
use tokio::sync::broadcast;

use treestore::blob::FsBlobStore;
use treestore::notify::{
    BroadcastBus, ContentSync, ContentSyncUpdate, NotifyError, Notifier, RoomMessage,
};
use treestore::store::{SqliteStore, Store};
use treestore::tree::FileTree;
use treestore::types::{NewProject, Project};

pub const OWNER: &str = "owner-1";

/// Remembers every update it receives.
#[derive(Default)]
pub struct RecordingContentSync {
    pub updates: Mutex<Vec<ContentSyncUpdate>>,
}

#[async_trait]
impl ContentSync for RecordingContentSync {
    async fn update_tree(&self, update: &ContentSyncUpdate) -> Result<(), NotifyError> {
        self.updates.lock().unwrap().push(update.clone());
        Ok(())
    }
}

pub struct TestTree {
    pub temp_dir: TempDir,
    pub store: Arc<SqliteStore>,
    pub tree: FileTree,
    pub bus: BroadcastBus,
    pub content: Arc<RecordingContentSync>,
}

impl TestTree {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("create temp dir");
        let store = Arc::new(
            SqliteStore::new(temp_dir.path().join("treestore.db")).expect("open store"),
        );
        store.initialize().expect("initialize store");

        let bus = BroadcastBus::default();
        let content = Arc::new(RecordingContentSync::default());
        let notifier = Notifier::new(
            Arc::new(bus.clone()),
            content.clone(),
            Duration::from_secs(5),
        );
        let tree = FileTree::new(
            store.clone(),
            Arc::new(FsBlobStore::new(temp_dir.path())),
            notifier,
        );

        Self {
            temp_dir,
            store,
            tree,
            bus,
            content,
        }
    }

    pub fn project(&self, name: &str) -> Project {
        self.tree
            .create_project(&NewProject {
                name: name.to_string(),
                owner_id: OWNER.to_string(),
                compiler: "pdflatex".to_string(),
                image_name: None,
            })
            .expect("create project")
    }

    pub fn root_id(&self, project_id: &str) -> String {
        self.store.get_root_folder(project_id).expect("root folder").id
    }

    pub fn tree_version(&self, project_id: &str) -> i64 {
        self.store
            .get_project(project_id)
            .expect("get project")
            .expect("project exists")
            .tree_version
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RoomMessage> {
        self.bus.subscribe()
    }
}

/// Waits for the next room message, failing the test after a second.
pub async fn next_message(rx: &mut broadcast::Receiver<RoomMessage>) -> serde_json::Value {
    let message = tokio::time::timeout(Duration::from_secs(1), rx.recv())
        .await
        .expect("room message in time")
        .expect("room message");
    serde_json::to_value(message).expect("serialize room message")
}
