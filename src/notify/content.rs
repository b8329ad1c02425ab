use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;

use super::NotifyError;
use super::events::ContentSyncUpdate;

/// Keeps the content-sync service's view of document paths current.
#[async_trait]
pub trait ContentSync: Send + Sync {
    async fn update_tree(&self, update: &ContentSyncUpdate) -> Result<(), NotifyError>;
}

/// Posts updates to `{base_url}/project/{id}/tree`.
#[derive(Clone)]
pub struct HttpContentSync {
    client: Client,
    base_url: String,
}

impl HttpContentSync {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, NotifyError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn tree_url(&self, project_id: &str) -> String {
        format!("{}/project/{}/tree", self.base_url, project_id)
    }
}

#[async_trait]
impl ContentSync for HttpContentSync {
    async fn update_tree(&self, update: &ContentSyncUpdate) -> Result<(), NotifyError> {
        let resp = self
            .client
            .post(self.tree_url(&update.project_id))
            .json(update)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(NotifyError::Status(status.as_u16()));
        }
        Ok(())
    }
}

/// Used when no content-sync service is configured.
pub struct NoopContentSync;

#[async_trait]
impl ContentSync for NoopContentSync {
    async fn update_tree(&self, update: &ContentSyncUpdate) -> Result<(), NotifyError> {
        tracing::trace!(project_id = %update.project_id, "content sync disabled");
        Ok(())
    }
}
