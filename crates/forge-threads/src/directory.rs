use crate::{Thread, ThreadClient, ThreadClientResult, ThreadListConfig, assistant_metadata};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::warn;

/// Cached list of the assistant's threads.
#[derive(Clone)]
pub struct ThreadDirectory {
    client: Arc<dyn ThreadClient>,
    list: ThreadListConfig,
    threads: Arc<watch::Sender<Vec<Thread>>>,
}

impl ThreadDirectory {
    pub fn new(client: Arc<dyn ThreadClient>) -> Self {
        Self::with_list_config(client, ThreadListConfig::default())
    }

    pub fn with_list_config(client: Arc<dyn ThreadClient>, list: ThreadListConfig) -> Self {
        let (threads, _) = watch::channel(Vec::new());
        Self {
            client,
            list,
            threads: Arc::new(threads),
        }
    }

    /// Reloads the list. A failed search is logged and leaves an empty list.
    pub async fn refresh(&self, assistant_id: &str) -> Vec<Thread> {
        let threads = match self
            .client
            .search_threads(assistant_metadata(assistant_id), self.list.limit, self.list.offset)
            .await
        {
            Ok(threads) => threads,
            Err(error) => {
                warn!(%error, assistant_id, "thread search failed");
                Vec::new()
            }
        };
        self.threads.send_replace(threads.clone());
        threads
    }

    pub async fn create_thread(&self, assistant_id: &str) -> ThreadClientResult<Thread> {
        let thread = self
            .client
            .create_thread(assistant_metadata(assistant_id))
            .await?;
        self.refresh(assistant_id).await;
        Ok(thread)
    }

    pub async fn delete_thread(&self, assistant_id: &str, thread_id: &str) -> ThreadClientResult<()> {
        self.client.delete_thread(thread_id).await?;
        self.refresh(assistant_id).await;
        Ok(())
    }

    pub fn threads(&self) -> Vec<Thread> {
        self.threads.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Vec<Thread>> {
        self.threads.subscribe()
    }
}
