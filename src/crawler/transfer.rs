use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::Result;
use bytes::Bytes;
use reqwest::Client;
use tokio::fs;
use tokio::sync::watch;
use tracing::{info, warn};
use url::Url;

pub type TransferId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferState {
    InProgress,
    Completed,
    Interrupted,
}

impl TransferState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Interrupted)
    }
}

/// A submitted transfer and the stream of its state changes.
///
/// Dropping the ticket unsubscribes from that transfer only.
pub struct TransferTicket {
    pub id: TransferId,
    pub state: watch::Receiver<TransferState>,
}

impl TransferTicket {
    pub fn new(id: TransferId, state: watch::Receiver<TransferState>) -> Self {
        Self { id, state }
    }

    /// Waits for `Completed` or `Interrupted`. A notifier that goes away
    /// without reaching either counts as interrupted.
    pub async fn finished(&mut self) -> TransferState {
        match self.state.wait_for(|s| s.is_terminal()).await {
            Ok(state) => *state,
            Err(_) => TransferState::Interrupted,
        }
    }
}

/// Fetch-and-save primitive. `submit` only issues the transfer; the ticket
/// reports how it ends.
pub trait Transfer: Send + Sync {
    fn submit(&self, url: &str, destination: &Path) -> Result<TransferTicket>;
}

pub struct HttpTransfer {
    client: Client,
    next_id: AtomicU64,
}

impl HttpTransfer {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            next_id: AtomicU64::new(1),
        }
    }
}

impl Transfer for HttpTransfer {
    fn submit(&self, url: &str, destination: &Path) -> Result<TransferTicket> {
        let url =
            Url::parse(url).map_err(|e| anyhow::anyhow!("invalid image url {}: {}", url, e))?;
        if !matches!(url.scheme(), "http" | "https") {
            anyhow::bail!("unsupported scheme for {}", url);
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = watch::channel(TransferState::InProgress);
        let client = self.client.clone();
        let destination = destination.to_path_buf();

        tokio::spawn(async move {
            let state = match fetch(&client, url.clone()).await {
                Ok(bytes) => match save(&destination, bytes).await {
                    Ok(()) => {
                        info!("transfer {} saved to {}", id, destination.display());
                        TransferState::Completed
                    }
                    Err(e) => {
                        warn!("transfer {} could not be written: {}", id, e);
                        TransferState::Interrupted
                    }
                },
                Err(e) => {
                    warn!("transfer {} failed for {}: {}", id, url, e);
                    TransferState::Interrupted
                }
            };
            tx.send_replace(state);
        });

        Ok(TransferTicket::new(id, rx))
    }
}

async fn fetch(client: &Client, url: Url) -> Result<Bytes> {
    let response = client.get(url).send().await?.error_for_status()?;
    Ok(response.bytes().await?)
}

async fn save(destination: &Path, bytes: Bytes) -> Result<()> {
    if let Some(parent) = destination.parent() {
        fs::create_dir_all(parent).await?;
    }
    fs::write(destination, &bytes).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn dropped_notifier_counts_as_interrupted() {
        let (tx, rx) = watch::channel(TransferState::InProgress);
        let mut ticket = TransferTicket::new(7, rx);
        drop(tx);
        assert_eq!(ticket.finished().await, TransferState::Interrupted);
    }

    #[tokio::test]
    async fn rejects_malformed_addresses() {
        let transfer = HttpTransfer::new(Client::new());
        let dir = tempfile::tempdir().unwrap();
        assert!(transfer.submit("::nope", &dir.path().join("001.jpg")).is_err());
        assert!(
            transfer
                .submit("data:image/png;base64,AAAA", &dir.path().join("002.png"))
                .is_err()
        );
    }
}
