pub mod downloader;
pub mod page;
pub mod parser;
pub mod state;
pub mod transfer;

use std::sync::Arc;

use anyhow::Result;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, error, info, instrument, warn};

pub use downloader::{CollectionContext, Downloader};
pub use page::{HttpPageSource, Page, PageSource};
pub use parser::{ChapterDescriptor, CollectionInfo, Parser};
pub use state::RunState;
pub use transfer::{HttpTransfer, Transfer, TransferState, TransferTicket};

use crate::config::DelaySettings;
use crate::extractor::{ContentItem, PageExtractor};

/// What a finished run did, chapter by chapter.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct RunSummary {
    pub chapters_processed: usize,
    pub chapters_empty: usize,
    pub failures: Vec<String>,
    pub images_saved: usize,
}

/// Walks the selected chapters one after another. Sole writer of the
/// run's [`RunState`].
pub struct BatchOrchestrator {
    pages: Arc<dyn PageSource>,
    extractor: PageExtractor,
    downloader: Downloader,
    state: watch::Sender<RunState>,
}

impl BatchOrchestrator {
    pub fn new(
        pages: Arc<dyn PageSource>,
        extractor: PageExtractor,
        downloader: Downloader,
    ) -> Self {
        let (state, _) = watch::channel(RunState::idle());
        Self {
            pages,
            extractor,
            downloader,
            state,
        }
    }

    pub fn status(&self) -> RunState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<RunState> {
        self.state.subscribe()
    }

    /// Flips the state to active unless a run already holds it.
    fn try_begin(&self, total: usize) -> bool {
        self.state.send_if_modified(|state| {
            if state.active() {
                false
            } else {
                *state = RunState::started(total);
                true
            }
        })
    }

    pub async fn run(
        &self,
        chapters: &[ChapterDescriptor],
        collection_name: &str,
        delays: &DelaySettings,
    ) -> Result<RunSummary> {
        if !self.try_begin(chapters.len()) {
            anyhow::bail!("A download is already in progress.");
        }
        Ok(self.drive(chapters, collection_name, delays).await)
    }

    #[instrument(skip_all, fields(collection = %collection_name))]
    async fn drive(
        &self,
        chapters: &[ChapterDescriptor],
        collection_name: &str,
        delays: &DelaySettings,
    ) -> RunSummary {
        let total = chapters.len();
        let mut summary = RunSummary::default();
        info!("starting batch of {} chapters", total);

        for (index, chapter) in chapters.iter().enumerate() {
            self.state.send_replace(RunState::working_on(index + 1, total));
            info!("chapter {} ({}/{})", chapter.label(), index + 1, total);

            match self.chapter(chapter, collection_name, delays).await {
                Ok(Some(saved)) => {
                    summary.chapters_processed += 1;
                    summary.images_saved += saved;
                }
                Ok(None) => {
                    summary.chapters_processed += 1;
                    summary.chapters_empty += 1;
                }
                Err(e) => {
                    error!("chapter {} skipped: {:#}", chapter.label(), e);
                    summary
                        .failures
                        .push(format!("Chapter {}: {:#}", chapter.label(), e));
                }
            }

            sleep(delays.chapter()).await;
        }

        self.state.send_replace(RunState::finished(total));
        info!(
            "batch finished: {} images from {} chapters, {} failed",
            summary.images_saved,
            summary.chapters_processed,
            summary.failures.len()
        );
        summary
    }

    /// `Ok(None)` when the page showed no images.
    async fn chapter(
        &self,
        chapter: &ChapterDescriptor,
        collection_name: &str,
        delays: &DelaySettings,
    ) -> Result<Option<usize>> {
        let mut page = self.pages.open(&chapter.source_location).await?;
        let outcome = self
            .download_page(&mut page, chapter, collection_name, delays)
            .await;
        self.pages.close(page).await;
        outcome
    }

    async fn download_page(
        &self,
        page: &mut Page,
        chapter: &ChapterDescriptor,
        collection_name: &str,
        delays: &DelaySettings,
    ) -> Result<Option<usize>> {
        let items = self.settled_items(page, delays).await?;
        if items.is_empty() {
            warn!("no images found for chapter {}", chapter.label());
            return Ok(None);
        }

        let context = CollectionContext::new(collection_name, &chapter.label());
        let saved = self.downloader.acquire(&items, &context, delays).await;
        Ok(Some(saved))
    }

    /// Waits for the page to settle, then extracts. With `settle_retries`
    /// set, an empty page is reloaded and retried after another settle wait.
    async fn settled_items(
        &self,
        page: &mut Page,
        delays: &DelaySettings,
    ) -> Result<Vec<ContentItem>> {
        sleep(delays.page_load()).await;
        let mut items = self.extract(page);

        let mut attempt = 0;
        while items.is_empty() && attempt < delays.settle_retries {
            attempt += 1;
            debug!("page {} still empty, retry {}", page.id, attempt);
            sleep(delays.page_load()).await;
            self.pages.refresh(page).await?;
            items = self.extract(page);
        }
        Ok(items)
    }

    fn extract(&self, page: &Page) -> Vec<ContentItem> {
        let extraction = self.extractor.run(&page.html, &page.url);
        debug!("strategies tried: {}", extraction.attempted.join(", "));
        extraction.items
    }
}

/// Starts runs in the background and answers progress queries.
#[derive(Clone)]
pub struct BatchService {
    orchestrator: Arc<BatchOrchestrator>,
}

impl BatchService {
    pub fn new(orchestrator: BatchOrchestrator) -> Self {
        Self {
            orchestrator: Arc::new(orchestrator),
        }
    }

    pub fn status(&self) -> RunState {
        self.orchestrator.status()
    }

    pub fn subscribe(&self) -> watch::Receiver<RunState> {
        self.orchestrator.subscribe()
    }

    /// Begins a run unless one is active. The state is already active when
    /// this returns; the run itself proceeds on a spawned task.
    pub fn start_batch(
        &self,
        chapters: Vec<ChapterDescriptor>,
        collection_name: String,
        delays: DelaySettings,
    ) -> Result<JoinHandle<RunSummary>> {
        if !self.orchestrator.try_begin(chapters.len()) {
            anyhow::bail!("A download is already in progress.");
        }

        let orchestrator = Arc::clone(&self.orchestrator);
        Ok(tokio::spawn(async move {
            orchestrator.drive(&chapters, &collection_name, &delays).await
        }))
    }
}
