use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;

use comick_fetch::config::CONFIG_FILE;
use comick_fetch::crawler::PageSource;
use comick_fetch::crawler::parser::{info_from_url, is_listing_url, select_range};
use comick_fetch::utils::{confirm, display_elapsed_time, get_chapter_range};
use comick_fetch::{
    BatchOrchestrator, BatchService, ChapterDescriptor, Config, DelaySettings, Downloader,
    HttpPageSource, HttpTransfer, PageExtractor, Parser, RunSummary, get_user_input, logger,
};

const STATUS_INTERVAL: Duration = Duration::from_secs(2);

struct App {
    delays: DelaySettings,
    pages: Arc<HttpPageSource>,
    parser: Parser,
    service: BatchService,
}

impl App {
    fn new(mut config: Config) -> Result<Self> {
        let client = config.http_client()?;
        let pages = Arc::new(HttpPageSource::new(client.clone()));
        let extractor = PageExtractor::from_config(config.site.strategies.take())?;
        let downloader = Downloader::new(
            Arc::new(HttpTransfer::new(client)),
            config.output_dir.clone(),
        );
        let orchestrator = BatchOrchestrator::new(pages.clone(), extractor, downloader);

        Ok(Self {
            delays: config.delays,
            parser: Parser::new(&config.site)?,
            pages,
            service: BatchService::new(orchestrator),
        })
    }

    async fn batch(&self, url: &str) -> Result<()> {
        let listing = self.pages.open(url).await?;
        let info = self.parser.collection_info(&listing.html);
        let catalog = self.parser.chapters(&listing.html, &listing.url)?;
        self.pages.close(listing).await;

        println!("Manga: {} ({} chapters listed)", info.title, catalog.len());
        let (from, to) = get_chapter_range(info.max_chapter)?;
        let selected = select_range(&catalog, from, to)?;
        if selected.is_empty() {
            println!("No chapters found in the selected range.");
            return Ok(());
        }

        println!("Found {} chapters. Starting download...", selected.len());
        let summary = self.watch(selected, info.title, self.delays).await?;
        println!(
            "Downloaded {} images across {} chapters ({} without images).",
            summary.images_saved, summary.chapters_processed, summary.chapters_empty
        );
        Ok(())
    }

    async fn single(&self, url: &str) -> Result<()> {
        let page = self.pages.open(url).await?;
        let from_url = info_from_url(url);
        let from_page = self.parser.chapter_page_info(&page.html);
        self.pages.close(page).await;

        let title = from_url
            .title
            .or(from_page.title)
            .unwrap_or_else(|| "Manga".to_owned());
        let chapter = from_url
            .chapter
            .or(from_page.chapter)
            .unwrap_or_else(|| "0".to_owned());
        // the folder keeps the label as written; the number only orders chapters
        let number = chapter.parse::<f64>().unwrap_or(0.0);

        println!("Downloading {} chapter {}...", title, chapter);
        // the page is already known to be reachable, no need to pace around it
        let delays = DelaySettings {
            page_load_delay: 0.0,
            chapter_delay: 0.0,
            ..self.delays
        };
        let descriptor = ChapterDescriptor::new(number, url).with_label(chapter.as_str());
        let summary = self.watch(vec![descriptor], title, delays).await?;
        if summary.chapters_empty > 0 {
            println!("No images found. Make sure this is a chapter page.");
        } else {
            println!(
                "Completed Chapter {}: {} images downloaded",
                chapter, summary.images_saved
            );
        }
        Ok(())
    }

    /// Starts the run and prints its progress until it ends.
    async fn watch(
        &self,
        chapters: Vec<ChapterDescriptor>,
        title: String,
        delays: DelaySettings,
    ) -> Result<RunSummary> {
        let handle = self.service.start_batch(chapters, title, delays)?;
        let mut ticker = tokio::time::interval(STATUS_INTERVAL);
        while !handle.is_finished() {
            ticker.tick().await;
            let status = self.service.status();
            if status.active() {
                println!("{}", status);
            }
        }

        let summary = handle.await?;
        for failure in &summary.failures {
            println!("⚠ {}", failure);
        }
        Ok(summary)
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    logger::init();
    let app = App::new(Config::load(Path::new(CONFIG_FILE))?)?;

    loop {
        println!("\n=== comick-fetch ===");
        match get_user_input() {
            Ok(url) => {
                let start = Instant::now();
                let result = if is_listing_url(&url) {
                    app.batch(&url).await
                } else {
                    app.single(&url).await
                };
                match result {
                    Ok(()) => display_elapsed_time(start.elapsed()),
                    Err(e) => println!("Error: {:#}", e),
                }
            }
            Err(e) => {
                println!("Input error: {}", e);
            }
        }

        if !confirm("\nDownload something else? (y/n): ")? {
            break;
        }
    }

    println!("Bye.");
    Ok(())
}
