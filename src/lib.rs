pub mod config;
pub mod crawler;
pub mod extractor;
pub mod logger;
pub mod utils;

pub use config::{Config, DelaySettings};
pub use crawler::{
    BatchOrchestrator, BatchService, ChapterDescriptor, CollectionContext, Downloader,
    HttpPageSource, HttpTransfer, Parser, RunState, RunSummary,
};
pub use extractor::{ContentItem, PageExtractor};
pub use utils::{get_user_input, sanitize_filename};
