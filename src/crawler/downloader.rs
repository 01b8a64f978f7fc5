use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};
use std::time::Duration;

use regex::Regex;
use tokio::time::{sleep, timeout};
use tracing::{info, instrument, warn};

use crate::config::DelaySettings;
use crate::crawler::transfer::{Transfer, TransferState};
use crate::extractor::ContentItem;
use crate::utils::sanitize_filename;

/// Longest wait for a single transfer to report how it ended.
pub const TRANSFER_CEILING: Duration = Duration::from_secs(30);

static ALLOWED_EXTENSIONS: [&str; 5] = ["jpg", "jpeg", "png", "webp", "gif"];
static DEFAULT_EXTENSION: &str = "jpg";

static EXTENSION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\.([a-zA-Z0-9]+)(?:\?|$)").unwrap());

/// Naming inputs for one chapter's files.
#[derive(Debug, Clone)]
pub struct CollectionContext {
    pub collection_name: String,
    pub chapter_label: String,
}

impl CollectionContext {
    pub fn new(collection_name: &str, chapter_label: &str) -> Self {
        Self {
            collection_name: collection_name.to_owned(),
            chapter_label: chapter_label.to_owned(),
        }
    }

    /// `<root>/<collection>/Chapter <label>`, both segments sanitized.
    pub fn chapter_dir(&self, root: &Path) -> PathBuf {
        root.join(sanitize_filename(Some(&self.collection_name)))
            .join(format!(
                "Chapter {}",
                sanitize_filename(Some(&self.chapter_label))
            ))
    }
}

/// Lower-cased image extension of `url`, or `jpg` when it is missing or
/// not a known image type.
pub fn detect_extension(url: &str) -> String {
    EXTENSION
        .captures(url)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_lowercase())
        .filter(|ext| ALLOWED_EXTENSIONS.contains(&ext.as_str()))
        .unwrap_or_else(|| DEFAULT_EXTENSION.to_owned())
}

/// `001.jpg`, `012.png`, ...
pub fn image_filename(item: &ContentItem) -> String {
    format!(
        "{:03}.{}",
        item.ordinal,
        detect_extension(&item.source_location)
    )
}

pub struct Downloader {
    transfer: Arc<dyn Transfer>,
    root: PathBuf,
    ceiling: Duration,
}

impl Downloader {
    pub fn new(transfer: Arc<dyn Transfer>, root: PathBuf) -> Self {
        Self {
            transfer,
            root,
            ceiling: TRANSFER_CEILING,
        }
    }

    /// Fetches every item in order, one at a time, and returns how many
    /// transfers were seen to complete. Failures never stop the chapter.
    #[instrument(skip_all, fields(chapter = %context.chapter_label))]
    pub async fn acquire(
        &self,
        items: &[ContentItem],
        context: &CollectionContext,
        delays: &DelaySettings,
    ) -> usize {
        let dir = context.chapter_dir(&self.root);
        info!("downloading {} images to {}", items.len(), dir.display());

        let mut completed = 0;
        for item in items {
            let destination = dir.join(image_filename(item));

            match self.transfer.submit(&item.source_location, &destination) {
                Err(e) => {
                    warn!("image {} could not be started: {}", item.ordinal, e);
                }
                Ok(mut ticket) => {
                    let id = ticket.id;
                    match timeout(self.ceiling, ticket.finished()).await {
                        Ok(TransferState::Completed) => completed += 1,
                        Ok(state) => {
                            warn!(
                                "image {} (transfer {}) ended as {:?}: {}",
                                item.ordinal, id, state, item.source_location
                            );
                        }
                        Err(_) => {
                            warn!(
                                "image {} (transfer {}) still running after {}s, moving on",
                                item.ordinal,
                                id,
                                self.ceiling.as_secs()
                            );
                        }
                    }
                }
            }

            sleep(delays.image()).await;
        }

        info!(
            "chapter {}: {}/{} images downloaded",
            context.chapter_label,
            completed,
            items.len()
        );
        completed
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::path::Component;
    use std::sync::Mutex;

    use anyhow::Result;
    use tokio::sync::watch;

    use super::*;
    use crate::crawler::transfer::TransferTicket;

    #[derive(Clone, Copy)]
    enum Outcome {
        Reject,
        Complete,
        Interrupt,
        Hang,
    }

    #[derive(Default)]
    struct ScriptedTransfer {
        outcomes: Mutex<VecDeque<Outcome>>,
        submitted: Mutex<Vec<PathBuf>>,
        hanging: Mutex<Vec<watch::Sender<TransferState>>>,
    }

    impl ScriptedTransfer {
        fn new(outcomes: &[Outcome]) -> Arc<Self> {
            Arc::new(Self {
                outcomes: Mutex::new(outcomes.iter().copied().collect()),
                ..Default::default()
            })
        }
    }

    impl Transfer for ScriptedTransfer {
        fn submit(&self, _url: &str, destination: &Path) -> Result<TransferTicket> {
            self.submitted.lock().unwrap().push(destination.to_path_buf());
            let outcome = self
                .outcomes
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Outcome::Complete);
            let id = self.submitted.lock().unwrap().len() as u64;
            match outcome {
                Outcome::Reject => anyhow::bail!("refused"),
                Outcome::Complete => Ok(TransferTicket::new(
                    id,
                    watch::channel(TransferState::Completed).1,
                )),
                Outcome::Interrupt => Ok(TransferTicket::new(
                    id,
                    watch::channel(TransferState::Interrupted).1,
                )),
                Outcome::Hang => {
                    let (tx, rx) = watch::channel(TransferState::InProgress);
                    self.hanging.lock().unwrap().push(tx);
                    Ok(TransferTicket::new(id, rx))
                }
            }
        }
    }

    fn items(urls: &[&str]) -> Vec<ContentItem> {
        urls.iter()
            .enumerate()
            .map(|(i, url)| ContentItem {
                source_location: url.to_string(),
                ordinal: i + 1,
            })
            .collect()
    }

    #[test]
    fn extension_detection() {
        assert_eq!(detect_extension("https://cdn.test/a/001.PNG?x=1"), "png");
        assert_eq!(detect_extension("https://cdn.test/a/001.webp"), "webp");
        assert_eq!(detect_extension("https://cdn.test/a/001.jpeg"), "jpeg");
        assert_eq!(detect_extension("https://cdn.test/a/image"), "jpg");
        assert_eq!(detect_extension("https://cdn.test/view.php?id=3"), "jpg");
        assert_eq!(detect_extension("https://cdn.test/a.b/c"), "jpg");
    }

    #[test]
    fn filenames_are_zero_padded() {
        let first = ContentItem {
            source_location: "https://cdn.test/x.jpg".into(),
            ordinal: 1,
        };
        let twelfth = ContentItem {
            source_location: "https://cdn.test/y.png".into(),
            ordinal: 12,
        };
        assert_eq!(image_filename(&first), "001.jpg");
        assert_eq!(image_filename(&twelfth), "012.png");
    }

    #[test]
    fn chapter_directory_layout() {
        let context = CollectionContext::new("Re:Zero  / Arc 3 ", "10.5");
        assert_eq!(
            context.chapter_dir(Path::new("Manga")),
            Path::new("Manga").join("Re_Zero _ Arc 3").join("Chapter 10.5")
        );
        let unnamed = CollectionContext::new("", "");
        assert_eq!(
            unnamed.chapter_dir(Path::new("Manga")),
            Path::new("Manga").join("unknown").join("Chapter unknown")
        );
    }

    #[test]
    fn hostile_titles_stay_inside_the_root() {
        let root = Path::new("/out/Manga");
        let cases = [
            ("..", "1"),
            (".", "1"),
            ("   ", "1"),
            ("One", ".."),
            ("../..", "2"),
        ];
        for (title, label) in cases {
            let dir = CollectionContext::new(title, label).chapter_dir(root);
            assert!(dir.starts_with(root));
            assert_eq!(dir.components().count(), root.components().count() + 2);
            assert!(
                dir.components()
                    .all(|c| !matches!(c, Component::ParentDir | Component::CurDir))
            );
        }
        assert_eq!(
            CollectionContext::new("   ", "1").chapter_dir(root),
            root.join("unknown").join("Chapter 1")
        );
        assert_eq!(
            CollectionContext::new("..", "1").chapter_dir(root),
            root.join("unknown").join("Chapter 1")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn counts_only_confirmed_completions() {
        let transfer = ScriptedTransfer::new(&[
            Outcome::Complete,
            Outcome::Reject,
            Outcome::Interrupt,
            Outcome::Hang,
            Outcome::Complete,
        ]);
        let downloader = Downloader::new(transfer.clone(), PathBuf::from("Manga"));
        let context = CollectionContext::new("Solo Leveling", "1");
        let items = items(&[
            "https://cdn.test/1.jpg",
            "https://cdn.test/2.jpg",
            "https://cdn.test/3.jpg",
            "https://cdn.test/4.jpg",
            "https://cdn.test/5.png",
        ]);

        let started = tokio::time::Instant::now();
        let completed = downloader
            .acquire(&items, &context, &DelaySettings::default())
            .await;

        assert_eq!(completed, 2);
        assert!(completed <= items.len());
        // every item was attempted, in order
        let submitted = transfer.submitted.lock().unwrap().clone();
        let names: Vec<_> = submitted
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, ["001.jpg", "002.jpg", "003.jpg", "004.jpg", "005.png"]);
        // five image delays plus one expired ceiling
        assert!(started.elapsed() >= Duration::from_secs(5 * 2 + 30));
    }

    #[tokio::test]
    async fn all_completed_matches_input_length() {
        let transfer = ScriptedTransfer::new(&[]);
        let downloader = Downloader::new(transfer, PathBuf::from("Manga"));
        let items = items(&["https://cdn.test/1.jpg", "https://cdn.test/2.jpg"]);
        let completed = downloader
            .acquire(
                &items,
                &CollectionContext::new("x", "2"),
                &DelaySettings::immediate(),
            )
            .await;
        assert_eq!(completed, items.len());
    }
}
