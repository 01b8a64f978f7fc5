pub mod dimension;
pub mod select;

use anyhow::Result;
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Deserializer};
use tracing::{debug, info, instrument};
use url::Url;

pub use dimension::Dimension;
pub use select::Select;

/// Substrings marking site chrome rather than page scans.
static EXCLUDED_MARKERS: [&str; 3] = ["icon", "avatar", "logo"];

/// One way of locating page images in a chapter document.
#[typetag::deserialize(tag = "type")]
pub trait Strategy: Send + Sync {
    fn name(&self) -> &str;

    /// Matching `img` elements in document order.
    fn candidates<'a>(&self, document: &'a Html) -> Vec<ElementRef<'a>>;
}

/// A page image within a chapter, numbered from 1 in page order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentItem {
    pub source_location: String,
    pub ordinal: usize,
}

#[derive(Debug, Default)]
pub struct Extraction {
    pub attempted: Vec<String>,
    pub matched: Option<String>,
    pub items: Vec<ContentItem>,
}

pub struct PageExtractor {
    strategies: Vec<Box<dyn Strategy>>,
}

impl PageExtractor {
    pub fn new(strategies: Vec<Box<dyn Strategy>>) -> Self {
        Self { strategies }
    }

    /// The reader layouts of comick.io, most specific first.
    pub fn builtin() -> Result<Self> {
        let strategies: Vec<Box<dyn Strategy>> = vec![
            Box::new(Select::new(
                "reader-container",
                r#".flex.flex-col img[src*="/comic/"], .reader-container img"#,
            )?),
            Box::new(Select::new(
                "fixed-width",
                r#"img[width="800"], img[width="1000"], img[width="1200"]"#,
            )?),
            Box::new(Select::new(
                "chapter-container",
                ".chapter-container img, .reader img, .chapter-images img",
            )?),
            Box::new(Dimension::default()),
        ];
        Ok(Self::new(strategies))
    }

    pub fn from_config(strategies: Option<Vec<Box<dyn Strategy>>>) -> Result<Self> {
        match strategies {
            Some(strategies) if !strategies.is_empty() => Ok(Self::new(strategies)),
            _ => Self::builtin(),
        }
    }

    pub fn extract(&self, html: &str, page_url: &str) -> Vec<ContentItem> {
        self.run(html, page_url).items
    }

    /// Tries each strategy in turn; the first one with any match decides.
    #[instrument(skip_all)]
    pub fn run(&self, html: &str, page_url: &str) -> Extraction {
        let document = Html::parse_document(html);
        let base = Url::parse(page_url).ok();
        let mut extraction = Extraction::default();

        for strategy in &self.strategies {
            extraction.attempted.push(strategy.name().to_owned());
            let candidates = strategy.candidates(&document);
            if candidates.is_empty() {
                debug!("strategy {} found nothing", strategy.name());
                continue;
            }

            extraction.matched = Some(strategy.name().to_owned());
            extraction.items = candidates
                .into_iter()
                .map(|img| image_source(img, base.as_ref()))
                .filter(|src| is_page_image(src))
                .enumerate()
                .map(|(index, source_location)| ContentItem {
                    source_location,
                    ordinal: index + 1,
                })
                .collect();
            info!(
                "strategy {} matched, {} images kept",
                strategy.name(),
                extraction.items.len()
            );
            break;
        }

        extraction
    }
}

/// The `src` attribute as the browser would resolve it.
fn image_source(img: ElementRef, base: Option<&Url>) -> String {
    let Some(src) = img.value().attr("src").map(str::trim) else {
        return String::new();
    };
    if src.is_empty() {
        return String::new();
    }
    match base.and_then(|base| base.join(src).ok()) {
        Some(url) => url.to_string(),
        None => src.to_owned(),
    }
}

fn is_page_image(src: &str) -> bool {
    !src.is_empty() && !EXCLUDED_MARKERS.iter().any(|marker| src.contains(marker))
}

pub(crate) fn parse_selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| anyhow::anyhow!("invalid selector '{}': {}", css, e))
}

fn deserialize_selector<'de, D>(deserializer: D) -> Result<Selector, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;

    Selector::parse(&s).map_err(|e| serde::de::Error::custom(format!("Invalid selector: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = "https://comick.io/comic/solo/abcd-chapter-3-en";

    fn page(body: &str) -> String {
        format!("<!doctype html><html><body>{}</body></html>", body)
    }

    #[test]
    fn first_strategy_wins() {
        let html = page(
            r#"<div class="reader-container">
                 <img src="https://cdn.example.com/p/001.jpg">
                 <img src="https://cdn.example.com/p/002.webp">
               </div>
               <div class="chapter-container"><img src="https://cdn.example.com/other.jpg"></div>"#,
        );
        let extraction = PageExtractor::builtin().unwrap().run(&html, PAGE);
        assert_eq!(extraction.attempted, ["reader-container"]);
        assert_eq!(extraction.matched.as_deref(), Some("reader-container"));
        assert_eq!(
            extraction.items,
            vec![
                ContentItem {
                    source_location: "https://cdn.example.com/p/001.jpg".into(),
                    ordinal: 1
                },
                ContentItem {
                    source_location: "https://cdn.example.com/p/002.webp".into(),
                    ordinal: 2
                },
            ]
        );
    }

    #[test]
    fn falls_through_to_broader_containers() {
        let html = page(
            r#"<div class="chapter-images">
                 <img src="/scans/1.png"><img src="/scans/2.png"><img src="/scans/3.png">
               </div>"#,
        );
        let extraction = PageExtractor::builtin().unwrap().run(&html, PAGE);
        assert_eq!(
            extraction.attempted,
            ["reader-container", "fixed-width", "chapter-container"]
        );
        assert_eq!(extraction.matched.as_deref(), Some("chapter-container"));
        let sources: Vec<_> = extraction
            .items
            .iter()
            .map(|i| i.source_location.as_str())
            .collect();
        assert_eq!(
            sources,
            [
                "https://comick.io/scans/1.png",
                "https://comick.io/scans/2.png",
                "https://comick.io/scans/3.png"
            ]
        );
    }

    #[test]
    fn dimension_fallback_is_last_resort() {
        let html = page(
            r#"<img src="/small.jpg" width="120" height="90">
               <img src="/big.jpg" width="720" height="1100">
               <img src="/lazy.jpg" data-width="900" data-height="1300">"#,
        );
        let extraction = PageExtractor::builtin().unwrap().run(&html, PAGE);
        assert_eq!(extraction.attempted.len(), 4);
        let sources: Vec<_> = extraction
            .items
            .iter()
            .map(|i| i.source_location.as_str())
            .collect();
        assert_eq!(
            sources,
            ["https://comick.io/big.jpg", "https://comick.io/lazy.jpg"]
        );
    }

    #[test]
    fn drops_chrome_and_renumbers() {
        let html = page(
            r#"<div class="reader">
                 <img src="https://cdn.example.com/site-logo.png">
                 <img src="https://cdn.example.com/1.jpg">
                 <img src="">
                 <img src="https://cdn.example.com/user-avatar.jpg">
                 <img src="https://cdn.example.com/2.jpg">
                 <img src="https://cdn.example.com/favicon.png">
                 <img src="https://cdn.example.com/ICON.jpg">
               </div>"#,
        );
        let items = PageExtractor::builtin().unwrap().extract(&html, PAGE);
        let sources: Vec<_> = items
            .iter()
            .map(|i| (i.ordinal, i.source_location.as_str()))
            .collect();
        assert_eq!(
            sources,
            [
                (1, "https://cdn.example.com/1.jpg"),
                (2, "https://cdn.example.com/2.jpg"),
                (3, "https://cdn.example.com/ICON.jpg"),
            ]
        );
    }

    #[test]
    fn nothing_found_is_empty() {
        let html = page(r#"<p>Loading...</p><img src="/tiny.gif" width="10" height="10">"#);
        let extraction = PageExtractor::builtin().unwrap().run(&html, PAGE);
        assert!(extraction.items.is_empty());
        assert!(extraction.matched.is_none());
        assert_eq!(extraction.attempted.len(), 4);
    }

    #[test]
    fn configured_cascade_replaces_builtin() {
        let pages: Box<dyn Strategy> = Box::new(Select::new("pages", "figure img").unwrap());
        let extractor = PageExtractor::from_config(Some(vec![pages])).unwrap();
        let html = page(
            r#"<figure><img src="https://x.test/a.jpg"></figure>
               <div class="reader-container"><img src="https://x.test/b.jpg"></div>"#,
        );
        let extraction = extractor.run(&html, PAGE);
        assert_eq!(extraction.attempted, ["pages"]);
        assert_eq!(extraction.items.len(), 1);
    }
}
