use std::sync::LazyLock;

use anyhow::Result;
use regex::Regex;
use scraper::{Html, Selector};
use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::config::SiteConfig;
use crate::extractor::parse_selector;

static CHAPTER_TEXT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)Chapter (\d+(?:\.\d+)?)").unwrap());
static CHAPTER_HREF: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)chapter[^\d]*(\d+(?:\.\d+)?)").unwrap());
static CHAPTER_SLUG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(?:chapter|ch)[^\d]*(\d+(?:\.\d+)?)").unwrap());
static ANY_NUMBER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(\d+(?:\.\d+)?)").unwrap());
static HEADING_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)Chapter (\d+)").unwrap());
static WORD_START: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\b\w").unwrap());
static LISTING_PATH: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^/comic/[^/]+$").unwrap());

/// One chapter of the work: its number and where its reader page lives.
///
/// `chapter_label` keeps the chapter as written on the site (`01`, `7b`)
/// when it differs from the plain number.
#[derive(Debug, Clone, PartialEq)]
pub struct ChapterDescriptor {
    pub number: f64,
    pub source_location: String,
    pub chapter_label: Option<String>,
}

impl ChapterDescriptor {
    pub fn new(number: f64, source_location: impl Into<String>) -> Self {
        Self {
            number,
            source_location: source_location.into(),
            chapter_label: None,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.chapter_label = Some(label.into());
        self
    }

    /// Label used for the chapter folder, e.g. `3`, `10.5` or `01`.
    pub fn label(&self) -> String {
        match &self.chapter_label {
            Some(label) => label.clone(),
            None => self.number.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CollectionInfo {
    pub title: String,
    pub max_chapter: f64,
}

/// Naming hints for a lone chapter page.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ChapterInfo {
    pub title: Option<String>,
    pub chapter: Option<String>,
}

pub struct Parser {
    chapter_links: Selector,
    title: Selector,
    episode_items: Selector,
    chapter_heading: Selector,
}

impl Parser {
    pub fn new(site: &SiteConfig) -> Result<Self> {
        Ok(Self {
            chapter_links: parse_selector(&site.chapter_links)?,
            title: parse_selector(&site.title)?,
            episode_items: parse_selector(&site.episode_items)?,
            chapter_heading: parse_selector(&site.chapter_heading)?,
        })
    }

    /// Builds the chapter catalog of an already loaded listing page.
    ///
    /// Links whose number cannot be read are dropped, the first link seen
    /// for a number wins and the result is ascending by number.
    #[instrument(skip_all)]
    pub fn chapters(
        &self,
        listing_html: &str,
        listing_url: &str,
    ) -> Result<Vec<ChapterDescriptor>> {
        let listing = Url::parse(listing_url)?;
        let origin = Url::parse(&listing.origin().ascii_serialization())?;
        let document = Html::parse_document(listing_html);

        let mut chapters: Vec<ChapterDescriptor> = Vec::new();
        for link in document.select(&self.chapter_links) {
            let Some(href) = link.value().attr("href") else {
                continue;
            };
            let text = link.text().collect::<String>();

            let Some(number) = capture_number(&CHAPTER_TEXT, &text)
                .or_else(|| capture_number(&CHAPTER_HREF, href))
            else {
                debug!("no chapter number in link: {}", href);
                continue;
            };

            if chapters.iter().any(|c| c.number == number) {
                continue;
            }

            let Ok(target) = origin.join(href) else {
                warn!("unusable chapter link: {}", href);
                continue;
            };

            chapters.push(ChapterDescriptor::new(number, target.to_string()));
        }

        chapters.sort_by(|a, b| a.number.total_cmp(&b.number));
        info!("found {} chapters", chapters.len());
        Ok(chapters)
    }

    pub fn collection_info(&self, listing_html: &str) -> CollectionInfo {
        let document = Html::parse_document(listing_html);

        let title = document
            .select(&self.title)
            .next()
            .map(|h| h.text().collect::<String>().trim().to_owned())
            .unwrap_or_else(|| "Unknown Manga".to_owned());

        let max_chapter = document
            .select(&self.episode_items)
            .filter_map(|item| capture_number(&CHAPTER_TEXT, &item.text().collect::<String>()))
            .fold(0.0, f64::max);

        CollectionInfo { title, max_chapter }
    }

    /// Title and chapter label read off a chapter reader page.
    pub fn chapter_page_info(&self, chapter_html: &str) -> ChapterInfo {
        let document = Html::parse_document(chapter_html);

        let title = document
            .select(&self.title)
            .next()
            .map(|h| h.text().collect::<String>().trim().to_owned())
            .filter(|t| !t.is_empty());

        let chapter = document.select(&self.chapter_heading).next().and_then(|h| {
            let text = h.text().collect::<String>();
            HEADING_NUMBER
                .captures(&text)
                .and_then(|caps| caps.get(1))
                .map(|m| m.as_str().to_owned())
        });

        ChapterInfo { title, chapter }
    }
}

fn capture_number(pattern: &Regex, haystack: &str) -> Option<f64> {
    pattern
        .captures(haystack)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse::<f64>().ok())
}

/// Chapters whose number lies in `from..=to`, keeping catalog order.
pub fn select_range(
    catalog: &[ChapterDescriptor],
    from: f64,
    to: f64,
) -> Result<Vec<ChapterDescriptor>> {
    if !from.is_finite() || !to.is_finite() || from > to {
        anyhow::bail!("Please enter valid chapter numbers.");
    }
    Ok(catalog
        .iter()
        .filter(|c| c.number >= from && c.number <= to)
        .cloned()
        .collect())
}

/// True for a work's main page, `/comic/<slug>` with nothing after it.
pub fn is_listing_url(url: &str) -> bool {
    Url::parse(url).is_ok_and(|u| LISTING_PATH.is_match(u.path()))
}

/// Reads the work title and chapter label out of a reader URL such as
/// `/comic/isekai-koushoku-musou-roku/TSXk8cIm-chapter-1-en`.
pub fn info_from_url(url: &str) -> ChapterInfo {
    let Ok(url) = Url::parse(url) else {
        warn!("could not parse url: {}", url);
        return ChapterInfo::default();
    };
    let parts: Vec<&str> = url.path().split('/').filter(|p| !p.is_empty()).collect();
    if parts.len() < 2 {
        return ChapterInfo::default();
    }

    let title = (parts[0] == "comic").then(|| {
        let spaced = parts[1].replace('-', " ");
        WORD_START
            .replace_all(&spaced, |caps: &regex::Captures| caps[0].to_uppercase())
            .into_owned()
    });

    let chapter = parts.get(2).and_then(|slug| {
        CHAPTER_SLUG
            .captures(slug)
            .or_else(|| ANY_NUMBER.captures(slug))
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_owned())
    });

    ChapterInfo { title, chapter }
}
