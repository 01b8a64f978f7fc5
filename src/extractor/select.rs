use anyhow::Result;
use scraper::{ElementRef, Html, Selector};
use serde::Deserialize;

use super::{Strategy, deserialize_selector, parse_selector};

/// Images matched by a CSS selector group.
#[derive(Deserialize)]
pub struct Select {
    name: String,
    #[serde(deserialize_with = "deserialize_selector")]
    selector: Selector,
}

impl Select {
    pub fn new(name: &str, css: &str) -> Result<Self> {
        Ok(Self {
            name: name.to_owned(),
            selector: parse_selector(css)?,
        })
    }
}

#[typetag::deserialize]
impl Strategy for Select {
    fn name(&self) -> &str {
        &self.name
    }

    fn candidates<'a>(&self, document: &'a Html) -> Vec<ElementRef<'a>> {
        document
            .select(&self.selector)
            .filter(|elem| elem.value().name() == "img")
            .collect()
    }
}
