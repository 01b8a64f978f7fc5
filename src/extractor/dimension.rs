use scraper::{ElementRef, Html, Selector};
use serde::Deserialize;

use super::Strategy;

/// Any image larger than the threshold in both axes.
///
/// Natural size comes from `data-width`/`data-height`, which lazy readers
/// publish before the scan loads; rendered size from `width`/`height`.
#[derive(Deserialize)]
#[serde(default)]
pub struct Dimension {
    name: String,
    min_width: u32,
    min_height: u32,
}

impl Default for Dimension {
    fn default() -> Self {
        Self {
            name: "dimension".to_owned(),
            min_width: 500,
            min_height: 500,
        }
    }
}

impl Dimension {
    fn exceeds(&self, img: &ElementRef, width_attr: &str, height_attr: &str) -> bool {
        let width = dimension(img, width_attr);
        let height = dimension(img, height_attr);
        width > f64::from(self.min_width) && height > f64::from(self.min_height)
    }
}

/// Size from `attr` in pixels, `0.0` when absent or unreadable.
fn dimension(img: &ElementRef, attr: &str) -> f64 {
    img.value()
        .attr(attr)
        .map(|v| v.trim().trim_end_matches("px"))
        .and_then(|v| v.parse::<f64>().ok())
        .filter(|v| v.is_finite() && *v > 0.0)
        .unwrap_or(0.0)
}

#[typetag::deserialize]
impl Strategy for Dimension {
    fn name(&self) -> &str {
        &self.name
    }

    fn candidates<'a>(&self, document: &'a Html) -> Vec<ElementRef<'a>> {
        let Ok(img) = Selector::parse("img") else {
            return Vec::new();
        };

        document
            .select(&img)
            .filter(|img| {
                self.exceeds(img, "data-width", "data-height")
                    || self.exceeds(img, "width", "height")
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn both_axes_must_exceed_threshold() {
        let html = Html::parse_document(
            r#"<img src="a" width="501" height="501">
               <img src="b" width="500" height="900">
               <img src="c" width="1200px" height="1700px">
               <img src="d" width="auto" height="900">"#,
        );
        let srcs: Vec<_> = Dimension::default()
            .candidates(&html)
            .iter()
            .filter_map(|img| img.value().attr("src"))
            .collect();
        assert_eq!(srcs, ["a", "c"]);
    }

    #[test]
    fn fractional_sizes_just_over_threshold_pass() {
        let html = Html::parse_document(
            r#"<img src="a" width="500.5" height="500.5">
               <img src="b" data-width="500.25" data-height="812">
               <img src="c" width="500.0" height="700">"#,
        );
        let srcs: Vec<_> = Dimension::default()
            .candidates(&html)
            .iter()
            .filter_map(|img| img.value().attr("src"))
            .collect();
        assert_eq!(srcs, ["a", "b"]);
    }
}
