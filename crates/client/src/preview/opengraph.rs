//! OpenGraph `<meta property="og:*">` harvesting.

use scraper::{Html, Selector};

/// The OpenGraph properties a preview uses.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OpenGraph {
    pub title: Option<String>,
    pub description: Option<String>,
    pub image: Option<String>,
    pub site_name: Option<String>,
    pub og_type: Option<String>,
    pub url: Option<String>,
}

impl OpenGraph {
    /// Collect OpenGraph properties from a parsed document.
    ///
    /// The first non-empty occurrence of each property wins. Some sites put the
    /// property in `name` instead of `property`; both are accepted.
    pub fn from_document(document: &Html) -> Self {
        let selector = Selector::parse(r#"meta[property^="og:"], meta[name^="og:"]"#).expect("invalid selector");
        let mut og = Self::default();

        for element in document.select(&selector) {
            let meta = element.value();
            let Some(property) = meta.attr("property").or_else(|| meta.attr("name")) else {
                continue;
            };
            let Some(content) = meta.attr("content").map(str::trim).filter(|c| !c.is_empty()) else {
                continue;
            };

            let slot = match property.trim().to_ascii_lowercase().as_str() {
                "og:title" => &mut og.title,
                "og:description" => &mut og.description,
                "og:image" | "og:image:url" => &mut og.image,
                "og:site_name" => &mut og.site_name,
                "og:type" => &mut og.og_type,
                "og:url" => &mut og.url,
                _ => continue,
            };
            if slot.is_none() {
                *slot = Some(content.to_string());
            }
        }

        og
    }
}
