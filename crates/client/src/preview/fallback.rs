//! Preview fields for pages without OpenGraph metadata.
//!
//! Each function looks at the parsed document alone and never fails; a page that
//! offers nothing usable simply yields `None`.

use scraper::{ElementRef, Html, Node, Selector};

use mediarepo_core::ImageSelection;

/// Minimum `width` and `height` for an `<img>` to represent a page.
pub const MIN_IMAGE_DIMENSION: u64 = 10;

/// Elements whose text never belongs in a page description.
const SKIPPED_ELEMENTS: &[&str] = &["header", "nav", "aside", "footer", "noscript", "script", "style"];

/// First non-empty text of `<title>`, then `<h1>`, `<h2>`, `<h3>`.
pub fn title(document: &Html) -> Option<String> {
    ["title", "h1", "h2", "h3"].into_iter().find_map(|tag| {
        let selector = Selector::parse(tag).expect("invalid selector");
        document.select(&selector).find_map(|element| {
            let text = element.text().collect::<Vec<_>>().join(" ");
            let text = text.split_whitespace().collect::<Vec<_>>().join(" ");
            (!text.is_empty()).then_some(text)
        })
    })
}

/// The `<meta name="description">` content, else the visible body text.
pub fn description(document: &Html) -> Option<String> {
    meta_description(document).or_else(|| body_text(document))
}

fn meta_description(document: &Html) -> Option<String> {
    let selector = Selector::parse("meta[name]").expect("invalid selector");
    document
        .select(&selector)
        .filter(|meta| meta.value().attr("name").is_some_and(|n| n.trim().eq_ignore_ascii_case("description")))
        .find_map(|meta| meta.value().attr("content").map(str::trim).filter(|c| !c.is_empty()))
        .map(str::to_string)
}

/// Body text with page chrome and scripts removed.
fn body_text(document: &Html) -> Option<String> {
    let selector = Selector::parse("body").expect("invalid selector");
    let body = document.select(&selector).next()?;

    let mut text = String::new();
    collect_text(body, &mut text);
    let text = text.trim();
    (!text.is_empty()).then(|| text.to_string())
}

fn collect_text(element: ElementRef<'_>, out: &mut String) {
    for child in element.children() {
        match child.value() {
            Node::Text(text) => out.push_str(text),
            Node::Element(el) if SKIPPED_ELEMENTS.contains(&el.name()) => {}
            Node::Element(_) => {
                if let Some(child) = ElementRef::wrap(child) {
                    collect_text(child, out);
                    out.push(' ');
                }
            }
            _ => {}
        }
    }
}

/// The `src` of the `<img>` picked by `selection` among those at least
/// [`MIN_IMAGE_DIMENSION`] on both sides.
///
/// Images without numeric `width` and `height` attributes are skipped. Ties keep
/// the earlier image.
pub fn image(document: &Html, selection: ImageSelection) -> Option<String> {
    let selector = Selector::parse("img[src]").expect("invalid selector");
    let mut best: Option<(u64, &str)> = None;

    for img in document.select(&selector) {
        let img = img.value();
        let Some(src) = img.attr("src").map(str::trim).filter(|s| !s.is_empty()) else {
            continue;
        };
        let width = img.attr("width").map_or(0, parse_dimension);
        let height = img.attr("height").map_or(0, parse_dimension);
        if width < MIN_IMAGE_DIMENSION || height < MIN_IMAGE_DIMENSION {
            continue;
        }

        let area = width.saturating_mul(height);
        let better = match best {
            None => true,
            Some((best_area, _)) => match selection {
                ImageSelection::SmallestArea => area < best_area,
                ImageSelection::LargestArea => area > best_area,
            },
        };
        if better {
            best = Some((area, src));
        }
    }

    best.map(|(_, src)| src.to_string())
}

fn parse_dimension(value: &str) -> u64 {
    value.trim().parse().unwrap_or(0)
}
