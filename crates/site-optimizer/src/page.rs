//! Page-load passes over parsed HTML: element selection, lazy media, and
//! deferred scripts.
//!
//! Uses the `scraper` crate for CSS selector matching. Nothing here mutates
//! the document; each pass returns a plan describing the elements it would
//! touch.

use std::collections::BTreeMap;
use std::path::Path;

use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};

use crate::types::{MediaTag, OptimizerError, OptimizerResult};

/// Attribute marking an element for lazy loading.
pub const LAZY_ATTR: &str = "data-lazy";
/// Attribute marking a script for deferred loading.
pub const DEFER_ATTR: &str = "data-defer";
/// Attribute carrying the real source of a lazy or deferred element.
pub const SRC_ATTR: &str = "data-src";

/// Parse an HTML document.
pub fn parse_document(html: &str) -> Html {
    Html::parse_document(html)
}

fn parse_selector(selector: &str) -> OptimizerResult<Selector> {
    Selector::parse(selector)
        .map_err(|e| OptimizerError::InvalidSelector(format!("{selector}: {e}")))
}

/// First element matching `selector`, in document order.
pub fn select_first<'a>(doc: &'a Html, selector: &str) -> OptimizerResult<Option<ElementRef<'a>>> {
    let sel = parse_selector(selector)?;
    Ok(doc.select(&sel).next())
}

/// Every element matching `selector`, in document order.
pub fn select_all<'a>(doc: &'a Html, selector: &str) -> OptimizerResult<Vec<ElementRef<'a>>> {
    let sel = parse_selector(selector)?;
    Ok(doc.select(&sel).collect())
}

/// A media element waiting for its real source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LazyMedia {
    /// Position among the lazy elements of the document.
    pub index: usize,
    pub tag: MediaTag,
    pub src: String,
    pub resolved: bool,
}

/// Collect `[data-lazy]` images and iframes that carry a `data-src`.
pub fn lazy_media(doc: &Html) -> Vec<LazyMedia> {
    let Ok(sel) = parse_selector(&format!("[{LAZY_ATTR}]")) else {
        return Vec::new();
    };

    doc.select(&sel)
        .filter_map(|el| {
            let tag = MediaTag::from_name(el.value().name())?;
            let src = el.value().attr(SRC_ATTR)?.trim();
            if src.is_empty() {
                return None;
            }
            Some((tag, src.to_string()))
        })
        .enumerate()
        .map(|(index, (tag, src))| LazyMedia {
            index,
            tag,
            src,
            resolved: false,
        })
        .collect()
}

/// Observer settings used when lazy media is resolved on intersection.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ObserverOptions {
    /// Visible fraction at which an element counts as intersecting.
    pub threshold: f32,
}

impl Default for ObserverOptions {
    fn default() -> Self {
        Self { threshold: 0.1 }
    }
}

/// One intersection notification for an observed target.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IntersectionEntry {
    /// [`LazyMedia::index`] of the target.
    pub target: usize,
    pub ratio: f32,
}

/// Resolves lazy media once each element becomes visible.
///
/// A target is unobserved as soon as it resolves, so it resolves at most
/// once no matter how many notifications follow.
#[derive(Debug, Clone)]
pub struct LazyLoader {
    options: ObserverOptions,
    observed: BTreeMap<usize, LazyMedia>,
}

impl LazyLoader {
    pub fn new(targets: Vec<LazyMedia>) -> Self {
        Self::with_options(targets, ObserverOptions::default())
    }

    pub fn with_options(targets: Vec<LazyMedia>, options: ObserverOptions) -> Self {
        let observed = targets
            .into_iter()
            .filter(|t| !t.resolved)
            .map(|t| (t.index, t))
            .collect();
        Self { options, observed }
    }

    pub fn options(&self) -> ObserverOptions {
        self.options
    }

    /// Number of targets still waiting.
    pub fn pending(&self) -> usize {
        self.observed.len()
    }

    /// Resolve every target whose entry reaches the threshold.
    pub fn handle(&mut self, entries: &[IntersectionEntry]) -> Vec<LazyMedia> {
        let mut resolved = Vec::new();
        for entry in entries {
            if entry.ratio < self.options.threshold {
                continue;
            }
            if let Some(mut media) = self.observed.remove(&entry.target) {
                media.resolved = true;
                resolved.push(media);
            }
        }
        resolved
    }

    /// Resolve everything still pending. Used when no observer is available.
    pub fn resolve_all(&mut self) -> Vec<LazyMedia> {
        std::mem::take(&mut self.observed)
            .into_values()
            .map(|mut media| {
                media.resolved = true;
                media
            })
            .collect()
    }
}

/// A script to be replaced by a `defer` equivalent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeferredScript {
    pub index: usize,
    pub src: String,
}

impl DeferredScript {
    /// Markup of the replacement element.
    pub fn to_html(&self) -> String {
        format!(r#"<script src="{}" defer></script>"#, escape_attr(&self.src))
    }
}

/// Collect `script[data-defer]` elements that carry a `data-src`.
pub fn deferred_scripts(doc: &Html) -> Vec<DeferredScript> {
    let Ok(sel) = parse_selector(&format!("script[{DEFER_ATTR}]")) else {
        return Vec::new();
    };

    doc.select(&sel)
        .filter_map(|el| {
            let src = el.value().attr(SRC_ATTR)?.trim();
            (!src.is_empty()).then(|| src.to_string())
        })
        .enumerate()
        .map(|(index, src)| DeferredScript { index, src })
        .collect()
}

fn escape_attr(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
    out
}

/// Everything the page-load passes found in one document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PagePlan {
    pub lazy_media: Vec<LazyMedia>,
    pub deferred_scripts: Vec<DeferredScript>,
}

impl PagePlan {
    pub fn from_document(doc: &Html) -> Self {
        Self {
            lazy_media: lazy_media(doc),
            deferred_scripts: deferred_scripts(doc),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.lazy_media.is_empty() && self.deferred_scripts.is_empty()
    }

    /// A loader observing this plan's lazy media.
    pub fn loader(&self) -> LazyLoader {
        LazyLoader::new(self.lazy_media.clone())
    }
}

/// Run the page-load passes over `html`.
pub fn init(html: &str) -> PagePlan {
    let doc = parse_document(html);
    let plan = PagePlan::from_document(&doc);
    tracing::info!(
        "site optimizer initialized: {} lazy media, {} deferred scripts",
        plan.lazy_media.len(),
        plan.deferred_scripts.len()
    );
    plan
}

/// Read an HTML file and run the page-load passes over it.
pub fn init_file(path: &Path) -> OptimizerResult<PagePlan> {
    let html = std::fs::read_to_string(path)?;
    Ok(init(&html))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const PAGE: &str = r#"<!doctype html>
<html><head>
  <script data-defer data-src="/js/analytics.js"></script>
  <script data-defer></script>
  <script src="/js/app.js"></script>
</head><body>
  <h1 class="title">Hello</h1>
  <p class="lead">First</p>
  <p>Second</p>
  <img data-lazy data-src="/img/hero.jpg" src="placeholder.gif">
  <iframe data-lazy data-src="https://video.example.com/embed/1"></iframe>
  <img data-lazy>
  <div data-lazy data-src="/ignored.png"></div>
  <img src="/eager.png">
  <script data-defer data-src="/js/chat.js?a=1&b=2"></script>
</body></html>"#;

    #[test]
    fn test_select_first_and_all() {
        let doc = parse_document(PAGE);

        let title = select_first(&doc, "h1.title").unwrap().unwrap();
        assert_eq!(title.text().collect::<String>(), "Hello");

        let paras = select_all(&doc, "p").unwrap();
        assert_eq!(paras.len(), 2);
        assert_eq!(paras[0].value().attr("class"), Some("lead"));

        assert!(select_first(&doc, "table").unwrap().is_none());
    }

    #[test]
    fn test_invalid_selector() {
        let doc = parse_document(PAGE);
        let err = select_all(&doc, "p[[").unwrap_err();
        assert!(matches!(err, OptimizerError::InvalidSelector(_)));
    }

    #[test]
    fn test_lazy_media_collects_img_and_iframe_only() {
        let doc = parse_document(PAGE);
        let media = lazy_media(&doc);

        assert_eq!(media.len(), 2);
        assert_eq!(media[0].tag, MediaTag::Img);
        assert_eq!(media[0].src, "/img/hero.jpg");
        assert_eq!(media[1].tag, MediaTag::Iframe);
        assert_eq!(media[1].index, 1);
        assert!(media.iter().all(|m| !m.resolved));
    }

    #[test]
    fn test_loader_resolves_once() {
        let doc = parse_document(PAGE);
        let mut loader = LazyLoader::new(lazy_media(&doc));
        assert_eq!(loader.pending(), 2);

        // Below threshold: nothing happens.
        let none = loader.handle(&[IntersectionEntry { target: 0, ratio: 0.05 }]);
        assert!(none.is_empty());
        assert_eq!(loader.pending(), 2);

        let first = loader.handle(&[
            IntersectionEntry { target: 0, ratio: 0.5 },
            IntersectionEntry { target: 0, ratio: 1.0 },
        ]);
        assert_eq!(first.len(), 1);
        assert!(first[0].resolved);
        assert_eq!(first[0].src, "/img/hero.jpg");
        assert_eq!(loader.pending(), 1);

        let again = loader.handle(&[IntersectionEntry { target: 0, ratio: 1.0 }]);
        assert!(again.is_empty());
    }

    #[test]
    fn test_loader_fallback_resolves_rest() {
        let doc = parse_document(PAGE);
        let mut loader = LazyLoader::new(lazy_media(&doc));
        loader.handle(&[IntersectionEntry { target: 1, ratio: 0.2 }]);

        let rest = loader.resolve_all();
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].tag, MediaTag::Img);
        assert_eq!(loader.pending(), 0);
        assert!(loader.resolve_all().is_empty());
    }

    #[test]
    fn test_deferred_scripts() {
        let doc = parse_document(PAGE);
        let scripts = deferred_scripts(&doc);

        assert_eq!(scripts.len(), 2);
        assert_eq!(scripts[0].src, "/js/analytics.js");
        assert_eq!(
            scripts[0].to_html(),
            r#"<script src="/js/analytics.js" defer></script>"#
        );
        assert_eq!(
            scripts[1].to_html(),
            r#"<script src="/js/chat.js?a=1&amp;b=2" defer></script>"#
        );
    }

    #[test]
    fn test_custom_threshold() {
        let doc = parse_document(PAGE);
        let mut loader =
            LazyLoader::with_options(lazy_media(&doc), ObserverOptions { threshold: 0.5 });
        assert_eq!(loader.options().threshold, 0.5);

        assert!(loader
            .handle(&[IntersectionEntry { target: 0, ratio: 0.3 }])
            .is_empty());
        assert_eq!(
            loader
                .handle(&[IntersectionEntry { target: 0, ratio: 0.5 }])
                .len(),
            1
        );
        assert_eq!(ObserverOptions::default().threshold, 0.1);
    }

    #[test]
    fn test_init_file_reads_document() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(PAGE.as_bytes()).unwrap();

        let plan = init_file(file.path()).unwrap();
        assert_eq!(plan, init(PAGE));
    }

    #[test]
    fn test_init_file_missing_is_io_error() {
        let err = init_file(Path::new("/definitely/not/here.html")).unwrap_err();
        assert!(matches!(err, OptimizerError::Io(_)));
    }

    #[test]
    fn test_init_builds_plan() {
        let plan = init(PAGE);
        assert_eq!(plan.lazy_media.len(), 2);
        assert_eq!(plan.deferred_scripts.len(), 2);
        assert!(!plan.is_empty());
        assert_eq!(plan.loader().pending(), 2);

        assert!(init("<p>plain</p>").is_empty());
    }
}
