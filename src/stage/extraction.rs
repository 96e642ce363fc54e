//! Detail pages: one [`BookRecord`] per page.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

use super::{Stage, StageError, StageKind};
use crate::catalog::BookRecord;
use crate::document::Document;
use crate::fetch::ResilientFetcher;
use crate::site::SiteUrls;

/// Number of `div.body` blocks a page must have for the description to be read.
const DESCRIPTION_LAYOUT_BLOCKS: usize = 6;

/// Index of the description among those blocks.
const DESCRIPTION_BLOCK_INDEX: usize = 3;

/// Parses a detail page into a book record.
///
/// Returns `None` when the content region or the title is missing, since the
/// title is the record's identity.
#[must_use]
pub fn parse_book_record(raw: &str) -> Option<BookRecord> {
    let doc = Document::parse(raw);
    let content = doc.find("section.content")?;

    let title = content
        .find("h3.product-title")
        .map(|node| node.text().trim().to_string())
        .filter(|title| !title.is_empty())?;

    let details = content
        .find("div.details ul.list-unstyled")
        .map(|node| node.text())
        .unwrap_or_default();

    let preview_image = content
        .find("div.preview-pic img[src]")
        .and_then(|img| img.attr("src"))
        .map(str::to_string);

    let blocks = content.find_all("div.body");
    let description = if blocks.len() == DESCRIPTION_LAYOUT_BLOCKS {
        blocks[DESCRIPTION_BLOCK_INDEX].to_markdown()
    } else {
        String::new()
    };

    let tokens = content
        .find_all("span.tn-download")
        .iter()
        .filter_map(|span| span.attr("tn-url"))
        .filter(|token| !token.is_empty())
        .map(str::to_string)
        .collect();

    Some(BookRecord {
        title,
        details,
        description,
        preview_image,
        tokens,
    })
}

/// Extracts book records from detail pages.
#[derive(Debug, Clone)]
pub struct Extraction {
    fetcher: ResilientFetcher,
    site: SiteUrls,
}

impl Extraction {
    #[must_use]
    pub fn new(fetcher: ResilientFetcher, site: SiteUrls) -> Self {
        Self { fetcher, site }
    }
}

#[async_trait]
impl Stage for Extraction {
    type Item = String;
    type Output = BookRecord;

    fn kind(&self) -> StageKind {
        StageKind::Extraction
    }

    #[instrument(skip(self, cancel))]
    async fn process_item(
        &self,
        path: &String,
        cancel: &CancellationToken,
    ) -> Result<Option<BookRecord>, StageError> {
        let body = self.fetcher.fetch(&self.site.detail(path), cancel).await?;
        let record = parse_book_record(&body);
        if record.is_none() {
            debug!("detail page has no title; discarded");
        }
        Ok(record)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn detail_page(title: Option<&str>, body_blocks: usize) -> String {
        let title = title
            .map(|t| format!(r#"<h3 class="product-title">{t}</h3>"#))
            .unwrap_or_default();
        let blocks: String = (0..body_blocks)
            .map(|i| format!(r#"<div class="body"><p>block <em>{i}</em></p></div>"#))
            .collect();
        format!(
            r#"<html><body><section class="content">
                <div class="preview-pic"><img src="/covers/1.jpg"></div>
                {title}
                <div class="details"><ul class="list-unstyled"><li>Pages: 300</li><li>Year: 2019</li></ul></div>
                {blocks}
                <span class="tn-download" tn-url="tok-a"></span>
                <span class="tn-download" tn-url="tok-b"></span>
            </section></body></html>"#
        )
    }

    #[test]
    fn test_parse_full_record() {
        let record = parse_book_record(&detail_page(Some(" Rust in Action "), 6)).unwrap();
        assert_eq!(record.title, "Rust in Action");
        assert!(record.details.contains("Pages: 300"));
        assert!(record.details.contains("Year: 2019"));
        assert_eq!(record.preview_image.as_deref(), Some("/covers/1.jpg"));
        assert_eq!(record.tokens, vec!["tok-a", "tok-b"]);
        assert!(record.description.contains("block"), "got: {}", record.description);
        assert!(record.description.contains('3'), "got: {}", record.description);
    }

    #[test]
    fn test_description_empty_unless_six_blocks() {
        let record = parse_book_record(&detail_page(Some("Go"), 5)).unwrap();
        assert!(record.description.is_empty());
        let record = parse_book_record(&detail_page(Some("Go"), 7)).unwrap();
        assert!(record.description.is_empty());
    }

    #[test]
    fn test_missing_title_discards_record() {
        assert!(parse_book_record(&detail_page(None, 6)).is_none());
        assert!(parse_book_record(&detail_page(Some("   "), 6)).is_none());
    }

    #[test]
    fn test_missing_content_region_discards_record() {
        assert!(parse_book_record("<html><body><h3 class=\"product-title\">x</h3></body></html>").is_none());
    }
}
