//! Narrow read-only view over parsed catalog markup.
//!
//! Stage code only needs "find by CSS selector, read text or attribute, render
//! a fragment as markdown". Keeping to that surface keeps the HTML parser an
//! implementation detail of this module.
//!
//! [`Document`] is not `Send`; parse and extract inside a synchronous function
//! and never hold one across an `.await`.

use scraper::{ElementRef, Html, Selector};
use tracing::debug;

/// A parsed HTML document.
pub struct Document {
    html: Html,
}

impl Document {
    /// Parses raw markup. Parsing is lenient and never fails.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        Self {
            html: Html::parse_document(raw),
        }
    }

    /// First element matching `css`, in document order.
    #[must_use]
    pub fn find(&self, css: &str) -> Option<Node<'_>> {
        let selector = selector(css)?;
        self.html.select(&selector).next().map(Node::from)
    }

    /// All elements matching `css`, in document order.
    #[must_use]
    pub fn find_all(&self, css: &str) -> Vec<Node<'_>> {
        let Some(selector) = selector(css) else {
            return Vec::new();
        };
        self.html.select(&selector).map(Node::from).collect()
    }
}

/// An element inside a [`Document`].
#[derive(Debug, Clone, Copy)]
pub struct Node<'a> {
    element: ElementRef<'a>,
}

impl<'a> From<ElementRef<'a>> for Node<'a> {
    fn from(element: ElementRef<'a>) -> Self {
        Self { element }
    }
}

impl<'a> Node<'a> {
    /// First descendant matching `css`.
    #[must_use]
    pub fn find(&self, css: &str) -> Option<Node<'a>> {
        let selector = selector(css)?;
        self.element.select(&selector).next().map(Node::from)
    }

    /// All descendants matching `css`.
    #[must_use]
    pub fn find_all(&self, css: &str) -> Vec<Node<'a>> {
        let Some(selector) = selector(css) else {
            return Vec::new();
        };
        self.element.select(&selector).map(Node::from).collect()
    }

    /// Attribute value, if present.
    #[must_use]
    pub fn attr(&self, name: &str) -> Option<&'a str> {
        self.element.value().attr(name)
    }

    /// Concatenated text of this element and its descendants.
    #[must_use]
    pub fn text(&self) -> String {
        self.element.text().collect()
    }

    /// Serialized markup of this element, tags included.
    #[must_use]
    pub fn outer_html(&self) -> String {
        self.element.html()
    }

    /// Markdown rendering of this element.
    #[must_use]
    pub fn to_markdown(&self) -> String {
        html2md::parse_html(&self.outer_html())
    }
}

fn selector(css: &str) -> Option<Selector> {
    match Selector::parse(css) {
        Ok(selector) => Some(selector),
        Err(error) => {
            debug!(css, error = %error, "invalid selector");
            None
        }
    }
}
