//! Raw document structure extraction.
//!
//! Turns downloaded bytes into a [`Document`] of clean paragraphs joined by
//! blank lines. HTML keeps headings and narrative blocks (paragraphs, list
//! items, preformatted text, quotes) in document order and drops navigation
//! chrome, scripts and styles. Plain text and markdown are split on blank
//! lines. PDFs go through `pdf-extract` first.

use scraper::{ElementRef, Html, Selector};
use thiserror::Error;

use crate::models::{DocType, Document};

/// Elements whose text is kept from HTML pages.
const HTML_BLOCKS: &[&str] = &[
    "h1",
    "h2",
    "h3",
    "h4",
    "h5",
    "h6",
    "p",
    "li",
    "pre",
    "blockquote",
];

#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("no text could be extracted")]
    Empty,
    #[error("PDF extraction failed: {0}")]
    Pdf(String),
    #[error("HTML selector error: {0}")]
    Selector(String),
}

/// Decide the document type from the response content-type, falling back
/// to the URL suffix, then to plain text.
pub fn detect_doc_type(url: &str, content_type: Option<&str>) -> DocType {
    if let Some(ct) = content_type.map(str::to_ascii_lowercase) {
        if ct.contains("html") {
            return DocType::Html;
        } else if ct.contains("text") {
            return DocType::Text;
        } else if ct.contains("pdf") {
            return DocType::Pdf;
        }
    }

    let url = url.to_ascii_lowercase();
    if url.ends_with(".html") || url.ends_with(".htm") {
        DocType::Html
    } else if url.ends_with(".md") {
        DocType::Markdown
    } else if url.ends_with(".pdf") {
        DocType::Pdf
    } else {
        DocType::Text
    }
}

pub fn process(bytes: &[u8], url: &str, content_type: Option<&str>) -> Result<Document, ProcessError> {
    let doc_type = detect_doc_type(url, content_type);

    let paragraphs = match doc_type {
        DocType::Html => html_blocks(&String::from_utf8_lossy(bytes))?,
        DocType::Text | DocType::Markdown => paragraphs(&String::from_utf8_lossy(bytes)),
        DocType::Pdf => {
            let text = pdf_extract::extract_text_from_mem(bytes)
                .map_err(|e| ProcessError::Pdf(e.to_string()))?;
            paragraphs(&text)
        }
    };

    let content = paragraphs.join("\n\n");
    if content.trim().is_empty() {
        return Err(ProcessError::Empty);
    }

    Ok(Document {
        url: url.to_string(),
        doc_type,
        content,
    })
}

/// Split text on blank (or whitespace-only) lines into trimmed paragraphs.
fn paragraphs(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut current: Vec<&str> = Vec::new();

    for line in text.lines() {
        if line.trim().is_empty() {
            if !current.is_empty() {
                out.push(current.join("\n").trim().to_string());
                current.clear();
            }
        } else {
            current.push(line);
        }
    }
    if !current.is_empty() {
        out.push(current.join("\n").trim().to_string());
    }

    out.retain(|p| !p.is_empty());
    out
}

fn html_blocks(html: &str) -> Result<Vec<String>, ProcessError> {
    let document = Html::parse_document(html);
    let selector = Selector::parse(&HTML_BLOCKS.join(", "))
        .map_err(|e| ProcessError::Selector(e.to_string()))?;

    let mut out = Vec::new();
    for element in document.select(&selector) {
        // Nested blocks (a <p> inside an <li>) are covered by the outer one.
        if has_block_ancestor(&element) {
            continue;
        }
        let text = if element.value().name() == "pre" {
            element.text().collect::<String>().trim().to_string()
        } else {
            element
                .text()
                .flat_map(str::split_whitespace)
                .collect::<Vec<_>>()
                .join(" ")
        };
        if !text.is_empty() {
            out.push(text);
        }
    }
    Ok(out)
}

fn has_block_ancestor(element: &ElementRef<'_>) -> bool {
    element.ancestors().any(|node| {
        node.value()
            .as_element()
            .is_some_and(|e| HTML_BLOCKS.contains(&e.name()))
    })
}
