//! Plain-text extraction per file format.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use anyhow::Context;

use super::splitter::{collapse_whitespace, strip_html_tags};
use crate::error::{VigurError, VigurResult};

/// Extracted text for one page of a document. Unpaginated formats produce a
/// single page with no page number.
#[derive(Debug)]
pub(crate) struct ExtractedPage {
    pub page_number: Option<u32>,
    pub text: String,
}

pub(crate) fn extract_pages(path: &Path, ext: &str) -> VigurResult<Vec<ExtractedPage>> {
    match ext {
        "txt" | "md" | "markdown" => {
            let text = read_to_string(path)?;
            Ok(vec![ExtractedPage {
                page_number: None,
                text,
            }])
        }
        "html" | "htm" => {
            let raw = read_to_string(path)?;
            Ok(vec![ExtractedPage {
                page_number: None,
                text: strip_html_tags(&raw),
            }])
        }
        "pdf" => extract_pdf(path),
        "docx" => {
            let text = extract_docx(path)?;
            Ok(vec![ExtractedPage {
                page_number: None,
                text,
            }])
        }
        other => Err(VigurError::UnsupportedFormat(other.to_string())),
    }
}

fn read_to_string(path: &Path) -> VigurResult<String> {
    std::fs::read_to_string(path).map_err(|e| VigurError::FileRead {
        path: path.to_path_buf(),
        source: e.into(),
    })
}

fn extract_pdf(path: &Path) -> VigurResult<Vec<ExtractedPage>> {
    let read_err = |source: anyhow::Error| VigurError::FileRead {
        path: path.to_path_buf(),
        source,
    };
    let doc = lopdf::Document::load(path)
        .context("failed to parse PDF")
        .map_err(read_err)?;
    let mut pages = Vec::new();
    for (page_number, _) in doc.get_pages() {
        // Unextractable pages (e.g. image-only) are skipped, not fatal.
        let text = match doc.extract_text(&[page_number]) {
            Ok(t) => collapse_whitespace(&t),
            Err(e) => {
                log::warn!(
                    "could not extract text from page {page_number} of {}: {e}",
                    path.display()
                );
                continue;
            }
        };
        if !text.is_empty() {
            pages.push(ExtractedPage {
                page_number: Some(page_number),
                text,
            });
        }
    }
    Ok(pages)
}

fn extract_docx(path: &Path) -> VigurResult<String> {
    let read_err = |source: anyhow::Error| VigurError::FileRead {
        path: path.to_path_buf(),
        source,
    };
    let file = File::open(path).map_err(|e| read_err(e.into()))?;
    let mut archive = zip::ZipArchive::new(file)
        .context("not a valid DOCX archive")
        .map_err(read_err)?;
    let mut entry = archive
        .by_name("word/document.xml")
        .context("DOCX archive has no word/document.xml")
        .map_err(read_err)?;
    let mut xml = String::new();
    entry
        .read_to_string(&mut xml)
        .context("failed to read word/document.xml")
        .map_err(read_err)?;
    // Paragraph ends become newlines before tags are dropped.
    let xml = xml.replace("</w:p>", "</w:p>\n");
    Ok(collapse_whitespace(&strip_xml_tags(&xml)))
}

fn strip_xml_tags(xml: &str) -> String {
    let mut out = String::with_capacity(xml.len());
    let mut in_tag = false;
    for c in xml.chars() {
        match c {
            '<' => in_tag = true,
            '>' => in_tag = false,
            c if !in_tag => out.push(c),
            _ => {}
        }
    }
    out
}
