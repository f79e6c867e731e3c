//! Minimal built-in converter.
//!
//! Enough to run the pipeline end to end: escapes the document text,
//! wraps it in a fixed HTML shell, and stamps the version label. A real
//! deployment swaps in a full converter behind the same trait.

use crate::error::Result;
use crate::{Converter, RenderSession};
use std::collections::BTreeSet;
use tracing::debug;

/// Escape-and-wrap converter.
#[derive(Debug, Default, Clone)]
pub struct BasicConverter;

struct BasicSession {
    version_label: Option<String>,
    /// Referenceable anchors, one per index line's first token.
    references: BTreeSet<String>,
}

impl Converter for BasicConverter {
    fn session(&self, index_text: &str, version_label: Option<&str>) -> Result<Box<dyn RenderSession>> {
        let references = collect_references(index_text);
        debug!(count = references.len(), "built cross-reference index");
        Ok(Box::new(BasicSession {
            version_label: version_label.map(str::to_string),
            references,
        }))
    }
}

impl RenderSession for BasicSession {
    fn add_references(&mut self, name: &str, text: &str) -> Result<()> {
        let extra = collect_references(text);
        debug!(document = name, count = extra.len(), "merged extra references");
        self.references.extend(extra);
        Ok(())
    }

    fn render(&mut self, name: &str, text: &str) -> Result<Vec<u8>> {
        let mut html = String::with_capacity(text.len() + 256);
        html.push_str("<!DOCTYPE html>\n<html><head><title>");
        escape_into(name, &mut html);
        html.push_str("</title></head>\n<body>");
        if let Some(label) = &self.version_label {
            html.push_str("<p class=\"version\">");
            escape_into(label, &mut html);
            html.push_str("</p>\n");
        }
        html.push_str("<pre>");
        escape_into(text, &mut html);
        html.push_str("</pre></body></html>\n");
        Ok(html.into_bytes())
    }
}

/// First whitespace-separated token of every non-empty line.
fn collect_references(index_text: &str) -> BTreeSet<String> {
    index_text
        .lines()
        .filter_map(|line| line.split_whitespace().next())
        .map(str::to_string)
        .collect()
}

fn escape_into(text: &str, out: &mut String) {
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(ch),
        }
    }
}
