//! Markdown outline of a standards document
//!
//! Uses pulldown-cmark to recover the document title, the YAML front matter
//! and the heading hierarchy, so report entries can be grouped by category
//! and located by section.

use pulldown_cmark::{Event, MetadataBlockKind, Options, Parser as MdParser, Tag, TagEnd};

/// Heading found in a document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Heading {
    /// Heading level (1-6)
    pub level: u8,
    /// Heading text
    pub title: String,
    /// 1-based line of the heading
    pub line: usize,
}

/// Title, metadata and headings of a document
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DocumentOutline {
    /// Document title (first H1)
    pub title: Option<String>,
    /// Front matter metadata (if any)
    pub metadata: Option<serde_yaml::Value>,
    /// Headings in document order
    pub headings: Vec<Heading>,
}

impl DocumentOutline {
    /// Parse the outline of `content`
    #[must_use]
    pub fn parse(content: &str) -> Self {
        let line_starts: Vec<usize> = std::iter::once(0)
            .chain(content.match_indices('\n').map(|(i, _)| i + 1))
            .collect();
        let line_of = |offset: usize| match line_starts.binary_search(&offset) {
            Ok(idx) => idx + 1,
            Err(idx) => idx,
        };

        let parser = MdParser::new_ext(content, Options::ENABLE_YAML_STYLE_METADATA_BLOCKS);

        let mut outline = DocumentOutline::default();
        let mut current_heading: Option<Heading> = None;
        let mut metadata_source: Option<String> = None;

        for (event, range) in parser.into_offset_iter() {
            match event {
                Event::Start(Tag::Heading { level, .. }) => {
                    current_heading = Some(Heading {
                        level: level as u8,
                        title: String::new(),
                        line: line_of(range.start),
                    });
                }
                Event::End(TagEnd::Heading(_)) => {
                    if let Some(mut heading) = current_heading.take() {
                        heading.title = heading.title.trim().to_string();
                        outline.headings.push(heading);
                    }
                }
                Event::Start(Tag::MetadataBlock(MetadataBlockKind::YamlStyle)) => {
                    metadata_source = Some(String::new());
                }
                Event::End(TagEnd::MetadataBlock(_)) => {
                    if let Some(source) = metadata_source.take() {
                        outline.metadata = serde_yaml::from_str(&source).ok();
                    }
                }
                Event::Text(text) | Event::Code(text) => {
                    if let Some(ref mut heading) = current_heading {
                        heading.title.push_str(&text);
                    } else if let Some(ref mut source) = metadata_source {
                        source.push_str(&text);
                    }
                }
                _ => {}
            }
        }

        outline.title = outline
            .headings
            .iter()
            .find(|h| h.level == 1)
            .map(|h| h.title.clone());

        outline
    }

    /// `category` value from the front matter
    #[must_use]
    pub fn category(&self) -> Option<&str> {
        self.metadata
            .as_ref()
            .and_then(|meta| meta.get("category"))
            .and_then(serde_yaml::Value::as_str)
    }

    /// Display label: front matter category, else title
    #[must_use]
    pub fn label(&self) -> Option<&str> {
        self.category().or(self.title.as_deref())
    }

    /// Title of the nearest heading at or above `line`
    #[must_use]
    pub fn section_at(&self, line: usize) -> Option<&str> {
        self.headings
            .iter()
            .take_while(|h| h.line <= line)
            .last()
            .map(|h| h.title.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outline_basic() {
        let content = r#"# Testing Standards

Intro.

## Unit tests

More content.

### `vitest` config
"#;
        let outline = DocumentOutline::parse(content);
        assert_eq!(outline.title.as_deref(), Some("Testing Standards"));
        assert_eq!(outline.headings.len(), 3);
        assert_eq!(outline.headings[1].title, "Unit tests");
        assert_eq!(outline.headings[1].line, 5);
        assert_eq!(outline.headings[2].title, "vitest config");
        assert_eq!(outline.label(), Some("Testing Standards"));
    }

    #[test]
    fn outline_with_frontmatter() {
        let content = r#"---
category: Architecture
owner: platform
---

# Layering rules

Content.
"#;
        let outline = DocumentOutline::parse(content);
        assert!(outline.metadata.is_some());
        assert_eq!(outline.category(), Some("Architecture"));
        assert_eq!(outline.label(), Some("Architecture"));
        assert_eq!(outline.title.as_deref(), Some("Layering rules"));
        assert_eq!(outline.headings[0].line, 6);
    }

    #[test]
    fn section_lookup() {
        let content = "# Top\n\ntext\n\n## Lint\n\nline 7\n\n## Build\n\nline 11\n";
        let outline = DocumentOutline::parse(content);
        assert_eq!(outline.section_at(1), Some("Top"));
        assert_eq!(outline.section_at(7), Some("Lint"));
        assert_eq!(outline.section_at(11), Some("Build"));
    }

    #[test]
    fn outline_empty() {
        let outline = DocumentOutline::parse("");
        assert!(outline.title.is_none());
        assert!(outline.label().is_none());
        assert!(outline.section_at(1).is_none());
    }
}
