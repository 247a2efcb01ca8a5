//! Core types for search results.

use serde::{Deserialize, Serialize};

/// One result from a search provider.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    /// Page title.
    pub title: String,
    /// Page URL.
    pub url: String,
    /// Extracted page text, possibly empty.
    pub content: String,
    /// Short description or snippet, possibly empty.
    pub description: String,
}

impl SearchHit {
    /// Best available text: the content if present, otherwise the description.
    #[must_use]
    pub fn best_text(&self) -> &str {
        if self.content.trim().is_empty() {
            &self.description
        } else {
            &self.content
        }
    }

    /// Render as `title\nurl\ntext`.
    #[must_use]
    pub fn render(&self) -> String {
        format!("{}\n{}\n{}", self.title, self.url, self.best_text())
    }
}

/// Render hits as one text block, separated by blank lines.
#[must_use]
pub fn render_hits(hits: &[SearchHit]) -> String {
    hits.iter()
        .map(SearchHit::render)
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_best_text_falls_back_to_description() {
        let hit = SearchHit {
            title: "T".to_string(),
            url: "https://t.example".to_string(),
            content: "  ".to_string(),
            description: "snippet".to_string(),
        };
        assert_eq!(hit.best_text(), "snippet");
    }

    #[test]
    fn test_render_hits() {
        let hits = vec![
            SearchHit {
                title: "Kyle Wiggers".to_string(),
                url: "https://techcrunch.com/author/kyle-wiggers/".to_string(),
                content: "AI editor".to_string(),
                description: String::new(),
            },
            SearchHit {
                title: "Devin Coldewey".to_string(),
                url: "https://techcrunch.com/author/devin-coldewey/".to_string(),
                content: "Writer".to_string(),
                description: String::new(),
            },
        ];

        assert_eq!(
            render_hits(&hits),
            "Kyle Wiggers\nhttps://techcrunch.com/author/kyle-wiggers/\nAI editor\n\n\
             Devin Coldewey\nhttps://techcrunch.com/author/devin-coldewey/\nWriter"
        );
    }
}
