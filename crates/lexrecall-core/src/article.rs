//! Exact lookup by structured section reference (`Điều 69`, `Article 12`).
//!
//! This strategy is exact-or-empty: it never falls back to fuzzy ranking,
//! and `Điều 6` never matches a passage labelled `Điều 69`.

use std::sync::LazyLock;

use regex::Regex;

use crate::models::{Document, Hit, Retrieved, Strategy};

static REFERENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:điều|dieu|article|art\.)\s*\.?\s*(\d+)").expect("valid article regex")
});

/// Find the first section reference in `text` and return its number.
pub fn detect_reference(text: &str) -> Option<u32> {
    REFERENCE
        .captures(text)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// The document's article number, or one parsed from its section label.
pub fn article_number_of(doc: &Document) -> Option<u32> {
    doc.article_number.or_else(|| detect_reference(&doc.section))
}

/// True if `label` references article `number` exactly.
fn label_mentions(label: &str, number: u32) -> bool {
    REFERENCE
        .captures_iter(label)
        .filter_map(|caps| caps.get(1))
        .any(|m| m.as_str().parse::<u32>().ok() == Some(number))
}

/// Resolves section references against an ordered corpus.
#[derive(Debug, Default, Clone, Copy)]
pub struct ArticleLocator;

impl ArticleLocator {
    /// Look up the article referenced by `query`.
    ///
    /// `docs` yields `(document, resolved_article_number)` in corpus order.
    /// Returns [`Retrieved::NoMatch`] when the query carries no reference
    /// or nothing matches.
    pub fn locate<'a, I>(&self, query: &str, docs: I, k: usize) -> Retrieved
    where
        I: IntoIterator<Item = (&'a Document, Option<u32>)> + Clone,
    {
        let Some(number) = detect_reference(query) else {
            return Retrieved::NoMatch;
        };
        if k == 0 {
            return Retrieved::NoMatch;
        }

        if let Some((doc, _)) = docs
            .clone()
            .into_iter()
            .find(|(_, article)| *article == Some(number))
        {
            return Retrieved::from_hits(Strategy::ArticleExact, vec![Hit::from_document(doc, 1.0)]);
        }

        let hits: Vec<Hit> = docs
            .into_iter()
            .filter(|(doc, _)| label_mentions(&format!("{} {}", doc.section, doc.title), number))
            .take(k)
            .map(|(doc, _)| Hit::from_document(doc, 1.0))
            .collect();
        Retrieved::from_hits(Strategy::ArticleSubstring, hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(id: &str, section: &str, article: Option<u32>) -> Document {
        Document {
            id: id.to_string(),
            title: "Luật Đất đai 2024".to_string(),
            section: section.to_string(),
            article_number: article,
            text: format!("nội dung {}", id),
            url: None,
        }
    }

    fn run(query: &str, docs: &[Document]) -> Retrieved {
        let view: Vec<(&Document, Option<u32>)> =
            docs.iter().map(|d| (d, article_number_of(d))).collect();
        ArticleLocator.locate(query, view, 5)
    }

    #[test]
    fn test_detect_reference_variants() {
        assert_eq!(detect_reference("Điều 69"), Some(69));
        assert_eq!(detect_reference("nội dung điều 12 là gì"), Some(12));
        assert_eq!(detect_reference("Dieu.7"), Some(7));
        assert_eq!(detect_reference("see Article 3 of the law"), Some(3));
        assert_eq!(detect_reference("Điều69"), Some(69));
        assert_eq!(detect_reference("quyền sử dụng đất"), None);
        assert_eq!(detect_reference("Điều khoản"), None);
    }

    #[test]
    fn test_exact_match_returns_single_document() {
        let docs = vec![
            doc("a", "Điều 68. Thu hồi đất", None),
            doc("b", "Điều 69. Bồi thường", None),
            doc("c", "Phụ lục", Some(69)),
        ];
        let r = run("Điều 69 nói gì", &docs);
        assert_eq!(r.strategy(), Some(Strategy::ArticleExact));
        assert_eq!(r.hits().len(), 1);
        assert_eq!(r.hits()[0].doc_id, "b");
        assert_eq!(r.hits()[0].score, 1.0);
    }

    #[test]
    fn test_substring_match_in_title() {
        let mut d = doc("t", "Chương II", None);
        d.title = "Hướng dẫn Điều 5 Luật Đất đai".to_string();
        let r = run("điều 5", &[d]);
        assert_eq!(r.strategy(), Some(Strategy::ArticleSubstring));
        assert_eq!(r.hits()[0].doc_id, "t");
    }

    #[test]
    fn test_prefix_number_never_matches() {
        let docs = vec![doc("a", "Điều 69", None), doc("b", "Điều 690", None)];
        assert!(run("Điều 6", &docs).is_empty());
    }

    #[test]
    fn test_no_reference_is_empty() {
        let docs = vec![doc("a", "Điều 1", None)];
        assert!(run("bồi thường đất", &docs).is_empty());
    }

    #[test]
    fn test_missing_article_is_empty() {
        let docs = vec![doc("a", "Điều 1", None), doc("b", "Điều 2", None)];
        assert!(run("Điều 69", &docs).is_empty());
    }
}
