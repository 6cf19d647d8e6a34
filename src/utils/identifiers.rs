//! Identifier normalization for DOIs, URLs and titles.
//!
//! These produce the fingerprints used for grouping duplicates and the keys
//! used to address citation data. Nothing here is persisted.

use thiserror::Error;

/// Identifier normalization errors
#[derive(Error, Debug, PartialEq)]
pub enum IdentifierError {
    #[error("Invalid DOI format: {0}")]
    InvalidDoi(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
}

const DOI_PREFIXES: &[&str] = &[
    "https://doi.org/",
    "http://doi.org/",
    "https://dx.doi.org/",
    "http://dx.doi.org/",
    "doi.org/",
    "dx.doi.org/",
    "doi:",
];

/// Query parameters that never identify a resource
const TRACKING_PARAMS: &[&str] = &[
    "utm_source",
    "utm_medium",
    "utm_campaign",
    "utm_term",
    "utm_content",
    "fbclid",
    "gclid",
];

/// Normalize a DOI to its bare, lower-cased `10.x/suffix` form.
///
/// Accepts the resolver URL forms (`https://doi.org/`, `dx.doi.org`) and the
/// `doi:` prefix.
pub fn normalize_doi(raw: &str) -> Result<String, IdentifierError> {
    let mut doi = raw.trim().to_lowercase();

    for prefix in DOI_PREFIXES {
        if let Some(rest) = doi.strip_prefix(prefix) {
            doi = rest.trim_start().to_string();
            break;
        }
    }

    let doi = doi
        .replace("%2f", "/")
        .trim_end_matches(['.', ',', ';'])
        .to_string();

    if !doi.starts_with("10.") {
        return Err(IdentifierError::InvalidDoi(raw.to_string()));
    }

    match doi.split_once('/') {
        Some((prefix, suffix))
            if prefix.len() > 3 && !suffix.is_empty() && !doi.contains(char::is_whitespace) =>
        {
            Ok(doi)
        }
        _ => Err(IdentifierError::InvalidDoi(raw.to_string())),
    }
}

/// Normalize a URL for identity comparison.
///
/// The scheme is dropped, the host lower-cased and stripped of `www.`, the
/// fragment and tracking parameters removed, and a trailing slash folded.
pub fn normalize_url(raw: &str) -> Result<String, IdentifierError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(IdentifierError::InvalidUrl("empty URL".to_string()));
    }

    let candidate = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("https://{}", trimmed)
    };

    let parsed =
        url::Url::parse(&candidate).map_err(|e| IdentifierError::InvalidUrl(e.to_string()))?;

    match parsed.scheme() {
        "http" | "https" => {}
        scheme => {
            return Err(IdentifierError::InvalidUrl(format!(
                "invalid scheme: {}",
                scheme
            )))
        }
    }

    let host = parsed
        .host_str()
        .ok_or_else(|| IdentifierError::InvalidUrl(raw.to_string()))?;
    let host = host.strip_prefix("www.").unwrap_or(host);

    let mut normalized = host.to_string();
    if let Some(port) = parsed.port() {
        normalized.push_str(&format!(":{}", port));
    }
    normalized.push_str(parsed.path().trim_end_matches('/'));

    let query: Vec<String> = parsed
        .query_pairs()
        .filter(|(k, _)| !TRACKING_PARAMS.contains(&k.as_ref()))
        .map(|(k, v)| {
            if v.is_empty() {
                k.into_owned()
            } else {
                format!("{}={}", k, v)
            }
        })
        .collect();
    if !query.is_empty() {
        normalized.push('?');
        normalized.push_str(&query.join("&"));
    }

    Ok(normalized)
}

/// Case- and punctuation-folded title tokens, de-duplicated and sorted.
///
/// Two titles that differ only in word order, case or punctuation share a key.
pub fn title_key(title: &str) -> String {
    let folded: String = title
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();

    let mut tokens: Vec<&str> = folded.split_whitespace().collect();
    tokens.sort_unstable();
    tokens.dedup();
    tokens.join(" ")
}

/// Indel similarity of two title keys on a 0-100 scale.
///
/// Twice the longest common subsequence over the combined length, so a
/// substitution costs a deletion plus an insertion. Applied to sorted keys this
/// is the usual token-sort ratio.
pub fn title_similarity(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let total = a.len() + b.len();
    if total == 0 {
        return 100.0;
    }

    // Single-row LCS table
    let mut row = vec![0usize; b.len() + 1];
    for &ca in &a {
        let mut diag = 0;
        for (j, &cb) in b.iter().enumerate() {
            let up = row[j + 1];
            row[j + 1] = if ca == cb { diag + 1 } else { up.max(row[j]) };
            diag = up;
        }
    }
    200.0 * row[b.len()] as f64 / total as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_doi_forms() {
        for raw in [
            "10.1000/XYZ123",
            "https://doi.org/10.1000/xyz123",
            "http://dx.doi.org/10.1000/xyz123",
            "doi:10.1000/xyz123",
            "DOI: 10.1000/xyz123",
            "  10.1000/xyz123. ",
        ] {
            assert_eq!(normalize_doi(raw).unwrap(), "10.1000/xyz123", "input {raw:?}");
        }
    }

    #[test]
    fn test_normalize_doi_rejects_garbage() {
        assert!(normalize_doi("").is_err());
        assert!(normalize_doi("not-a-doi").is_err());
        assert!(normalize_doi("10.1000").is_err());
        assert!(normalize_doi("10.1000/").is_err());
        assert!(normalize_doi("10.1000/has space").is_err());
    }

    #[test]
    fn test_normalize_url_folding() {
        let expected = "example.org/papers/42";
        for raw in [
            "https://www.example.org/papers/42",
            "http://EXAMPLE.org/papers/42/",
            "https://example.org/papers/42#section-2",
            "example.org/papers/42?utm_source=feed",
        ] {
            assert_eq!(normalize_url(raw).unwrap(), expected, "input {raw:?}");
        }
    }

    #[test]
    fn test_normalize_url_keeps_identifying_query() {
        assert_eq!(
            normalize_url("https://example.org/view?id=7&utm_medium=x").unwrap(),
            "example.org/view?id=7"
        );
    }

    #[test]
    fn test_normalize_url_rejects() {
        assert!(normalize_url("").is_err());
        assert!(normalize_url("ftp://example.org/file").is_err());
    }

    #[test]
    fn test_title_key() {
        assert_eq!(
            title_key("Deep Learning: A Survey"),
            title_key("a survey, deep LEARNING")
        );
        assert_eq!(title_key("  "), "");
    }

    #[test]
    fn test_title_similarity() {
        let a = title_key("Attention is all you need");
        assert_eq!(title_similarity(&a, &a), 100.0);

        let b = title_key("Attention is all you need!");
        assert_eq!(title_similarity(&a, &b), 100.0);

        let c = title_key("Graph neural networks for molecules");
        assert!(title_similarity(&a, &c) < 85.0);

        assert_eq!(title_similarity("", ""), 100.0);
        assert_eq!(title_similarity("abc", ""), 0.0);
    }

    #[test]
    fn test_title_similarity_counts_indels() {
        // LCS "ittn": 2 * 4 / 13
        assert!((title_similarity("kitten", "sitting") - 800.0 / 13.0).abs() < 1e-9);

        // Three trailing insertions on a ten-character key stay above 85
        let score = title_similarity("abcdefghij", "abcdefghijxyz");
        assert!((score - 2000.0 / 23.0).abs() < 1e-9);
        assert!(score >= 85.0);
    }
}
