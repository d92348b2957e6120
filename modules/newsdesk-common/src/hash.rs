use sha2::{Digest, Sha256};

/// MD5 hex of the exact URL string. Primary dedup key for articles and
/// pending URLs (32 chars).
pub fn url_hash(url: &str) -> String {
    format!("{:x}", md5::compute(url.as_bytes()))
}

/// Collapse all whitespace runs to single spaces and trim.
pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// SHA-256 hex of the whitespace-normalized content (64 chars).
/// Changes iff the content semantically changed. None for empty input.
pub fn content_hash(content: &str) -> Option<String> {
    if content.trim().is_empty() {
        return None;
    }
    let normalized = normalize_whitespace(content);
    let digest = Sha256::digest(normalized.as_bytes());
    Some(hex::encode(digest))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_hash_matches_known_md5() {
        assert_eq!(
            url_hash("https://example.com/a"),
            "bea8252ff4e80f41719ea13cdf007273"
        );
    }

    #[test]
    fn url_hash_is_stable() {
        let u = "https://news.example.com/2023/07/14/story";
        assert_eq!(url_hash(u), url_hash(u));
        assert_eq!(url_hash(u).len(), 32);
    }

    #[test]
    fn content_hash_ignores_whitespace_differences() {
        let a = content_hash("hello   world\n\n");
        let b = content_hash("hello world");
        assert_eq!(a, b);
    }

    #[test]
    fn content_hash_empty_is_none() {
        assert_eq!(content_hash(""), None);
        assert_eq!(content_hash("   \n\t"), None);
    }

    #[test]
    fn content_hash_changes_with_content() {
        assert_ne!(content_hash("alpha"), content_hash("bravo"));
        assert_eq!(content_hash("alpha").unwrap().len(), 64);
    }
}
