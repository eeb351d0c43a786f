use http::Method;

/// Derives the cache key for a request: a lowercase hex blake3 digest over
/// the method bytes followed by the host and target bytes. Identical
/// (method, host, target) triples always map to the same key.
pub fn compute_key(method: &Method, host: &str, target: &str) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(method.as_str().as_bytes());
    hasher.update(host.as_bytes());
    hasher.update(target.as_bytes());
    hasher.finalize().to_hex().to_string()
}

/// Normalizes a Host value for cache keying. In fixed-origin mode the Host
/// header carries the configured origin URL (e.g. `http://dummyjson.com`),
/// while full-proxy clients send a bare authority; stripping the scheme and
/// any trailing slash makes both spellings share a key.
pub fn canonical_host(value: &str) -> &str {
    let stripped = value
        .strip_prefix("http://")
        .or_else(|| value.strip_prefix("https://"))
        .unwrap_or(value);
    stripped.trim_end_matches('/')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_triples_share_a_key() {
        let a = compute_key(&Method::GET, "dummyjson.com", "/products/1");
        let b = compute_key(&Method::GET, "dummyjson.com", "/products/1");
        assert_eq!(a, b);
    }

    #[test]
    fn key_is_lowercase_hex_digest() {
        let key = compute_key(&Method::GET, "example.com", "/");
        assert_eq!(key.len(), 64);
        assert!(key.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn any_differing_component_changes_the_key() {
        let base = compute_key(&Method::GET, "example.com", "/a");
        assert_ne!(base, compute_key(&Method::POST, "example.com", "/a"));
        assert_ne!(base, compute_key(&Method::GET, "example.org", "/a"));
        assert_ne!(base, compute_key(&Method::GET, "example.com", "/b"));
    }

    #[test]
    fn distinct_keys_over_a_corpus() {
        let corpus = [
            (Method::GET, "example.com", "/"),
            (Method::GET, "example.com", "/index"),
            (Method::GET, "api.example.com", "/index"),
            (Method::PUT, "example.com", "/index"),
            (Method::DELETE, "example.com", "/index"),
        ];
        let mut keys: Vec<_> = corpus
            .iter()
            .map(|(method, host, target)| compute_key(method, host, target))
            .collect();
        keys.sort();
        keys.dedup();
        assert_eq!(keys.len(), corpus.len(), "corpus produced colliding keys");
    }

    #[test]
    fn canonical_host_strips_scheme_and_trailing_slash() {
        assert_eq!(canonical_host("http://dummyjson.com"), "dummyjson.com");
        assert_eq!(canonical_host("https://dummyjson.com/"), "dummyjson.com");
        assert_eq!(canonical_host("dummyjson.com"), "dummyjson.com");
        assert_eq!(canonical_host("dummyjson.com:8080"), "dummyjson.com:8080");
    }

    #[test]
    fn schemed_and_bare_hosts_share_a_key() {
        let schemed = compute_key(
            &Method::GET,
            canonical_host("http://dummyjson.com"),
            "/products/1",
        );
        let bare = compute_key(&Method::GET, canonical_host("dummyjson.com"), "/products/1");
        assert_eq!(schemed, bare);
    }
}
