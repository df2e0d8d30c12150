// transitive-net/src/validation.rs
use transitive_common::error::{ResolveError, Result};
use url::Url;

/// Validates a URL, ensuring it is absolute and uses http or https.
pub fn validate_url(url_str: &str) -> Result<Url> {
    let url = Url::parse(url_str)
        .map_err(|e| ResolveError::Validation(format!("Failed to parse URL '{url_str}': {e}")))?;
    if matches!(url.scheme(), "http" | "https") {
        Ok(url)
    } else {
        Err(ResolveError::Validation(format!(
            "Invalid URL scheme for '{}': must be http or https, but got '{}'",
            url_str,
            url.scheme()
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_http_and_https_only() {
        assert!(validate_url("https://repo1.maven.org/maven2/a.pom").is_ok());
        assert!(validate_url("http://localhost:8081/repo/a.pom").is_ok());
        assert!(validate_url("ftp://example.com/a.pom").is_err());
        assert!(validate_url("/relative/a.pom").is_err());
    }
}
