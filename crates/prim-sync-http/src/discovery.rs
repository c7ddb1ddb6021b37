use std::sync::LazyLock;

use regex::{Regex, RegexBuilder};

static SWAGGER_URL_KEY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#""swaggerUrl"\s*:\s*"(https?://[^"]+)""#).expect("swaggerUrl pattern compiles")
});

/// URL shapes that commonly point at an OpenAPI document, tried in order.
const SPEC_URL_PATTERNS: [&str; 4] = [
    r#"https?://[^\s"'<>]+?(?:openapi|swagger)[^\s"'<>]*?\.json"#,
    r#"https?://[^\s"'<>]+?/spec(?:/|\.json)"#,
    r#"https?://[^\s"'<>]+?/api-docs(?:/|\.json)"#,
    r#"https?://[^\s"'<>]+?/swagger\?[^\s"'<>]+"#,
];

static SPEC_URLS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    SPEC_URL_PATTERNS
        .iter()
        .map(|pattern| {
            RegexBuilder::new(pattern)
                .case_insensitive(true)
                .build()
                .expect("spec URL pattern compiles")
        })
        .collect()
});

/// Find an API spec URL embedded in a portal page.
///
/// An explicit `"swaggerUrl": "..."` key wins. Otherwise the first pattern
/// with any match decides, and its leftmost match is returned.
pub fn extract_spec_url(html: &str) -> Option<String> {
    if let Some(captures) = SWAGGER_URL_KEY.captures(html) {
        return Some(captures[1].to_owned());
    }

    SPEC_URLS
        .iter()
        .find_map(|re| re.find(html))
        .map(|m| m.as_str().to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn swagger_url_key_takes_priority() {
        let html = r#"
            <a href="https://other.example.fr/openapi.json">docs</a>
            <script>window.config = {"swaggerUrl": "https://api.example.fr/v2/spec.yaml"};</script>
        "#;
        assert_eq!(
            extract_spec_url(html).as_deref(),
            Some("https://api.example.fr/v2/spec.yaml")
        );
    }

    #[test]
    fn openapi_json_link() {
        let html = r#"<a href="https://api.example.fr/marketplace/openapi.json">spec</a>"#;
        assert_eq!(
            extract_spec_url(html).as_deref(),
            Some("https://api.example.fr/marketplace/openapi.json")
        );
    }

    #[test]
    fn matching_is_case_insensitive() {
        let html = r#"<a href="https://api.example.fr/Swagger/V1.JSON">spec</a>"#;
        assert_eq!(
            extract_spec_url(html).as_deref(),
            Some("https://api.example.fr/Swagger/V1.JSON")
        );
    }

    #[test]
    fn pattern_order_decides() {
        let html = r#"
            <a href="https://api.example.fr/v1/api-docs.json">a</a>
            <a href="https://api.example.fr/v1/spec.json">b</a>
        "#;
        assert_eq!(
            extract_spec_url(html).as_deref(),
            Some("https://api.example.fr/v1/spec.json")
        );
    }

    #[test]
    fn swagger_query_url() {
        let html = r#"<iframe src="https://portal.example.fr/swagger?name=horaires"></iframe>"#;
        assert_eq!(
            extract_spec_url(html).as_deref(),
            Some("https://portal.example.fr/swagger?name=horaires")
        );
    }

    #[test]
    fn nothing_found() {
        assert_eq!(extract_spec_url("<html><body>No links</body></html>"), None);
    }
}
