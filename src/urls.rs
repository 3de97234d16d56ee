use once_cell::sync::Lazy;
use regex::Regex;

static URL_PARTS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?P<scheme>[A-Za-z][A-Za-z0-9+.\-]*)://(?P<host>[^/?#]*)(?P<rest>[^#]*)").expect("valid url regex")
});

/// Canonical form used to detect the same page saved twice.
pub fn normalize_url(raw: &str) -> String {
    let trimmed = raw.trim();
    let Some(caps) = URL_PARTS.captures(trimmed) else {
        return trimmed.trim_end_matches('/').to_string();
    };

    let scheme = caps["scheme"].to_ascii_lowercase();
    let host = caps["host"].to_ascii_lowercase();
    let host = host.strip_prefix("www.").unwrap_or(&host);
    let rest = caps["rest"].trim_end_matches('/');

    format!("{}://{}{}", scheme, host, rest)
}

/// Fallback display name for an entry that never carried one.
pub fn default_name_for_url(raw: &str) -> String {
    let trimmed = raw.trim();
    match URL_PARTS.captures(trimmed) {
        Some(caps) => {
            let host = caps["host"].to_ascii_lowercase();
            let host = host.rsplit('@').next().unwrap_or(&host);
            let host = host.split(':').next().unwrap_or(host);
            let host = host.strip_prefix("www.").unwrap_or(host);
            if host.is_empty() {
                trimmed.to_string()
            } else {
                host.to_string()
            }
        }
        None => trimmed.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::{default_name_for_url, normalize_url};

    #[test]
    fn normalizes_case_www_fragment_and_trailing_slash() {
        assert_eq!(normalize_url(" HTTPS://WWW.GitHub.com/ "), "https://github.com");
        assert_eq!(normalize_url("https://github.com/rust-lang/#readme"), "https://github.com/rust-lang");
        assert_eq!(
            normalize_url("https://example.com/Path?q=A"),
            "https://example.com/Path?q=A"
        );
    }

    #[test]
    fn keeps_unparseable_input_verbatim() {
        assert_eq!(normalize_url("about:blank"), "about:blank");
    }

    #[test]
    fn derives_host_name() {
        assert_eq!(default_name_for_url("https://www.rust-lang.org/learn"), "rust-lang.org");
        assert_eq!(default_name_for_url("http://user@localhost:8080/x"), "localhost");
        assert_eq!(default_name_for_url("not a url"), "not a url");
    }
}
