//! Shared utility functions used across the codebase.

/// Parse a boolean flag value.
///
/// Recognises `1`, `true`, `yes`, `y`, `on` (case-insensitive) as `true`;
/// everything else maps to `false`.
pub fn parse_bool(value: &str) -> bool {
    matches!(
        value.trim().to_lowercase().as_str(),
        "1" | "true" | "yes" | "y" | "on"
    )
}

/// Lower-case a display name and join its words with `-`.
///
/// Used to derive ids for upstream agents that only carry a name.
pub fn slugify(name: &str) -> String {
    name.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join("-")
}

/// Turn an `http(s)://` base URL into the matching `ws(s)://` URL for `path`.
pub fn websocket_url(base: &url::Url, path: &str) -> Result<url::Url, url::ParseError> {
    let mut url = base.join(path)?;
    let scheme = match url.scheme() {
        "https" | "wss" => "wss",
        _ => "ws",
    };
    // Switching between special schemes is always accepted.
    let _ = url.set_scheme(scheme);
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_bool_accepts_common_spellings() {
        for value in ["1", "true", "YES", " y ", "On"] {
            assert!(parse_bool(value), "{value}");
        }
        for value in ["0", "false", "no", ""] {
            assert!(!parse_bool(value), "{value}");
        }
    }

    #[test]
    fn slugify_collapses_whitespace() {
        assert_eq!(slugify("Master Orchestrator"), "master-orchestrator");
        assert_eq!(slugify("  CSV   Parser "), "csv-parser");
        assert_eq!(slugify(""), "");
    }

    #[test]
    fn websocket_url_switches_scheme() {
        let base = url::Url::parse("http://localhost:4000").unwrap();
        assert_eq!(websocket_url(&base, "/ws").unwrap().as_str(), "ws://localhost:4000/ws");

        let secure = url::Url::parse("https://example.com/app/").unwrap();
        assert_eq!(
            websocket_url(&secure, "ws").unwrap().as_str(),
            "wss://example.com/app/ws"
        );
    }
}
