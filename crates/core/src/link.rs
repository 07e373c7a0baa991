//! Link detection, page title extraction, and the title cleanup rule table.
//!
//! Page titles from music platforms carry boilerplate ("- YouTube",
//! "| Spotify", "(Official Video)") that would poison a catalog search. The
//! rules below strip it with a fixed, ordered table so the cleanup can be
//! tested without any network access.

use std::sync::LazyLock;

use regex::Regex;

use crate::error::CoreError;

/// How a free-text message should be handled in search mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TextInput {
    Link(String),
    Query(String),
}

static SCHEME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9+.\-]*://").expect("valid regex"));

static TITLE_TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<title[^>]*>(.*?)</title>").expect("valid regex"));

static OG_TITLE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?is)<meta[^>]*?(?:property|name)\s*=\s*["']og:title["'][^>]*?content\s*=\s*["']([^"']*)["']"#,
    )
    .expect("valid regex")
});

static OG_TITLE_REVERSED_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?is)<meta[^>]*?content\s*=\s*["']([^"']*)["'][^>]*?(?:property|name)\s*=\s*["']og:title["']"#,
    )
    .expect("valid regex")
});

static ENTITY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"&(?:#(\d{1,7})|#[xX]([0-9a-fA-F]{1,6})|(amp|quot|apos|lt|gt|nbsp));")
        .expect("valid regex")
});

static WHITESPACE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("valid regex"));

/// Classify a text message as a link or an opaque search query.
///
/// Anything that starts with a URL scheme is a link attempt; only `http`
/// and `https` links with a host are accepted.
pub fn classify_text(text: &str) -> Result<TextInput, CoreError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(CoreError::Validation("Message text is empty".to_string()));
    }

    if !SCHEME_RE.is_match(trimmed) {
        return Ok(TextInput::Query(trimmed.to_string()));
    }

    validate_link(trimmed)?;
    Ok(TextInput::Link(trimmed.to_string()))
}

/// Validate that a link is a well-formed `http(s)` URL with a host.
pub fn validate_link(link: &str) -> Result<(), CoreError> {
    let rest = link
        .strip_prefix("https://")
        .or_else(|| link.strip_prefix("http://"))
        .ok_or_else(|| {
            CoreError::Validation(format!(
                "Link must start with http:// or https://, got: '{link}'"
            ))
        })?;

    if rest.chars().any(char::is_whitespace) {
        return Err(CoreError::Validation(format!(
            "Link must not contain whitespace: '{link}'"
        )));
    }

    let host = rest.split(['/', '?', '#']).next().unwrap_or("");
    let host = host.rsplit('@').next().unwrap_or(host);
    if host.is_empty() || host.starts_with(':') {
        return Err(CoreError::Validation(format!("Link has no host: '{link}'")));
    }

    Ok(())
}

/// Extract the document title from an HTML page.
///
/// Uses `<title>` and falls back to the `og:title` meta tag when the title
/// element is missing or blank. Basic HTML entities are decoded.
pub fn extract_title(html: &str) -> Option<String> {
    let from_tag = TITLE_TAG_RE
        .captures(html)
        .and_then(|c| c.get(1))
        .map(|m| decode_entities(m.as_str()))
        .filter(|t| !t.trim().is_empty());

    from_tag
        .or_else(|| {
            OG_TITLE_RE
                .captures(html)
                .or_else(|| OG_TITLE_REVERSED_RE.captures(html))
                .and_then(|c| c.get(1))
                .map(|m| decode_entities(m.as_str()))
        })
        .map(|t| WHITESPACE_RE.replace_all(t.trim(), " ").into_owned())
        .filter(|t| !t.is_empty())
}

/// Decode numeric and the common named HTML entities.
pub fn decode_entities(text: &str) -> String {
    ENTITY_RE
        .replace_all(text, |caps: &regex::Captures<'_>| {
            if let Some(dec) = caps.get(1) {
                return dec
                    .as_str()
                    .parse::<u32>()
                    .ok()
                    .and_then(char::from_u32)
                    .map(String::from)
                    .unwrap_or_default();
            }
            if let Some(hex) = caps.get(2) {
                return u32::from_str_radix(hex.as_str(), 16)
                    .ok()
                    .and_then(char::from_u32)
                    .map(String::from)
                    .unwrap_or_default();
            }
            match caps.get(3).map(|m| m.as_str()) {
                Some("amp") => "&",
                Some("quot") => "\"",
                Some("apos") => "'",
                Some("lt") => "<",
                Some("gt") => ">",
                _ => " ",
            }
            .to_string()
        })
        .into_owned()
}

// ---------------------------------------------------------------------------
// Title cleanup rules
// ---------------------------------------------------------------------------

/// One textual cleanup rule: every match of `pattern` (case-insensitive)
/// is replaced with `replacement`.
#[derive(Debug, Clone, Copy)]
pub struct TitleRule {
    pub name: &'static str,
    pub pattern: &'static str,
    pub replacement: &'static str,
}

/// Applied in order. Suffix rules are anchored so a song that merely
/// mentions a platform name keeps it.
pub const TITLE_RULES: &[TitleRule] = &[
    TitleRule {
        name: "bidi_marks",
        pattern: r"[\x{200e}\x{200f}]",
        replacement: "",
    },
    TitleRule {
        name: "youtube_music_suffix",
        pattern: r"\s*[-–|]\s*YouTube Music\s*$",
        replacement: "",
    },
    TitleRule {
        name: "youtube_suffix",
        pattern: r"\s*[-–|]\s*YouTube\s*$",
        replacement: "",
    },
    TitleRule {
        name: "spotify_suffix",
        pattern: r"\s*[-–|]\s*Spotify\s*$",
        replacement: "",
    },
    TitleRule {
        name: "spotify_song_by",
        pattern: r"\s*[-–]\s*(?:song|single|album|ep)(?:\s+and\s+lyrics)?\s+by\s+",
        replacement: " ",
    },
    TitleRule {
        name: "apple_music_suffix",
        pattern: r"\s*(?:[-–|]\s*)?on Apple Music\s*$",
        replacement: "",
    },
    TitleRule {
        name: "soundcloud_stream_framing",
        pattern: r"^\s*Stream\s+(.+?)\s*\|\s*Listen online for free on SoundCloud\s*$",
        replacement: "$1",
    },
    TitleRule {
        name: "soundcloud_suffix",
        pattern: r"\s*[-–|]\s*SoundCloud\s*$",
        replacement: "",
    },
    TitleRule {
        name: "tiktok_suffix",
        pattern: r"\s*[-–|]\s*TikTok\s*$",
        replacement: "",
    },
    TitleRule {
        name: "deezer_suffix",
        pattern: r"\s*[-–|]\s*Deezer\s*$",
        replacement: "",
    },
    TitleRule {
        name: "bracketed_tags",
        pattern: r"\s*[\(\[]\s*(?:official\s+)?(?:music\s+|lyric\s+)?(?:video|audio|lyrics?|visuali[sz]er|hd|hq|4k)\s*[\)\]]",
        replacement: "",
    },
];

static COMPILED_RULES: LazyLock<Vec<(&'static TitleRule, Regex)>> = LazyLock::new(|| {
    TITLE_RULES
        .iter()
        .map(|rule| {
            let re = Regex::new(&format!("(?i){}", rule.pattern)).expect("valid title rule");
            (rule, re)
        })
        .collect()
});

/// Run a raw page title through [`TITLE_RULES`], collapse whitespace, and
/// trim leftover separators. Returns `None` when nothing usable remains.
pub fn clean_title(raw: &str) -> Option<String> {
    let mut title = raw.to_string();
    for (rule, re) in COMPILED_RULES.iter() {
        title = re.replace_all(&title, rule.replacement).into_owned();
    }

    let collapsed = WHITESPACE_RE.replace_all(&title, " ");
    let cleaned = collapsed
        .trim_matches(|c: char| c.is_whitespace() || matches!(c, '-' | '–' | '|' | '·'))
        .to_string();

    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned)
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    // -- classify_text --------------------------------------------------------

    #[test]
    fn plain_text_is_query() {
        assert_eq!(
            classify_text("  Thriller MJ ").unwrap(),
            TextInput::Query("Thriller MJ".into())
        );
    }

    #[test]
    fn https_text_is_link() {
        assert_eq!(
            classify_text("https://youtu.be/abc").unwrap(),
            TextInput::Link("https://youtu.be/abc".into())
        );
    }

    #[test]
    fn empty_text_rejected() {
        assert_matches!(classify_text("   "), Err(CoreError::Validation(_)));
    }

    #[test]
    fn unsupported_scheme_rejected() {
        assert_matches!(classify_text("ftp://host/file"), Err(CoreError::Validation(_)));
    }

    #[test]
    fn link_without_host_rejected() {
        assert!(validate_link("https:///path").is_err());
        assert!(validate_link("http://").is_err());
        assert!(validate_link("https://exa mple.com").is_err());
        assert!(validate_link("https://example.com/a?b=c").is_ok());
    }

    // -- extract_title --------------------------------------------------------

    #[test]
    fn extracts_title_element() {
        let html = "<html><head><TITLE>\n  Thriller &amp; More - YouTube\n</TITLE></head></html>";
        assert_eq!(extract_title(html).as_deref(), Some("Thriller & More - YouTube"));
    }

    #[test]
    fn falls_back_to_og_title() {
        let html = r#"<head><title> </title><meta property="og:title" content="Billie Jean"></head>"#;
        assert_eq!(extract_title(html).as_deref(), Some("Billie Jean"));

        let reversed = r#"<meta content="Beat It" property="og:title" />"#;
        assert_eq!(extract_title(reversed).as_deref(), Some("Beat It"));
    }

    #[test]
    fn missing_title_is_none() {
        assert_eq!(extract_title("<html><body>nothing</body></html>"), None);
    }

    #[test]
    fn decodes_numeric_entities() {
        assert_eq!(decode_entities("Don&#39;t Stop &#x27;Til"), "Don't Stop 'Til");
    }

    // -- clean_title ----------------------------------------------------------

    #[test]
    fn strips_youtube_boilerplate() {
        assert_eq!(
            clean_title("Michael Jackson - Thriller (Official Video) - YouTube").as_deref(),
            Some("Michael Jackson - Thriller")
        );
        assert_eq!(
            clean_title("Thriller [Official Audio] - YouTube Music").as_deref(),
            Some("Thriller")
        );
    }

    #[test]
    fn rewrites_spotify_title() {
        assert_eq!(
            clean_title("Thriller - song and lyrics by Michael Jackson | Spotify").as_deref(),
            Some("Thriller Michael Jackson")
        );
    }

    #[test]
    fn unwraps_soundcloud_framing() {
        assert_eq!(
            clean_title("Stream Thriller by MJ | Listen online for free on SoundCloud").as_deref(),
            Some("Thriller by MJ")
        );
    }

    #[test]
    fn strips_apple_music_and_bidi_marks() {
        assert_eq!(
            clean_title("\u{200e}Thriller by Michael Jackson on Apple Music").as_deref(),
            Some("Thriller by Michael Jackson")
        );
    }

    #[test]
    fn platform_name_inside_title_survives() {
        assert_eq!(
            clean_title("YouTube Killed the Radio Star").as_deref(),
            Some("YouTube Killed the Radio Star")
        );
    }

    #[test]
    fn boilerplate_only_title_is_none() {
        assert_eq!(clean_title(" - YouTube"), None);
        assert_eq!(clean_title("TikTok"), Some("TikTok".to_string()));
    }

    #[test]
    fn every_rule_compiles() {
        assert_eq!(COMPILED_RULES.len(), TITLE_RULES.len());
    }
}
