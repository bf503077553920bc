//! URL helpers shared by every inlining phase.
//!
//! These are pure functions: joining a reference against a base, recognising
//! references that are already embedded, and pulling the token out of a CSS
//! `url(...)` value.

use crate::{Error, Result};
use base64::Engine as _;
use std::time::{SystemTime, UNIX_EPOCH};
use url::Url;

const CSS_WHITESPACE: &[char] = &['\t', '\r', '\x0c', '\n', ' '];

/// Resolve `reference` against `base`.
///
/// Absolute references come back unchanged. An empty base or `about:blank`
/// means there is no base. When the base is itself relative (for example the
/// raw `href` of a stylesheet), the reference is appended to the directory
/// part of the base.
pub fn join_url(base: &str, reference: &str) -> String {
    if Url::parse(reference).is_ok() {
        return reference.to_string();
    }
    if base.is_empty() || base == "about:blank" {
        return reference.to_string();
    }

    match Url::parse(base) {
        Ok(base) => base
            .join(reference)
            .map(|u| u.to_string())
            .unwrap_or_else(|_| reference.to_string()),
        Err(_) => join_relative_path(base, reference),
    }
}

fn join_relative_path(base: &str, reference: &str) -> String {
    if reference.starts_with('/') || reference.starts_with('#') {
        return reference.to_string();
    }
    let base = base.split(['?', '#']).next().unwrap_or(base);
    let reference = reference.strip_prefix("./").unwrap_or(reference);
    match base.rfind('/') {
        Some(idx) => format!("{}{}", &base[..=idx], reference),
        None => reference.to_string(),
    }
}

/// Whether the reference already carries its data inline.
pub fn is_data_uri(url: &str) -> bool {
    url.get(..5)
        .map(|scheme| scheme.eq_ignore_ascii_case("data:"))
        .unwrap_or(false)
}

/// Strip one level of matching single or double quotes.
pub fn unquote(value: &str) -> &str {
    let bytes = value.as_bytes();
    if bytes.len() >= 2 {
        let (first, last) = (bytes[0], bytes[bytes.len() - 1]);
        if (first == b'"' || first == b'\'') && first == last {
            return &value[1..value.len() - 1];
        }
    }
    value
}

/// Extract the reference token from a `url(<token>)` value.
///
/// Whitespace inside the parentheses and one level of quoting are removed.
/// Anything that is not a functional `url()` reference is a
/// [`Error::Format`]; the input is never touched.
pub fn extract_css_url(value: &str) -> Result<String> {
    split_css_url(value).map(|(url, _)| url)
}

/// Like [`extract_css_url`], also returning whatever follows the closing
/// parenthesis (e.g. ` format("woff"), url(b.ttf)` in a font `src`).
pub(crate) fn split_css_url(value: &str) -> Result<(String, &str)> {
    let invalid = || Error::Format(format!("not a url() reference: {}", value));

    let head = value.get(..4).ok_or_else(invalid)?;
    if !head.eq_ignore_ascii_case("url(") {
        return Err(invalid());
    }
    let inner = &value[4..];
    let trimmed = inner.trim_start_matches(CSS_WHITESPACE);
    let leading = inner.len() - trimmed.len();

    let close = match trimmed.chars().next() {
        Some(quote @ ('"' | '\'')) => {
            let end_quote = trimmed[1..].find(quote).ok_or_else(invalid)? + 1;
            let after = &trimmed[end_quote + 1..];
            let after_ws = after.trim_start_matches(CSS_WHITESPACE);
            if !after_ws.starts_with(')') {
                return Err(invalid());
            }
            leading + end_quote + 1 + (after.len() - after_ws.len())
        }
        _ => leading + trimmed.find(')').ok_or_else(invalid)?,
    };

    let token = inner[..close].trim_matches(CSS_WHITESPACE);
    if token.is_empty() {
        return Err(invalid());
    }
    let url = unquote(token);
    Ok((url.to_string(), &inner[close + 1..]))
}

/// Find the first `url()` anywhere in a declaration value, such as
/// `local("X"), url(a.woff)` or `url(x.png) no-repeat`.
///
/// Returns the text before it, its unquoted content and the text after it.
/// `url(` inside quoted strings is not a match.
pub(crate) fn locate_css_url(value: &str) -> Option<(&str, String, &str)> {
    let bytes = value.as_bytes();
    let mut quote: Option<u8> = None;
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        match quote {
            Some(_) if b == b'\\' => i += 1,
            Some(q) if b == q => quote = None,
            Some(_) => {}
            None if b == b'"' || b == b'\'' => quote = Some(b),
            None => {
                let starts_token = i == 0 || !(bytes[i - 1].is_ascii_alphanumeric() || matches!(bytes[i - 1], b'-' | b'_'));
                if starts_token && bytes.len() - i >= 4 && bytes[i..i + 4].eq_ignore_ascii_case(b"url(") {
                    let (url, rest) = split_css_url(&value[i..]).ok()?;
                    return Some((&value[..i], url, rest));
                }
            }
        }
        i += 1;
    }
    None
}

/// Append a cache-busting parameter so that no caching layer answers.
pub fn uncachable_url(url: &str) -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default();
    let separator = if url.contains('?') { '&' } else { '?' };
    format!("{}{}_={}", url, separator, millis)
}

/// Encode bytes as a base64 `data:` URI.
pub fn data_uri(mime: &str, bytes: &[u8]) -> String {
    format!(
        "data:{};base64,{}",
        mime,
        base64::engine::general_purpose::STANDARD.encode(bytes)
    )
}

/// Best guess for a font resource's MIME type from its URL.
pub fn font_mime_for(url: &str) -> &'static str {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let ext = path
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "woff2" => "font/woff2",
        "ttf" => "font/ttf",
        "otf" => "font/otf",
        "eot" => "application/vnd.ms-fontobject",
        "svg" => "image/svg+xml",
        _ => "font/woff",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_url_resolves_relative_against_absolute_base() {
        assert_eq!(
            join_url("http://example.com/dir/page.html", "img/a.png"),
            "http://example.com/dir/img/a.png"
        );
        assert_eq!(
            join_url("http://example.com/dir/page.html", "/root.css"),
            "http://example.com/root.css"
        );
    }

    #[test]
    fn join_url_keeps_absolute_references() {
        assert_eq!(
            join_url("http://example.com/", "https://cdn.example.org/x.css"),
            "https://cdn.example.org/x.css"
        );
        assert_eq!(join_url("http://example.com/", "data:image/png;base64,AA"), "data:image/png;base64,AA");
    }

    #[test]
    fn join_url_treats_blank_base_as_missing() {
        assert_eq!(join_url("about:blank", "a.css"), "a.css");
        assert_eq!(join_url("", "a.css"), "a.css");
    }

    #[test]
    fn join_url_with_relative_base_uses_its_directory() {
        assert_eq!(join_url("this_url/that.css", "the_image.png"), "this_url/the_image.png");
        assert_eq!(join_url("that.css", "the_image.png"), "the_image.png");
        assert_eq!(join_url("some_url/", "missing.css"), "some_url/missing.css");
    }

    #[test]
    fn detects_data_uris() {
        assert!(is_data_uri("data:image/png;base64,AAAA"));
        assert!(is_data_uri("DATA:text/plain,hi"));
        assert!(!is_data_uri("http://example.com/data:"));
        assert!(!is_data_uri("dat"));
    }

    #[test]
    fn extract_css_url_handles_quoting_and_whitespace() {
        assert_eq!(extract_css_url("url(a.png)").unwrap(), "a.png");
        assert_eq!(extract_css_url("url(\"a.png\")").unwrap(), "a.png");
        assert_eq!(extract_css_url("url('a.png')").unwrap(), "a.png");
        assert_eq!(extract_css_url("url(  \"a.png\"\n )").unwrap(), "a.png");
        assert_eq!(extract_css_url("url(\t b c.png )").unwrap(), "b c.png");
    }

    #[test]
    fn extract_css_url_rejects_other_values() {
        let input = String::from("none");
        assert!(matches!(extract_css_url(&input), Err(Error::Format(_))));
        assert_eq!(input, "none");
        assert!(extract_css_url("url()").is_err());
        assert!(extract_css_url("url(a.png").is_err());
        assert!(extract_css_url("linear-gradient(red, blue)").is_err());
    }

    #[test]
    fn split_css_url_returns_the_tail() {
        let (url, rest) = split_css_url("url(\"f.woff\") format(\"woff\")").unwrap();
        assert_eq!(url, "f.woff");
        assert_eq!(rest, " format(\"woff\")");
        let (url, rest) = split_css_url("url('a)b.png')").unwrap();
        assert_eq!(url, "a)b.png");
        assert_eq!(rest, "");
    }

    #[test]
    fn locate_css_url_scans_past_leading_values() {
        let (prefix, url, rest) = locate_css_url("local(\"X\"), url(a.woff) format(\"woff\")").unwrap();
        assert_eq!(prefix, "local(\"X\"), ");
        assert_eq!(url, "a.woff");
        assert_eq!(rest, " format(\"woff\")");

        let (prefix, url, rest) = locate_css_url("#fff URL(x.png) no-repeat").unwrap();
        assert_eq!(prefix, "#fff ");
        assert_eq!(url, "x.png");
        assert_eq!(rest, " no-repeat");
    }

    #[test]
    fn locate_css_url_ignores_quoted_and_embedded_names() {
        assert!(locate_css_url("local(\"url(a.woff)\")").is_none());
        assert!(locate_css_url("myurl(a.png)").is_none());
        assert!(locate_css_url("none").is_none());
        let (prefix, url, _) = locate_css_url("local('it''s'), url(b.woff)").unwrap();
        assert_eq!(prefix, "local('it''s'), ");
        assert_eq!(url, "b.woff");
    }

    #[test]
    fn uncachable_url_appends_a_parameter() {
        assert!(uncachable_url("a.css").starts_with("a.css?_="));
        assert!(uncachable_url("a.css?v=1").starts_with("a.css?v=1&_="));
    }

    #[test]
    fn data_uri_is_base64() {
        assert_eq!(data_uri("font/woff", b"abc"), "data:font/woff;base64,YWJj");
    }

    #[test]
    fn font_mime_from_extension() {
        assert_eq!(font_mime_for("fonts/a.woff2?v=3"), "font/woff2");
        assert_eq!(font_mime_for("a.TTF"), "font/ttf");
        assert_eq!(font_mime_for("font"), "font/woff");
    }
}
