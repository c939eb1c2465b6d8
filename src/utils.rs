use chrono::{DateTime, FixedOffset};
use lazy_regex::regex;
use reqwest::Url;

pub(crate) fn get_now() -> DateTime<FixedOffset> {
    let now = chrono::offset::Local::now();
    now.with_timezone(now.offset())
}

/// Collapses runs of whitespace and trims. Blank text becomes `None`.
pub(crate) fn clean_text<S: AsRef<str>>(s: S) -> Option<String> {
    let s = regex!(r"\s+").replace_all(s.as_ref(), " ");
    let s = s.trim();
    if s.is_empty() {
        None
    } else {
        Some(s.to_string())
    }
}

/// `"UX/UI Designer"` -> `"ux/ui-designer"`
pub(crate) fn slugify(query: &str) -> String {
    query
        .split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join("-")
}

pub(crate) fn absolutize(base: &Url, href: &str) -> Result<String, String> {
    base.join(href.trim())
        .map(String::from)
        .map_err(|e| format!("bad href {:?}: {}", href, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn clean_text_collapses_whitespace() {
        assert_eq!(
            clean_text("  Senior\n   Data   Scientist \t"),
            Some("Senior Data Scientist".to_string())
        );
        assert_eq!(clean_text(" \n\t "), None);
    }

    #[test]
    fn slugify_query() {
        assert_eq!(slugify("Data Scientist"), "data-scientist");
        assert_eq!(slugify("  AI   Engineer "), "ai-engineer");
    }

    #[test]
    fn absolutize_relative_and_absolute() {
        let base = Url::parse("https://www.bayt.com").unwrap();
        assert_eq!(
            absolutize(&base, "/en/job/123/").unwrap(),
            "https://www.bayt.com/en/job/123/"
        );
        assert_eq!(
            absolutize(&base, "https://other.example/x").unwrap(),
            "https://other.example/x"
        );
        assert!(absolutize(&base, "http://[::1").is_err());
    }
}
