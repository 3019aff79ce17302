// Text marker helpers for pages that embed data in inline scripts

use scraper::Html;

/// Returns the text between the first `begin` and the following `end`, or an empty string.
pub fn extr<'a>(text: &'a str, begin: &str, end: &str) -> &'a str {
    extr_from(text, begin, end, 0).map(|(value, _)| value).unwrap_or("")
}

/// Every non-overlapping `begin ... end` span in order.
pub fn extract_iter<'a>(text: &'a str, begin: &'a str, end: &'a str) -> impl Iterator<Item = &'a str> + 'a {
    let mut pos = 0;
    std::iter::from_fn(move || {
        let (value, next) = extr_from(text, begin, end, pos)?;
        pos = next;
        Some(value)
    })
}

fn extr_from<'a>(text: &'a str, begin: &str, end: &str, pos: usize) -> Option<(&'a str, usize)> {
    let haystack = text.get(pos..)?;
    let start = pos + haystack.find(begin)? + begin.len();
    let stop = start + text[start..].find(end)?;
    Some((&text[start..stop], stop + end.len()))
}

/// Decodes a fragment lifted out of a JSON string literal, then HTML entities.
///
/// Fragments that are not valid JSON string content fall back to unescaping `\/` only.
pub fn decode(fragment: &str) -> String {
    let quoted = format!("\"{}\"", fragment);
    let unescaped = serde_json::from_str::<String>(&quoted).unwrap_or_else(|_| fragment.replace("\\/", "/"));
    unescape_html(&unescaped)
}

/// Resolves every HTML character reference: named, decimal and hex.
///
/// `<` is escaped first so markup-looking text stays literal.
pub fn unescape_html(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }
    let fragment = Html::parse_fragment(&text.replace('<', "&lt;"));
    fragment.root_element().text().collect()
}

/// English name of an ISO 639-1 language code.
pub fn language_name(code: &str) -> Option<&'static str> {
    let name = match code.to_ascii_lowercase().as_str() {
        "ar" => "Arabic",
        "bg" => "Bulgarian",
        "ca" => "Catalan",
        "cs" => "Czech",
        "da" => "Danish",
        "de" => "German",
        "el" => "Greek",
        "en" => "English",
        "es" => "Spanish",
        "fa" => "Persian",
        "fi" => "Finnish",
        "fr" => "French",
        "he" => "Hebrew",
        "hi" => "Hindi",
        "hu" => "Hungarian",
        "id" => "Indonesian",
        "it" => "Italian",
        "ja" => "Japanese",
        "ko" => "Korean",
        "ms" => "Malay",
        "nl" => "Dutch",
        "no" => "Norwegian",
        "pl" => "Polish",
        "pt" => "Portuguese",
        "ro" => "Romanian",
        "ru" => "Russian",
        "sv" => "Swedish",
        "th" => "Thai",
        "tl" => "Tagalog",
        "tr" => "Turkish",
        "uk" => "Ukrainian",
        "vi" => "Vietnamese",
        "zh" => "Chinese",
        _ => return None,
    };
    Some(name)
}

/// Splits the last path segment of a media URL into name and extension.
pub fn filename_parts(url: &str) -> (String, String) {
    let path = url.split(['?', '#']).next().unwrap_or("");
    let segment = path.rsplit('/').next().unwrap_or("");
    match segment.rsplit_once('.') {
        Some((name, ext)) if !name.is_empty() => (name.to_string(), ext.to_lowercase()),
        _ => (segment.to_string(), String::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extr_between_markers() {
        let page = r#"{"id":"123","next":"456"}"#;
        assert_eq!(extr(page, r#""id":""#, "\""), "123");
        assert_eq!(extr(page, r#""next":""#, "\""), "456");
        assert_eq!(extr(page, r#""missing":""#, "\""), "");
        assert_eq!(extr(page, r#""id":""#, "never"), "");
    }

    #[test]
    fn test_extract_iter_walks_all_spans() {
        let page = "<1> <2> <3";
        let values: Vec<&str> = extract_iter(page, "<", ">").collect();
        assert_eq!(values, ["1", "2"]);
    }

    #[test]
    fn test_decode_json_and_html_escapes() {
        assert_eq!(
            decode(r"https:\/\/cdn.example.com\/a.jpg?x=1&y=2"),
            "https://cdn.example.com/a.jpg?x=1&y=2"
        );
        assert_eq!(decode(r"café &amp; bar"), "café & bar");
        assert_eq!(decode(r"broken \q \/path"), r"broken \q /path");
    }

    #[test]
    fn test_unescape_numeric_and_named_entities() {
        assert_eq!(unescape_html("it&#8217;s"), "it\u{2019}s");
        assert_eq!(unescape_html("&#x27;quoted&#x27;"), "'quoted'");
        assert_eq!(unescape_html("a&nbsp;b"), "a\u{a0}b");
        assert_eq!(unescape_html("&eacute;t&eacute; &amp; more"), "été & more");
        assert_eq!(unescape_html("<b>&lt;tag&gt;</b>"), "<b><tag></b>");
        assert_eq!(unescape_html("fish & chips"), "fish & chips");
    }

    #[test]
    fn test_language_name() {
        assert_eq!(language_name("pt"), Some("Portuguese"));
        assert_eq!(language_name("EN"), Some("English"));
        assert_eq!(language_name("xx"), None);
    }

    #[test]
    fn test_filename_parts() {
        assert_eq!(
            filename_parts("https://cdn.example.com/v/t1/12345_n.JPG?stp=dst"),
            ("12345_n".to_string(), "jpg".to_string())
        );
        assert_eq!(
            filename_parts("https://cdn.example.com/noext"),
            ("noext".to_string(), String::new())
        );
    }
}
