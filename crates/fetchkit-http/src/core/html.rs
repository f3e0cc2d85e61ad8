//! Extraction of title / keywords / description from an HTML head.

use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

static TITLE_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)<title[^>]*>(.*?)</title>").unwrap());

static META_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?is)<\s*meta\s*name="?([^>"]*)"?\s*content="?([^>"]*)"?\s*/?\s*>"#).unwrap()
});

static TAG_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<[^>]*>").unwrap());

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct HeadTags {
    pub title: String,
    pub keywords: String,
    pub description: String,
    /// Remaining `<meta name=… content=…>` pairs, names lower-cased.
    pub meta: BTreeMap<String, String>,
}

pub fn head_tags(content: &str) -> HeadTags {
    let mut tags = HeadTags::default();

    if let Some(caps) = TITLE_REGEX.captures(content) {
        tags.title = TAG_REGEX.replace_all(&caps[1], "").trim().to_string();
    }

    for caps in META_REGEX.captures_iter(content) {
        tags.meta.insert(caps[1].to_lowercase(), caps[2].to_string());
    }

    if let Some(keywords) = tags.meta.remove("keywords") {
        tags.keywords = keywords;
    }
    if let Some(description) = tags.meta.remove("description") {
        tags.description = description;
    }

    tags
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"<!DOCTYPE html>
<html><head>
<meta charset="utf-8">
<TITLE> Example <b>Site</b> </TITLE>
<meta name="Keywords" content="alpha,beta">
<meta name="description" content="A test page" />
<meta name="generator" content="hand">
</head><body></body></html>"#;

    #[test]
    fn test_head_tags() {
        let tags = head_tags(PAGE);
        assert_eq!(tags.title, "Example Site");
        assert_eq!(tags.keywords, "alpha,beta");
        assert_eq!(tags.description, "A test page");
        assert_eq!(tags.meta.get("generator").unwrap(), "hand");
        assert!(!tags.meta.contains_key("keywords"));
    }

    #[test]
    fn test_empty_document() {
        assert_eq!(head_tags(""), HeadTags::default());
    }
}
