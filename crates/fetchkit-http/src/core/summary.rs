const SUMMARY_LIMIT: usize = 120;

/// A short printable excerpt of a body for error messages.
///
/// Returns `None` for empty bodies and for bodies that are not printable
/// text (binary content, control characters).
pub fn body_summary(body: &[u8]) -> Option<String> {
    if body.is_empty() {
        return None;
    }

    let text = std::str::from_utf8(body).ok()?;
    if text
        .chars()
        .any(|c| c.is_control() && !matches!(c, '\n' | '\r' | '\t'))
    {
        return None;
    }

    let mut summary: String = text.chars().take(SUMMARY_LIMIT).collect();
    if text.chars().nth(SUMMARY_LIMIT).is_some() {
        summary.push_str(" (truncated...)");
    }
    Some(summary)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_body() {
        assert_eq!(body_summary(b"not found").unwrap(), "not found");
    }

    #[test]
    fn test_long_body_truncated() {
        let body = "x".repeat(200);
        let summary = body_summary(body.as_bytes()).unwrap();
        assert!(summary.starts_with(&"x".repeat(120)));
        assert!(summary.ends_with("(truncated...)"));
    }

    #[test]
    fn test_non_printable() {
        assert!(body_summary(b"").is_none());
        assert!(body_summary(&[0xff, 0xfe]).is_none());
        assert!(body_summary(b"a\x00b").is_none());
    }
}
