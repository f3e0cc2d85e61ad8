//! Content sniffing by leading magic bytes.

use std::path::Path;

struct Signature {
    offset: usize,
    magic: &'static [u8],
    mime: &'static str,
    extension: &'static str,
}

const fn sig(
    offset: usize,
    magic: &'static [u8],
    mime: &'static str,
    extension: &'static str,
) -> Signature {
    Signature {
        offset,
        magic,
        mime,
        extension,
    }
}

// Order matters: container formats that share a prefix (RIFF) are checked
// with their sub-type tag first.
const SIGNATURES: &[Signature] = &[
    sig(0, b"\x89PNG\r\n\x1a\n", "image/png", "png"),
    sig(0, b"\xff\xd8\xff", "image/jpeg", "jpg"),
    sig(0, b"GIF87a", "image/gif", "gif"),
    sig(0, b"GIF89a", "image/gif", "gif"),
    sig(8, b"WEBP", "image/webp", "webp"),
    sig(8, b"WAVE", "audio/wav", "wav"),
    sig(8, b"AVI ", "video/x-msvideo", "avi"),
    sig(0, b"BM", "image/bmp", "bmp"),
    sig(0, b"\x00\x00\x01\x00", "image/x-icon", "ico"),
    sig(0, b"II*\x00", "image/tiff", "tif"),
    sig(0, b"MM\x00*", "image/tiff", "tif"),
    sig(0, b"%PDF-", "application/pdf", "pdf"),
    sig(0, b"PK\x03\x04", "application/zip", "zip"),
    sig(0, b"\x1f\x8b", "application/gzip", "gz"),
    sig(0, b"BZh", "application/x-bzip2", "bz2"),
    sig(0, b"7z\xbc\xaf\x27\x1c", "application/x-7z-compressed", "7z"),
    sig(0, b"Rar!\x1a\x07", "application/vnd.rar", "rar"),
    sig(0, b"\xfd7zXZ\x00", "application/x-xz", "xz"),
    sig(257, b"ustar", "application/x-tar", "tar"),
    sig(0, b"ID3", "audio/mpeg", "mp3"),
    sig(0, b"\xff\xfb", "audio/mpeg", "mp3"),
    sig(0, b"OggS", "audio/ogg", "ogg"),
    sig(0, b"fLaC", "audio/flac", "flac"),
    sig(4, b"ftyp", "video/mp4", "mp4"),
    sig(0, b"\x1a\x45\xdf\xa3", "video/webm", "webm"),
    sig(0, b"wOFF", "font/woff", "woff"),
    sig(0, b"wOF2", "font/woff2", "woff2"),
    sig(0, b"\x7fELF", "application/x-executable", "elf"),
    sig(0, b"MZ", "application/x-msdownload", "exe"),
];

/// Guess the MIME type of a byte stream from its content.
///
/// Falls back to `text/plain` for valid UTF-8 and
/// `application/octet-stream` otherwise.
pub fn stream_mime_type(content: &[u8]) -> &'static str {
    sniff(content).0
}

/// Guess a file extension (without dot) for a byte stream.
pub fn stream_extension(content: &[u8]) -> &'static str {
    sniff(content).1
}

/// Guess the MIME type of a path from its extension.
pub fn mime_type(path: impl AsRef<Path>) -> mime_guess::Mime {
    mime_guess::from_path(path).first_or_octet_stream()
}

fn sniff(content: &[u8]) -> (&'static str, &'static str) {
    for s in SIGNATURES {
        let end = s.offset + s.magic.len();
        if content.len() >= end && &content[s.offset..end] == s.magic {
            return (s.mime, s.extension);
        }
    }

    match std::str::from_utf8(content) {
        Ok(text) => sniff_text(text),
        Err(_) => ("application/octet-stream", "bin"),
    }
}

fn sniff_text(text: &str) -> (&'static str, &'static str) {
    let head = text.trim_start_matches('\u{feff}').trim_start();
    let lower: String = head.chars().take(256).collect::<String>().to_ascii_lowercase();

    if lower.starts_with("<?xml") {
        if lower.contains("<svg") {
            ("image/svg+xml", "svg")
        } else {
            ("application/xml", "xml")
        }
    } else if lower.starts_with("<svg") {
        ("image/svg+xml", "svg")
    } else if lower.starts_with("<!doctype html") || lower.starts_with("<html") {
        ("text/html", "html")
    } else if (head.starts_with('{') || head.starts_with('[')) && looks_like_json(head) {
        ("application/json", "json")
    } else {
        ("text/plain", "txt")
    }
}

fn looks_like_json(text: &str) -> bool {
    let trimmed = text.trim_end();
    matches!(
        (trimmed.chars().next(), trimmed.chars().last()),
        (Some('{'), Some('}')) | (Some('['), Some(']'))
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sniff_images() {
        assert_eq!(stream_extension(b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR"), "png");
        assert_eq!(stream_extension(b"\xff\xd8\xff\xe0\0\x10JFIF"), "jpg");
        assert_eq!(stream_mime_type(b"GIF89a..."), "image/gif");
        assert_eq!(stream_extension(b"RIFF\0\0\0\0WEBPVP8 "), "webp");
    }

    #[test]
    fn test_riff_subtypes_are_distinguished() {
        assert_eq!(stream_extension(b"RIFF\0\0\0\0WAVEfmt "), "wav");
        assert_eq!(stream_extension(b"RIFF\0\0\0\0AVI LIST"), "avi");
    }

    #[test]
    fn test_sniff_archives() {
        assert_eq!(stream_extension(b"PK\x03\x04rest"), "zip");
        assert_eq!(stream_extension(b"\x1f\x8b\x08\0"), "gz");
        assert_eq!(stream_extension(b"%PDF-1.7\n"), "pdf");
    }

    #[test]
    fn test_sniff_tar_at_offset() {
        let mut block = vec![0u8; 512];
        block[257..262].copy_from_slice(b"ustar");
        assert_eq!(stream_extension(&block), "tar");
    }

    #[test]
    fn test_sniff_text_formats() {
        assert_eq!(stream_extension(b"<?xml version=\"1.0\"?><a/>"), "xml");
        assert_eq!(stream_extension(b"<?xml version=\"1.0\"?><svg></svg>"), "svg");
        assert_eq!(stream_extension(b"<!DOCTYPE html><html></html>"), "html");
        assert_eq!(stream_extension(b"  {\"a\": 1}\n"), "json");
        assert_eq!(stream_extension(b"plain words"), "txt");
        assert_eq!(stream_extension(b""), "txt");
    }

    #[test]
    fn test_unknown_binary() {
        assert_eq!(stream_extension(&[0x00, 0xff, 0xfe, 0x80]), "bin");
        assert_eq!(stream_mime_type(&[0x00, 0xff, 0xfe, 0x80]), "application/octet-stream");
    }

    #[test]
    fn test_mime_type_from_path() {
        assert_eq!(mime_type("photo.png").essence_str(), "image/png");
        assert_eq!(mime_type("unknown.zzz-not-real").essence_str(), "application/octet-stream");
    }
}
