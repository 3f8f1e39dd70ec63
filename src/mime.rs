//! Media Vault - MIME Types
//!
//! Mapping between MIME types and file-type tags, plus magic-byte sniffing
//! for sources that carry no usable name.

/// (mime, canonical extension) pairs
const TABLE: &[(&str, &str)] = &[
    ("image/jpeg", "jpg"),
    ("image/png", "png"),
    ("image/gif", "gif"),
    ("image/webp", "webp"),
    ("image/heic", "heic"),
    ("image/heif", "heif"),
    ("video/mp4", "mp4"),
    ("video/x-msvideo", "avi"),
    ("video/x-matroska", "mkv"),
];

/// Extra spellings accepted by [`mime_for_extension`]
const ALIASES: &[(&str, &str)] = &[
    ("jpeg", "image/jpeg"),
    ("jpe", "image/jpeg"),
    ("m4v", "video/mp4"),
];

/// Extension tag for a MIME type, e.g. `image/jpeg` -> `jpg`
pub fn extension_for_mime(mime: &str) -> Option<&'static str> {
    let essence = mime.split(';').next().unwrap_or("").trim().to_ascii_lowercase();
    TABLE
        .iter()
        .find(|(m, _)| *m == essence)
        .map(|(_, ext)| *ext)
}

/// MIME type for an extension (case-insensitive, leading dot allowed)
pub fn mime_for_extension(ext: &str) -> Option<&'static str> {
    let ext = ext.trim_start_matches('.').to_ascii_lowercase();
    TABLE
        .iter()
        .find(|(_, e)| *e == ext)
        .map(|(m, _)| *m)
        .or_else(|| ALIASES.iter().find(|(a, _)| *a == ext).map(|(_, m)| *m))
}

/// Detect MIME type from magic bytes
pub fn sniff_mime(data: &[u8]) -> Option<&'static str> {
    if data.len() < 4 {
        return None;
    }

    match data {
        [0xFF, 0xD8, 0xFF, ..] => return Some("image/jpeg"),
        [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, ..] => return Some("image/png"),
        [0x47, 0x49, 0x46, 0x38, ..] => return Some("image/gif"),
        [0x1A, 0x45, 0xDF, 0xA3, ..] => return Some("video/x-matroska"),
        _ => {}
    }

    if data.len() >= 12 && &data[0..4] == b"RIFF" {
        return match &data[8..12] {
            b"WEBP" => Some("image/webp"),
            b"AVI " => Some("video/x-msvideo"),
            _ => None,
        };
    }

    // ISO base media: [size:4]["ftyp"][brand:4]
    if data.len() >= 12 && &data[4..8] == b"ftyp" {
        return match &data[8..12] {
            b"heic" | b"heix" | b"hevc" | b"hevx" => Some("image/heic"),
            b"mif1" | b"msf1" => Some("image/heif"),
            b"isom" | b"iso2" | b"mp41" | b"mp42" | b"avc1" | b"M4V " | b"dash" => Some("video/mp4"),
            _ => None,
        };
    }

    None
}
