//! Magic-byte content type detection
//!
//! Uploaders routinely send `application/octet-stream` or a type guessed from
//! the file extension. The gateway sniffs the first [`SNIFF_LEN`] bytes of the
//! stored upload and replaces the declared type with the canonical one when a
//! known signature matches.
//!
//! Signatures are an ordered table evaluated top to bottom; the first match
//! wins. Several entries share prefixes (the three `RIFF` containers, the
//! EBML header used by both WebM and Matroska) so the order is part of the
//! contract.

use std::io::SeekFrom;
use std::path::Path;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeek, AsyncSeekExt};

/// Number of leading bytes inspected
pub const SNIFF_LEN: usize = 30;

/// Returned when nothing matches and the caller supplied no fallback
pub const OCTET_STREAM: &str = "application/octet-stream";

enum Signature {
    /// Literal bytes at offset 0
    Prefix(&'static [u8], &'static str),
    /// `RIFF` + 4 size bytes + form type
    Riff(&'static [u8; 4], &'static str),
    /// `00 00 01 Bx` MPEG elementary stream start code
    MpegStartCode,
    /// ISO base media `ftyp` box at offset 4, resolved by major brand
    Ftyp,
}

const ASF_GUID: &[u8] = &[
    0x30, 0x26, 0xB2, 0x75, 0x8E, 0x66, 0xCF, 0x11, 0xA6, 0xD9, 0x00, 0xAA, 0x00, 0x62, 0xCE, 0x6C,
];

const SIGNATURES: &[Signature] = &[
    Signature::Prefix(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A], "image/png"),
    Signature::Prefix(&[0xFF, 0xD8, 0xFF], "image/jpeg"),
    Signature::Prefix(b"GIF8", "image/gif"),
    Signature::Prefix(b"BM", "image/bmp"),
    Signature::Riff(b"WEBP", "image/webp"),
    Signature::Prefix(&[b'I', b'I', 0x2A, 0x00], "image/tiff"),
    Signature::Prefix(&[b'M', b'M', 0x00, 0x2A], "image/tiff"),
    Signature::Prefix(&[0x00, 0x00, 0x01, 0x00], "image/x-icon"),
    Signature::Prefix(b"%PDF", "application/pdf"),
    Signature::Prefix(&[b'P', b'K', 0x03, 0x04], "application/zip"),
    Signature::Prefix(&[b'P', b'K', 0x05, 0x06], "application/zip"),
    Signature::Prefix(&[b'P', b'K', 0x07, 0x08], "application/zip"),
    Signature::Prefix(b"ID3", "audio/mpeg"),
    Signature::Prefix(&[0xFF, 0xFB], "audio/mpeg"),
    Signature::Prefix(&[0xFF, 0xF3], "audio/mpeg"),
    Signature::Prefix(&[0xFF, 0xF2], "audio/mpeg"),
    Signature::Riff(b"WAVE", "audio/wav"),
    Signature::Prefix(b"OggS", "audio/ogg"),
    Signature::Prefix(b"fLaC", "audio/flac"),
    Signature::Riff(b"AVI ", "video/avi"),
    // Matroska shares the EBML header; both are reported as webm.
    Signature::Prefix(&[0x1A, 0x45, 0xDF, 0xA3], "video/webm"),
    Signature::Prefix(&[b'F', b'L', b'V', 0x01], "video/x-flv"),
    Signature::Prefix(ASF_GUID, "video/x-ms-asf"),
    Signature::MpegStartCode,
    Signature::Ftyp,
    Signature::Prefix(b"<!DOCTYPE", "text/html"),
    Signature::Prefix(b"<html", "text/html"),
    Signature::Prefix(b"<?xml", "application/xml"),
    Signature::Prefix(b"<svg", "image/svg+xml"),
    Signature::Prefix(b"{", "application/json"),
    Signature::Prefix(b"[", "application/json"),
];

const FTYP_BRANDS: &[(&[u8; 4], &str)] = &[
    (b"avif", "image/avif"),
    (b"heic", "image/heic"),
    (b"mif1", "image/heif"),
    (b"3gp4", "video/3gpp"),
    (b"3gp5", "video/3gpp"),
    (b"3gp6", "video/3gpp"),
    (b"3gp7", "video/3gpp"),
    (b"mp41", "video/mp4"),
    (b"mp42", "video/mp4"),
    (b"isom", "video/mp4"),
    (b"avc1", "video/mp4"),
    (b"qt  ", "video/mp4"),
];

impl Signature {
    fn matches(&self, buf: &[u8]) -> Option<&'static str> {
        match self {
            Signature::Prefix(magic, mime) => buf.starts_with(magic).then_some(*mime),
            Signature::Riff(form, mime) => {
                (buf.len() >= 12 && buf.starts_with(b"RIFF") && &buf[8..12] == *form)
                    .then_some(*mime)
            }
            Signature::MpegStartCode => match buf {
                [0x00, 0x00, 0x01, 0xB0..=0xBF, ..] => Some("video/mpeg"),
                _ => None,
            },
            Signature::Ftyp => {
                if buf.len() < 12 || &buf[4..8] != b"ftyp" {
                    return None;
                }
                let brand = &buf[8..12];
                let mime = FTYP_BRANDS
                    .iter()
                    .find(|(known, _)| known.as_slice() == brand)
                    .map(|(_, mime)| *mime)
                    .unwrap_or("video/mp4");
                Some(mime)
            }
        }
    }
}

/// Matches a byte prefix against the signature table.
pub fn sniff(buf: &[u8]) -> Option<&'static str> {
    SIGNATURES.iter().find_map(|signature| signature.matches(buf))
}

/// Detects the canonical content type of a seekable source.
///
/// The read position is rewound to the start both before and after
/// inspection. Sources shorter than [`SNIFF_LEN`] and I/O failures yield the
/// fallback; this never returns an error.
pub async fn detect<R>(reader: &mut R, fallback: Option<&str>) -> String
where
    R: AsyncRead + AsyncSeek + Unpin,
{
    let fallback = fallback.unwrap_or(OCTET_STREAM);

    if reader.seek(SeekFrom::Start(0)).await.is_err() {
        return fallback.to_string();
    }

    let mut buf = [0u8; SNIFF_LEN];
    let filled = read_prefix(reader, &mut buf).await;
    let rewound = reader.seek(SeekFrom::Start(0)).await.is_ok();

    if filled < SNIFF_LEN || !rewound {
        return fallback.to_string();
    }

    sniff(&buf).unwrap_or(fallback).to_string()
}

/// Opens `path` and runs [`detect`] on it.
pub async fn detect_file(path: &Path, fallback: Option<&str>) -> String {
    match tokio::fs::File::open(path).await {
        Ok(mut file) => detect(&mut file, fallback).await,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Cannot open file for type detection");
            fallback.unwrap_or(OCTET_STREAM).to_string()
        }
    }
}

async fn read_prefix<R>(reader: &mut R, buf: &mut [u8]) -> usize
where
    R: AsyncRead + Unpin,
{
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]).await {
            Ok(0) | Err(_) => break,
            Ok(n) => filled += n,
        }
    }
    filled
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn padded(prefix: &[u8]) -> Vec<u8> {
        let mut buf = prefix.to_vec();
        buf.resize(SNIFF_LEN + 10, 0x20);
        buf
    }

    fn ftyp(brand: &[u8; 4]) -> Vec<u8> {
        let mut buf = vec![0x00, 0x00, 0x00, 0x20];
        buf.extend_from_slice(b"ftyp");
        buf.extend_from_slice(brand);
        padded(&buf)
    }

    #[test]
    fn test_known_signatures_map_to_canonical_types() {
        let cases: Vec<(Vec<u8>, &str)> = vec![
            (padded(&[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A]), "image/png"),
            (padded(&[0xFF, 0xD8, 0xFF, 0xE0]), "image/jpeg"),
            (padded(b"GIF87a"), "image/gif"),
            (padded(b"GIF89a"), "image/gif"),
            (padded(b"BM"), "image/bmp"),
            (padded(b"RIFF\x10\x00\x00\x00WEBPVP8 "), "image/webp"),
            (padded(&[0x49, 0x49, 0x2A, 0x00]), "image/tiff"),
            (padded(&[0x4D, 0x4D, 0x00, 0x2A]), "image/tiff"),
            (padded(&[0x00, 0x00, 0x01, 0x00]), "image/x-icon"),
            (padded(b"%PDF-1.7"), "application/pdf"),
            (padded(&[0x50, 0x4B, 0x03, 0x04]), "application/zip"),
            (padded(&[0x50, 0x4B, 0x05, 0x06]), "application/zip"),
            (padded(&[0x50, 0x4B, 0x07, 0x08]), "application/zip"),
            (padded(b"ID3\x04"), "audio/mpeg"),
            (padded(&[0xFF, 0xFB, 0x90]), "audio/mpeg"),
            (padded(&[0xFF, 0xF3]), "audio/mpeg"),
            (padded(&[0xFF, 0xF2]), "audio/mpeg"),
            (padded(b"RIFF\xff\xff\x00\x00WAVEfmt "), "audio/wav"),
            (padded(b"OggS"), "audio/ogg"),
            (padded(b"fLaC"), "audio/flac"),
            (padded(b"RIFF\x00\x01\x02\x03AVI LIST"), "video/avi"),
            (padded(&[0x1A, 0x45, 0xDF, 0xA3]), "video/webm"),
            (padded(&[0x46, 0x4C, 0x56, 0x01]), "video/x-flv"),
            (padded(ASF_GUID), "video/x-ms-asf"),
            (padded(&[0x00, 0x00, 0x01, 0xBA]), "video/mpeg"),
            (padded(&[0x00, 0x00, 0x01, 0xB3]), "video/mpeg"),
            (padded(b"<!DOCTYPE html>"), "text/html"),
            (padded(b"<html lang=en>"), "text/html"),
            (padded(b"<?xml version"), "application/xml"),
            (padded(b"<svg xmlns"), "image/svg+xml"),
            (padded(b"{\"key\": 1}"), "application/json"),
            (padded(b"[1, 2, 3]"), "application/json"),
        ];

        for (bytes, expected) in cases {
            assert_eq!(sniff(&bytes), Some(expected), "prefix {:02X?}", &bytes[..8]);
        }
    }

    #[test]
    fn test_ftyp_brands_resolve() {
        assert_eq!(sniff(&ftyp(b"avif")), Some("image/avif"));
        assert_eq!(sniff(&ftyp(b"heic")), Some("image/heic"));
        assert_eq!(sniff(&ftyp(b"mif1")), Some("image/heif"));
        assert_eq!(sniff(&ftyp(b"3gp5")), Some("video/3gpp"));
        assert_eq!(sniff(&ftyp(b"isom")), Some("video/mp4"));
        assert_eq!(sniff(&ftyp(b"qt  ")), Some("video/mp4"));
        assert_eq!(sniff(&ftyp(b"zzzz")), Some("video/mp4"));
    }

    #[test]
    fn test_mpeg_start_code_requires_slice_range() {
        assert_eq!(sniff(&padded(&[0x00, 0x00, 0x01, 0xC0])), None);
        assert_eq!(sniff(&padded(&[0x00, 0x00, 0x01, 0xAF])), None);
    }

    #[test]
    fn test_unrecognised_markup_is_not_matched() {
        assert_eq!(sniff(&padded(b"<body>")), None);
        assert_eq!(sniff(&padded(b"plain text here")), None);
    }

    #[tokio::test]
    async fn test_short_input_returns_fallback_unchanged() {
        let mut cursor = Cursor::new(b"\x89PNG\r\n\x1a\n".to_vec());
        assert_eq!(detect(&mut cursor, Some("image/x-custom")).await, "image/x-custom");
        assert_eq!(detect(&mut cursor, None).await, OCTET_STREAM);
    }

    #[tokio::test]
    async fn test_unknown_content_returns_fallback() {
        let mut cursor = Cursor::new(padded(b"just some text"));
        assert_eq!(detect(&mut cursor, Some("text/plain")).await, "text/plain");
        assert_eq!(detect(&mut cursor, None).await, OCTET_STREAM);
    }

    #[tokio::test]
    async fn test_detection_rewinds_the_reader() {
        let data = padded(&[0xFF, 0xD8, 0xFF]);
        let mut cursor = Cursor::new(data.clone());
        cursor.set_position(12);

        assert_eq!(detect(&mut cursor, Some("application/octet-stream")).await, "image/jpeg");
        assert_eq!(cursor.position(), 0);

        let mut all = Vec::new();
        cursor.read_to_end(&mut all).await.unwrap();
        assert_eq!(all, data);
    }

    #[tokio::test]
    async fn test_detect_file_missing_path_falls_back() {
        let dir = tempfile::TempDir::new().unwrap();
        let missing = dir.path().join("missing.bin");
        assert_eq!(detect_file(&missing, Some("video/mp4")).await, "video/mp4");
    }
}
