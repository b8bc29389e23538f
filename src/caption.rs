//! Photo captions stored in image metadata.
//!
//! JPEG captions live in the EXIF `UserComment` (with `ImageDescription` as a
//! read-only fallback); PNG captions live in `Comment`/`Description` text
//! chunks. Writes splice the metadata into the existing file bytes, so pixel
//! data is never re-encoded.

use std::fs;
use std::io::{BufReader, Cursor};
use std::path::Path;

use exif::experimental::Writer;
use exif::{Field, In, Tag, Value};
use png::text_metadata::{EncodableTextChunk, ITXtChunk};
use tracing::{debug, warn};

use crate::error::Error;

const ASCII_PREFIX: &[u8] = b"ASCII\0\0\0";
const UNICODE_PREFIX: &[u8] = b"UNICODE\0";
const UNDEFINED_PREFIX: &[u8] = &[0; 8];

const EXIF_HEADER: &[u8] = b"Exif\0\0";
const PNG_SIGNATURE: &[u8] = &[0x89, b'P', b'N', b'G', b'\r', b'\n', 0x1A, b'\n'];
/// Text chunk keywords checked, in order, when reading a PNG caption.
const PNG_CAPTION_KEYS: &[&str] = &["Comment", "Description", "caption"];
/// Keywords written for a PNG caption.
const PNG_WRITTEN_KEYS: &[&str] = &["Comment", "Description"];

const APP0: u8 = 0xE0;
const APP1: u8 = 0xE1;
const SOS: u8 = 0xDA;
const EOI: u8 = 0xD9;

/// Read the caption of an image: PNG text chunks, then EXIF `UserComment`,
/// then `ImageDescription`.
pub fn read_caption(path: &Path) -> Option<String> {
    if is_png_path(path) {
        if let Some(text) = png_text_caption(path) {
            return Some(text);
        }
    }
    exif_caption(path)
}

fn is_png_path(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("png"))
}

fn png_text_caption(path: &Path) -> Option<String> {
    let file = fs::File::open(path).ok()?;
    let reader = match png::Decoder::new(BufReader::new(file)).read_info() {
        Ok(reader) => reader,
        Err(err) => {
            debug!(path = %path.display(), error = %err, "unreadable png header");
            return None;
        }
    };
    let info = reader.info();
    PNG_CAPTION_KEYS.iter().find_map(|key| {
        let latin1 = info
            .uncompressed_latin1_text
            .iter()
            .filter(|chunk| chunk.keyword == *key)
            .map(|chunk| chunk.text.clone());
        let compressed = info
            .compressed_latin1_text
            .iter()
            .filter(|chunk| chunk.keyword == *key)
            .filter_map(|chunk| chunk.get_text().ok());
        let utf8 = info
            .utf8_text
            .iter()
            .filter(|chunk| chunk.keyword == *key)
            .filter_map(|chunk| chunk.get_text().ok());
        latin1
            .chain(compressed)
            .chain(utf8)
            .map(|text| sanitize_caption(&text))
            .find(|text| !text.is_empty())
    })
}

fn exif_caption(path: &Path) -> Option<String> {
    let f = fs::File::open(path).ok()?;
    let mut buf = BufReader::new(f);
    let exif = match exif::Reader::new().read_from_container(&mut buf) {
        Ok(exif) => exif,
        Err(err) => {
            debug!(path = %path.display(), error = %err, "no exif data");
            return None;
        }
    };

    let comment = exif
        .get_field(Tag::UserComment, In::PRIMARY)
        .and_then(|field| match &field.value {
            Value::Undefined(bytes, _) => decode_user_comment(bytes),
            Value::Ascii(parts) => parts
                .first()
                .map(|p| sanitize_caption(&String::from_utf8_lossy(p)))
                .filter(|t| !t.is_empty()),
            _ => None,
        });
    if comment.is_some() {
        return comment;
    }

    let field = exif.get_field(Tag::ImageDescription, In::PRIMARY)?;
    let Value::Ascii(parts) = &field.value else {
        return None;
    };
    let text = parts
        .iter()
        .map(|p| String::from_utf8_lossy(p).into_owned())
        .collect::<Vec<_>>()
        .join(" ");
    let text = sanitize_caption(&text);
    (!text.is_empty()).then_some(text)
}

/// Store `caption` in the image at `path`, replacing any previous caption.
/// An empty caption removes it. Only JPEG and PNG files are supported.
pub fn write_caption(path: &Path, caption: &str) -> Result<(), Error> {
    let caption = sanitize_caption(caption);
    let data = fs::read(path)?;
    let updated = if data.starts_with(&[0xFF, 0xD8]) {
        jpeg_with_caption(&data, &caption)?
    } else if data.starts_with(PNG_SIGNATURE) {
        png_with_caption(&data, &caption)?
    } else {
        return Err(Error::InvalidUpload(
            "Captions can only be stored in JPEG and PNG files".into(),
        ));
    };
    replace_file(path, &updated)?;
    debug!(path = %path.display(), chars = caption.chars().count(), "caption written");
    Ok(())
}

/// Write through a sibling temp file so a failed write never truncates the photo.
fn replace_file(path: &Path, bytes: &[u8]) -> Result<(), Error> {
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| Error::NotFound(format!("{} has no file name", path.display())))?;
    let tmp = path.with_file_name(format!(".{name}.caption-tmp"));
    fs::write(&tmp, bytes)?;
    if let Err(err) = fs::rename(&tmp, path) {
        let _ = fs::remove_file(&tmp);
        return Err(err.into());
    }
    Ok(())
}

fn jpeg_with_caption(jpeg: &[u8], caption: &str) -> Result<Vec<u8>, Error> {
    let existing = exif::get_exif_attr_from_jpeg(&mut Cursor::new(jpeg))
        .ok()
        .and_then(|raw| exif::Reader::new().read_raw(raw).ok());
    let little_endian = existing.as_ref().is_none_or(|e| e.little_endian());
    let mut kept: Vec<Field> = existing
        .iter()
        .flat_map(|e| e.fields())
        // the thumbnail IFD would need its JPEG bytes re-attached; drop it
        .filter(|f| f.ifd_num == In::PRIMARY)
        .filter(|f| {
            !matches!(
                f.tag,
                Tag::UserComment | Tag::ExifIFDPointer | Tag::GPSInfoIFDPointer | Tag::InteropIFDPointer
            )
        })
        .cloned()
        .collect();
    if !caption.is_empty() {
        let mut comment = ASCII_PREFIX.to_vec();
        comment.extend_from_slice(caption.as_bytes());
        kept.push(Field {
            tag: Tag::UserComment,
            ifd_num: In::PRIMARY,
            value: Value::Undefined(comment, 0),
        });
    }
    if kept.is_empty() {
        return splice_jpeg_exif(jpeg, None);
    }
    let tiff = match encode_exif(&kept, little_endian) {
        Ok(tiff) => tiff,
        Err(err) => {
            // unusual existing tags; keep only what we can encode
            warn!(error = %err, "could not re-encode existing exif; keeping the caption only");
            let caption_only: Vec<Field> = kept
                .into_iter()
                .filter(|f| f.tag == Tag::UserComment)
                .collect();
            if caption_only.is_empty() {
                return splice_jpeg_exif(jpeg, None);
            }
            encode_exif(&caption_only, little_endian)
                .map_err(|err| Error::Caption(err.to_string()))?
        }
    };
    splice_jpeg_exif(jpeg, Some(&tiff))
}

fn encode_exif(fields: &[Field], little_endian: bool) -> Result<Vec<u8>, exif::Error> {
    let mut writer = Writer::new();
    for field in fields {
        writer.push_field(field);
    }
    let mut out = Cursor::new(Vec::new());
    writer.write(&mut out, little_endian)?;
    Ok(out.into_inner())
}

/// Rebuild the JPEG header: every EXIF APP1 segment is dropped and `tiff`, if
/// any, is inserted after the leading APP0 (JFIF) segments.
fn splice_jpeg_exif(jpeg: &[u8], tiff: Option<&[u8]>) -> Result<Vec<u8>, Error> {
    let segment = match tiff {
        Some(tiff) => {
            let len = u16::try_from(2 + EXIF_HEADER.len() + tiff.len())
                .map_err(|_| Error::Caption("EXIF block exceeds 64 KiB".into()))?;
            let mut seg = vec![0xFF, APP1];
            seg.extend_from_slice(&len.to_be_bytes());
            seg.extend_from_slice(EXIF_HEADER);
            seg.extend_from_slice(tiff);
            seg
        }
        None => Vec::new(),
    };

    let mut out = Vec::with_capacity(jpeg.len() + segment.len());
    out.extend_from_slice(&jpeg[..2]);
    let mut pos = 2;
    let mut inserted = false;
    while pos + 4 <= jpeg.len() && jpeg[pos] == 0xFF {
        let marker = jpeg[pos + 1];
        if marker == 0xFF {
            // fill byte
            pos += 1;
            continue;
        }
        if marker == SOS || marker == EOI {
            break;
        }
        let len = usize::from(u16::from_be_bytes([jpeg[pos + 2], jpeg[pos + 3]]));
        let end = pos + 2 + len;
        if len < 2 || end > jpeg.len() {
            return Err(Error::Caption("truncated JPEG segment".into()));
        }
        if marker != APP0 && !inserted {
            out.extend_from_slice(&segment);
            inserted = true;
        }
        let is_exif = marker == APP1 && jpeg[pos + 4..end].starts_with(EXIF_HEADER);
        if !is_exif {
            out.extend_from_slice(&jpeg[pos..end]);
        }
        pos = end;
    }
    if !inserted {
        out.extend_from_slice(&segment);
    }
    out.extend_from_slice(&jpeg[pos..]);
    Ok(out)
}

/// Copy the PNG chunk by chunk, dropping old caption text chunks and adding
/// fresh iTXt ones ahead of the first IDAT.
fn png_with_caption(data: &[u8], caption: &str) -> Result<Vec<u8>, Error> {
    let mut out = Vec::with_capacity(data.len() + 2 * caption.len() + 64);
    out.extend_from_slice(PNG_SIGNATURE);
    let mut pos = PNG_SIGNATURE.len();
    let mut inserted = false;
    while pos + 12 <= data.len() {
        let len = u32::from_be_bytes([data[pos], data[pos + 1], data[pos + 2], data[pos + 3]]);
        let kind = [data[pos + 4], data[pos + 5], data[pos + 6], data[pos + 7]];
        let end = usize::try_from(len)
            .ok()
            .and_then(|len| (pos + 12).checked_add(len))
            .filter(|end| *end <= data.len())
            .ok_or_else(|| Error::Caption("truncated PNG chunk".into()))?;
        if !inserted && matches!(&kind, b"IDAT" | b"IEND") {
            if !caption.is_empty() {
                for key in PNG_WRITTEN_KEYS {
                    ITXtChunk::new(*key, caption)
                        .encode(&mut out)
                        .map_err(|err| Error::Caption(err.to_string()))?;
                }
            }
            inserted = true;
        }
        let body = &data[pos + 8..end - 4];
        let is_caption = matches!(&kind, b"tEXt" | b"zTXt" | b"iTXt") && is_caption_keyword(body);
        if !is_caption {
            out.extend_from_slice(&data[pos..end]);
        }
        pos = end;
    }
    out.extend_from_slice(&data[pos..]);
    Ok(out)
}

fn is_caption_keyword(body: &[u8]) -> bool {
    let keyword = body.split(|b| *b == 0).next().unwrap_or_default();
    PNG_CAPTION_KEYS.iter().any(|key| key.as_bytes() == keyword)
}

/// Decode an EXIF `UserComment`, which carries an 8-byte character-code
/// prefix ahead of the text.
pub fn decode_user_comment(bytes: &[u8]) -> Option<String> {
    let text = if let Some(rest) = bytes.strip_prefix(UNICODE_PREFIX) {
        decode_utf16(rest)
    } else if let Some(rest) = bytes.strip_prefix(ASCII_PREFIX) {
        String::from_utf8_lossy(rest).into_owned()
    } else if let Some(rest) = bytes.strip_prefix(UNDEFINED_PREFIX) {
        String::from_utf8_lossy(rest).into_owned()
    } else {
        String::from_utf8_lossy(bytes).into_owned()
    };
    let text = sanitize_caption(&text);
    (!text.is_empty()).then_some(text)
}

fn decode_utf16(bytes: &[u8]) -> String {
    let (bytes, big_endian) = match bytes {
        [0xFE, 0xFF, rest @ ..] => (rest, true),
        [0xFF, 0xFE, rest @ ..] => (rest, false),
        _ => (bytes, false),
    };
    let units = bytes.chunks_exact(2).map(|pair| {
        if big_endian {
            u16::from_be_bytes([pair[0], pair[1]])
        } else {
            u16::from_le_bytes([pair[0], pair[1]])
        }
    });
    char::decode_utf16(units)
        .map(|c| c.unwrap_or(char::REPLACEMENT_CHARACTER))
        .collect()
}

/// Drop control characters (NULs included) and surrounding whitespace.
pub fn sanitize_caption(text: &str) -> String {
    text.chars()
        .filter(|c| !c.is_control())
        .collect::<String>()
        .trim()
        .to_string()
}
