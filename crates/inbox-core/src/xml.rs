//! XML well-formedness checking.
//!
//! Parses a byte buffer with `quick-xml` and certifies that it is a single,
//! balanced XML document. The reader never resolves external entities, never
//! loads a DTD and never touches the network or the filesystem: a DOCTYPE is
//! accepted as an opaque token and only the five predefined entities and
//! character references are understood.
//!
//! Input is UTF-8 unless the declaration names another single-byte encoding,
//! or UTF-16 when the buffer opens with a UTF-16 byte order mark.

use quick_xml::events::{BytesStart, BytesText, Event};
use quick_xml::Reader;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;

/// Outcome of a single well-formedness check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct XmlValidation {
    pub ok: bool,
    /// Human-readable summary; on failure it carries the parser's complaint
    /// and the line/column where it was detected.
    pub detail: String,
    /// Name of the root element when the document is well-formed.
    pub root: Option<String>,
}

/// Stateless XML well-formedness validator.
#[derive(Debug, Clone, Copy, Default)]
pub struct XmlValidator;

impl XmlValidator {
    /// Check `content` and report the result. Never panics; every parse
    /// failure is reported through the returned value.
    pub fn validate(content: &[u8]) -> XmlValidation {
        let transcoded = match decode_utf16(content) {
            Ok(transcoded) => transcoded,
            Err(err) => return failure(content, err),
        };
        let (bytes, utf16) = match &transcoded {
            Some(text) => (text.as_bytes(), true),
            None => (content, false),
        };
        match check_document(bytes, utf16) {
            Ok(root) => XmlValidation {
                ok: true,
                detail: format!("Well-formed XML document (root element <{}>)", root),
                root: Some(root),
            },
            Err(err) => failure(bytes, err),
        }
    }
}

fn failure(content: &[u8], err: XmlError) -> XmlValidation {
    let (line, column) = line_col(content, err.offset);
    XmlValidation {
        ok: false,
        detail: format!("XML error at line {}, column {}: {}", line, column, err.reason),
        root: None,
    }
}

// ── Parser ───────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
#[error("{reason}")]
struct XmlError {
    reason: String,
    offset: usize,
}

impl XmlError {
    fn at(offset: usize, reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            offset,
        }
    }
}

/// Decode a document that starts with a UTF-16 byte order mark. Offsets in
/// later errors refer to the UTF-8 re-encoding.
fn decode_utf16(content: &[u8]) -> Result<Option<String>, XmlError> {
    let (body, little_endian) = if let Some(body) = content.strip_prefix(b"\xFF\xFE") {
        (body, true)
    } else if let Some(body) = content.strip_prefix(b"\xFE\xFF") {
        (body, false)
    } else {
        return Ok(None);
    };
    if body.len() % 2 != 0 {
        return Err(XmlError::at(content.len(), "truncated UTF-16 document"));
    }
    let units = body.chunks_exact(2).map(|pair| {
        if little_endian {
            u16::from_le_bytes([pair[0], pair[1]])
        } else {
            u16::from_be_bytes([pair[0], pair[1]])
        }
    });
    char::decode_utf16(units)
        .collect::<Result<String, _>>()
        .map(Some)
        .map_err(|_| XmlError::at(0, "document is not valid UTF-16"))
}

fn check_document(content: &[u8], utf16: bool) -> Result<String, XmlError> {
    if content.iter().all(|b| b.is_ascii_whitespace()) {
        return Err(XmlError::at(0, "document is empty"));
    }
    if let Some(at) = content
        .iter()
        .position(|&b| b < 0x20 && !matches!(b, b'\t' | b'\n' | b'\r'))
    {
        return Err(invalid_char(at, u32::from(content[at])));
    }

    let mut reader = Reader::from_reader(content);
    // End-tag matching is done against our own stack so the report names both tags.
    reader.config_mut().check_end_names = false;

    let mut stack: Vec<String> = Vec::new();
    let mut root: Option<String> = None;
    let mut declared_encoding: Option<String> = None;
    let mut has_doctype = false;
    let mut first_event = true;
    let mut encoding_checked = false;

    loop {
        let event = match reader.read_event() {
            Ok(event) => event,
            Err(e) => {
                return Err(XmlError::at(reader.buffer_position() as usize, e.to_string()));
            }
        };
        let pos = reader.buffer_position() as usize;
        let was_first = first_event;
        first_event = false;

        // The declaration, if any, is the first event; everything after it is
        // decoded according to the declared encoding.
        if !encoding_checked && !matches!(event, Event::Decl(_)) {
            encoding_checked = true;
            if utf16 || is_utf8_label(declared_encoding.as_deref()) {
                let text = std::str::from_utf8(content).map_err(|e| {
                    XmlError::at(e.valid_up_to(), "document is not valid UTF-8")
                })?;
                if let Some((at, c)) = first_invalid_char(text) {
                    return Err(invalid_char(at, c as u32));
                }
            }
        }
        let check_entities =
            !has_doctype && (utf16 || is_utf8_label(declared_encoding.as_deref()));

        match event {
            Event::Decl(decl) => {
                if !was_first {
                    return Err(XmlError::at(
                        pos,
                        "XML declaration is only allowed at the start of the document",
                    ));
                }
                if let Some(Ok(enc)) = decl.encoding() {
                    declared_encoding = Some(String::from_utf8_lossy(&enc).to_string());
                }
            }
            Event::DocType(_) => {
                if root.is_some() {
                    return Err(XmlError::at(
                        pos,
                        "DOCTYPE declaration must precede the root element",
                    ));
                }
                has_doctype = true;
            }
            Event::Start(start) => {
                let name = open_element(&start, &stack, &root, check_entities, pos)?;
                if stack.is_empty() {
                    root = Some(name.clone());
                }
                stack.push(name);
            }
            Event::Empty(start) => {
                let name = open_element(&start, &stack, &root, check_entities, pos)?;
                if stack.is_empty() {
                    root = Some(name);
                }
            }
            Event::End(end) => {
                let found = String::from_utf8_lossy(end.name().as_ref()).to_string();
                match stack.pop() {
                    Some(expected) if expected == found => {}
                    Some(expected) => {
                        return Err(XmlError::at(
                            pos,
                            format!(
                                "mismatched end tag: expected </{}>, found </{}>",
                                expected, found
                            ),
                        ));
                    }
                    None => {
                        return Err(XmlError::at(
                            pos,
                            format!("unmatched end tag </{}>", found),
                        ));
                    }
                }
            }
            Event::Text(text) => {
                if stack.is_empty() {
                    if !is_blank(&text) {
                        return Err(XmlError::at(
                            pos,
                            "text content outside the root element",
                        ));
                    }
                } else {
                    if text.windows(3).any(|w| w == b"]]>") {
                        return Err(XmlError::at(
                            pos,
                            "']]>' is not allowed in character data",
                        ));
                    }
                    if check_entities {
                        check_text_entities(&text, pos)?;
                    }
                }
            }
            Event::CData(_) => {
                if stack.is_empty() {
                    return Err(XmlError::at(pos, "CDATA section outside the root element"));
                }
            }
            Event::Comment(comment) => {
                if comment.windows(2).any(|w| w == b"--") || comment.ends_with(b"-") {
                    return Err(XmlError::at(pos, "'--' is not allowed inside a comment"));
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if let Some(open) = stack.last() {
        return Err(XmlError::at(
            content.len(),
            format!("unexpected end of document: element <{}> is not closed", open),
        ));
    }

    root.ok_or_else(|| XmlError::at(content.len(), "document has no root element"))
}

/// Validate a start (or empty) tag and return its name.
fn open_element(
    start: &BytesStart<'_>,
    stack: &[String],
    root: &Option<String>,
    check_entities: bool,
    pos: usize,
) -> Result<String, XmlError> {
    let name = String::from_utf8_lossy(start.name().as_ref()).to_string();
    if !is_xml_name(&name) {
        return Err(XmlError::at(pos, format!("invalid element name '{}'", name)));
    }

    if stack.is_empty() {
        if let Some(existing) = root {
            return Err(XmlError::at(
                pos,
                format!(
                    "multiple root elements: <{}> follows the root element <{}>",
                    name, existing
                ),
            ));
        }
    }

    for attr in start.attributes() {
        let attr = attr.map_err(|e| XmlError::at(pos, format!("malformed attribute: {}", e)))?;
        let key = String::from_utf8_lossy(attr.key.as_ref());
        if !is_xml_name(&key) {
            return Err(XmlError::at(pos, format!("invalid attribute name '{}'", key)));
        }
        if attr.value.contains(&b'<') {
            return Err(XmlError::at(
                pos,
                format!("'<' is not allowed in the value of attribute '{}'", key),
            ));
        }
        if check_entities {
            let value = attr
                .unescape_value()
                .map_err(|e| XmlError::at(pos, format!("bad attribute value: {}", e)))?;
            if let Some((_, c)) = first_invalid_char(&value) {
                return Err(invalid_char(pos, c as u32));
            }
        }
    }

    Ok(name)
}

fn check_text_entities(text: &BytesText<'_>, pos: usize) -> Result<(), XmlError> {
    let text = text
        .unescape()
        .map_err(|e| XmlError::at(pos, format!("bad character data: {}", e)))?;
    match first_invalid_char(&text) {
        Some((_, c)) => Err(invalid_char(pos, c as u32)),
        None => Ok(()),
    }
}

/// First character outside the XML `Char` production, with its byte offset.
fn first_invalid_char(text: &str) -> Option<(usize, char)> {
    text.char_indices().find(|&(_, c)| !is_xml_char(c))
}

fn invalid_char(offset: usize, code: u32) -> XmlError {
    XmlError::at(offset, format!("invalid character U+{:04X}", code))
}

fn is_xml_char(c: char) -> bool {
    matches!(c,
        '\t' | '\n' | '\r'
        | '\u{20}'..='\u{D7FF}'
        | '\u{E000}'..='\u{FFFD}'
        | '\u{10000}'..='\u{10FFFF}')
}

fn is_name_start_char(c: char) -> bool {
    matches!(c,
        ':' | '_' | 'A'..='Z' | 'a'..='z'
        | '\u{C0}'..='\u{D6}'
        | '\u{D8}'..='\u{F6}'
        | '\u{F8}'..='\u{2FF}'
        | '\u{370}'..='\u{37D}'
        | '\u{37F}'..='\u{1FFF}'
        | '\u{200C}'..='\u{200D}'
        | '\u{2070}'..='\u{218F}'
        | '\u{2C00}'..='\u{2FEF}'
        | '\u{3001}'..='\u{D7FF}'
        | '\u{F900}'..='\u{FDCF}'
        | '\u{FDF0}'..='\u{FFFD}'
        | '\u{10000}'..='\u{EFFFF}')
}

fn is_name_char(c: char) -> bool {
    is_name_start_char(c)
        || matches!(c,
            '-' | '.' | '0'..='9' | '\u{B7}'
            | '\u{300}'..='\u{36F}'
            | '\u{203F}'..='\u{2040}')
}

/// XML `Name`: a name-start character followed by name characters.
fn is_xml_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => is_name_start_char(first) && chars.all(is_name_char),
        None => false,
    }
}

fn is_blank(text: &BytesText<'_>) -> bool {
    let bytes: &[u8] = text;
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    bytes.iter().all(|b| b.is_ascii_whitespace())
}

fn is_utf8_label(label: Option<&str>) -> bool {
    match label {
        None => true,
        Some(l) => {
            let l = l.trim().to_ascii_lowercase();
            l == "utf-8" || l == "utf8"
        }
    }
}

/// Translate a byte offset into a 1-based (line, column) pair.
fn line_col(content: &[u8], offset: usize) -> (usize, usize) {
    let offset = offset.min(content.len());
    let before = &content[..offset];
    let line = before.iter().filter(|&&b| b == b'\n').count() + 1;
    let column = match before.iter().rposition(|&b| b == b'\n') {
        Some(nl) => offset - nl,
        None => offset + 1,
    };
    (line, column)
}

// ── Preview ──────────────────────────────────────────────────────────────────

/// First `max_chars` characters of `content`, lossily decoded, with `...`
/// appended when the document is longer.
pub fn preview(content: &[u8], max_chars: usize) -> String {
    let text: Cow<'_, str> = String::from_utf8_lossy(content);
    let mut chars = text.chars();
    let head: String = chars.by_ref().take(max_chars).collect();
    if chars.next().is_some() {
        format!("{}...", head)
    } else {
        head
    }
}
