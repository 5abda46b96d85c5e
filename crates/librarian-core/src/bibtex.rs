//! BibTeX reading and writing
//!
//! A small nom-based parser for the metadata files kept beside each archived
//! document. It handles:
//! - braced, quoted, numeric and macro field values
//! - string concatenation with `#`
//! - `@string`, `@preamble` and `@comment` blocks
//! - nested braces in field values
//!
//! Entries are parsed leniently: once the `@type{key,` header is read the
//! entry is kept even if its field list is cut short, so the cite key can
//! always be recovered from a damaged file.

use nom::{
    branch::alt,
    bytes::complete::take_while1,
    character::complete::{char, multispace0},
    combinator::map,
    IResult,
};
use std::collections::HashMap;
use std::ops::Range;

/// A parsed BibTeX entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BibEntry {
    /// Entry type, lowercased (`article`, `inproceedings`, ...)
    pub entry_type: String,
    /// The cite key
    pub cite_key: String,
    /// Byte range of the cite key in the parsed text
    pub key_span: Range<usize>,
    /// Fields in file order, names lowercased
    pub fields: Vec<(String, String)>,
    /// False when the field list could not be read to its closing brace
    pub complete: bool,
}

impl BibEntry {
    /// Create an empty entry
    pub fn new(entry_type: impl Into<String>, cite_key: impl Into<String>) -> Self {
        Self {
            entry_type: entry_type.into().to_lowercase(),
            cite_key: cite_key.into(),
            key_span: 0..0,
            fields: Vec::new(),
            complete: true,
        }
    }

    /// Get a field value by name (case-insensitive)
    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Set a field, replacing an existing value or appending a new field
    pub fn set(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        match self
            .fields
            .iter_mut()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
        {
            Some(field) => field.1 = value,
            None => self.fields.push((name.to_lowercase(), value)),
        }
    }

    /// Remove a field if present
    pub fn remove(&mut self, name: &str) {
        self.fields.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
    }
}

/// Result of parsing a BibTeX text
#[derive(Debug, Clone, Default)]
pub struct BibParse {
    pub entries: Vec<BibEntry>,
    pub strings: HashMap<String, String>,
    /// Byte offsets of `@` blocks that could not be parsed
    pub errors: Vec<usize>,
}

/// Parse a BibTeX text
pub fn parse(input: &str) -> BibParse {
    let mut result = BibParse::default();
    let mut remaining = input;

    while !remaining.is_empty() {
        remaining = skip_whitespace_and_comments(remaining);
        if remaining.is_empty() {
            break;
        }

        if !remaining.starts_with('@') {
            match remaining.find('@') {
                Some(pos) => {
                    remaining = &remaining[pos..];
                    continue;
                }
                None => break,
            }
        }

        match parse_at_block(remaining, &result.strings) {
            Ok((rest, block)) => {
                match block {
                    AtBlock::Entry(mut entry, key) => {
                        let start = offset_in(input, key);
                        entry.key_span = start..start + key.len();
                        result.entries.push(entry);
                    }
                    AtBlock::String(name, value) => {
                        result.strings.insert(name.to_lowercase(), value);
                    }
                    AtBlock::Skipped => {}
                }
                remaining = rest;
            }
            Err(_) => {
                result.errors.push(offset_in(input, remaining));
                // Skip to the next block
                match remaining[1..].find('@') {
                    Some(pos) => remaining = &remaining[pos + 1..],
                    None => break,
                }
            }
        }
    }

    result
}

/// Return `input` with the cite key of `entry` replaced by `new_key`
///
/// Every other byte of the text is preserved. `entry` must come from
/// parsing this same `input`.
pub fn replace_cite_key(input: &str, entry: &BibEntry, new_key: &str) -> String {
    let span = entry.key_span.clone();
    let mut out = String::with_capacity(input.len() + new_key.len());
    out.push_str(&input[..span.start]);
    out.push_str(new_key);
    out.push_str(&input[span.end..]);
    out
}

/// Format an entry in canonical form
pub fn format_entry(entry: &BibEntry) -> String {
    let mut result = String::new();

    result.push('@');
    result.push_str(&entry.entry_type);
    result.push('{');
    result.push_str(&entry.cite_key);
    result.push_str(",\n");

    for (name, value) in &entry.fields {
        result.push_str("    ");
        result.push_str(name);
        result.push_str(" = ");
        if !value.is_empty() && value.chars().all(|c| c.is_ascii_digit()) {
            result.push_str(value);
        } else {
            result.push('{');
            result.push_str(value);
            result.push('}');
        }
        result.push_str(",\n");
    }

    result.push_str("}\n");
    result
}

/// A parsed `@` block
enum AtBlock<'a> {
    Entry(BibEntry, &'a str),
    String(String, String),
    Skipped,
}

/// Byte offset of `inner` within `outer`; `inner` must be a subslice
fn offset_in(outer: &str, inner: &str) -> usize {
    inner.as_ptr() as usize - outer.as_ptr() as usize
}

/// Skip whitespace and `%` line comments
fn skip_whitespace_and_comments(input: &str) -> &str {
    let mut rest = input;
    loop {
        rest = rest.trim_start();
        if rest.starts_with('%') {
            let end = rest.find('\n').unwrap_or(rest.len());
            rest = &rest[end..];
        } else {
            return rest;
        }
    }
}

fn parse_at_block<'a>(
    input: &'a str,
    strings: &HashMap<String, String>,
) -> IResult<&'a str, AtBlock<'a>> {
    let (rest, _) = char('@')(input)?;
    let (rest, _) = multispace0(rest)?;
    let (rest, block_type) = take_while1(|c: char| c.is_ascii_alphanumeric())(rest)?;

    match block_type.to_lowercase().as_str() {
        "string" => {
            let (rest, (name, value)) = parse_string_definition(rest, strings)?;
            Ok((rest, AtBlock::String(name, value)))
        }
        "preamble" | "comment" => {
            let (rest, _) = multispace0(rest)?;
            if rest.starts_with('{') {
                let (rest, _) = parse_braced_content(rest)?;
                Ok((rest, AtBlock::Skipped))
            } else {
                let end = rest.find('\n').unwrap_or(rest.len());
                Ok((&rest[end..], AtBlock::Skipped))
            }
        }
        _ => {
            let (rest, (entry, key)) = parse_entry_body(rest, block_type, strings)?;
            Ok((rest, AtBlock::Entry(entry, key)))
        }
    }
}

fn parse_string_definition<'a>(
    input: &'a str,
    strings: &HashMap<String, String>,
) -> IResult<&'a str, (String, String)> {
    let (rest, _) = multispace0(input)?;
    let (rest, _) = char('{')(rest)?;
    let (rest, (name, value)) = parse_single_field(rest, strings)?;
    let (rest, _) = multispace0(rest)?;
    let (rest, _) = char('}')(rest)?;

    Ok((rest, (name, value)))
}

fn is_key_char(c: char) -> bool {
    !c.is_whitespace() && !matches!(c, ',' | '{' | '}' | '(' | ')' | '"' | '#' | '%')
}

fn parse_entry_body<'a>(
    input: &'a str,
    entry_type: &str,
    strings: &HashMap<String, String>,
) -> IResult<&'a str, (BibEntry, &'a str)> {
    let (rest, _) = multispace0(input)?;
    let (rest, _) = alt((char('{'), char('(')))(rest)?;
    let (rest, _) = multispace0(rest)?;
    let (rest, key) = take_while1(is_key_char)(rest)?;
    let (rest, _) = multispace0(rest)?;

    let mut entry = BibEntry::new(entry_type, key);

    // An entry with no fields may close right after the key
    if let Some(closed) = rest.strip_prefix('}').or_else(|| rest.strip_prefix(')')) {
        return Ok((closed, (entry, key)));
    }

    let (rest, _) = char(',')(rest)?;
    let (rest, fields) = parse_fields(rest, strings)?;
    entry.fields = fields;

    let (rest, _) = multispace0(rest)?;
    let rest = match rest.strip_prefix('}').or_else(|| rest.strip_prefix(')')) {
        Some(closed) => closed,
        None => {
            // Field list is damaged; keep what was read and resync
            entry.complete = false;
            match rest.find("\n@") {
                Some(pos) => &rest[pos + 1..],
                None => "",
            }
        }
    };

    Ok((rest, (entry, key)))
}

fn parse_fields<'a>(
    input: &'a str,
    strings: &HashMap<String, String>,
) -> IResult<&'a str, Vec<(String, String)>> {
    let mut fields = Vec::new();
    let mut remaining = input;

    loop {
        let (rest, _) = multispace0(remaining)?;
        if rest.starts_with('}') || rest.starts_with(')') {
            return Ok((rest, fields));
        }

        match parse_single_field(rest, strings) {
            Ok((rest, field)) => {
                fields.push(field);
                let (rest, _) = multispace0(rest)?;
                remaining = rest.strip_prefix(',').unwrap_or(rest);
            }
            Err(_) => return Ok((rest, fields)),
        }
    }
}

fn parse_single_field<'a>(
    input: &'a str,
    strings: &HashMap<String, String>,
) -> IResult<&'a str, (String, String)> {
    let (rest, _) = multispace0(input)?;
    let (rest, name) =
        take_while1(|c: char| c.is_ascii_alphanumeric() || c == '_' || c == '-')(rest)?;
    let (rest, _) = multispace0(rest)?;
    let (rest, _) = char('=')(rest)?;
    let (rest, _) = multispace0(rest)?;
    let (rest, value) = parse_field_value(rest, strings)?;

    Ok((rest, (name.to_lowercase(), value)))
}

/// Parse a field value, following `#` concatenations
fn parse_field_value<'a>(
    input: &'a str,
    strings: &HashMap<String, String>,
) -> IResult<&'a str, String> {
    let mut result = String::new();
    let mut remaining = input;

    loop {
        let (rest, _) = multispace0(remaining)?;

        let (rest, part) = alt((
            parse_braced_value,
            parse_quoted_value,
            map(take_while1(|c: char| c.is_ascii_digit()), |s: &str| {
                s.to_string()
            }),
            map(
                take_while1(|c: char| c.is_ascii_alphanumeric() || c == '_' || c == '-'),
                |s: &str| {
                    strings
                        .get(&s.to_lowercase())
                        .cloned()
                        .unwrap_or_else(|| s.to_string())
                },
            ),
        ))(rest)?;

        result.push_str(&part);

        let (rest, _) = multispace0(rest)?;
        match rest.strip_prefix('#') {
            Some(stripped) => remaining = stripped,
            None => return Ok((rest, result)),
        }
    }
}

fn parse_braced_value(input: &str) -> IResult<&str, String> {
    let (rest, content) = parse_braced_content(input)?;
    Ok((rest, content[1..content.len() - 1].to_string()))
}

/// Match `{...}` including nested braces
fn parse_braced_content(input: &str) -> IResult<&str, &str> {
    if !input.starts_with('{') {
        return Err(char_error(input));
    }

    let bytes = input.as_bytes();
    let mut depth = 0usize;
    let mut pos = 0;

    while pos < bytes.len() {
        match bytes[pos] {
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Ok((&input[pos + 1..], &input[..pos + 1]));
                }
            }
            b'\\' => pos += 1,
            _ => {}
        }
        pos += 1;
    }

    Err(char_error(input))
}

fn parse_quoted_value(input: &str) -> IResult<&str, String> {
    if !input.starts_with('"') {
        return Err(char_error(input));
    }

    let mut depth = 0usize;
    let mut escaped = false;
    for (pos, c) in input.char_indices().skip(1) {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' => escaped = true,
            '"' if depth == 0 => return Ok((&input[pos + 1..], input[1..pos].to_string())),
            '{' => depth += 1,
            '}' => depth = depth.saturating_sub(1),
            _ => {}
        }
    }

    Err(char_error(input))
}

fn char_error(input: &str) -> nom::Err<nom::error::Error<&str>> {
    nom::Err::Error(nom::error::Error::new(input, nom::error::ErrorKind::Char))
}
