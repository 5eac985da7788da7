//! Record file codec.
//!
//! A record file is a TOML header fenced by `+++` lines, one blank line, then
//! the Markdown body:
//!
//! ```text
//! +++
//! id = "550e8400-e29b-41d4-a716-446655440000"
//! kind = "semantic"
//! namespace = "semantic/decisions"
//! title = "Use PostgreSQL"
//! +++
//!
//! Body text.
//! ```
//!
//! The header is handled by a [`HeaderStrategy`]:
//!
//! * [`StructuredHeader`] – the full `toml` parser, and a writer that keeps
//!   every string on one line.
//! * [`LineHeader`] – a line-oriented parser for the subset of TOML the engine
//!   itself writes.  It tolerates unquoted strings, duplicate keys (last one
//!   wins) and junk lines, so hand-edited files still load.
//!
//! [`CodecMode::Auto`] parses with the structured strategy and falls back to
//! the line strategy when the header is not valid TOML.
//!
//! # Example
//!
//! ```rust
//! use chrono::Utc;
//! use mnemo_memory::codec::RecordCodec;
//! use mnemo_types::{CognitiveType, Record};
//!
//! let codec = RecordCodec::default();
//! let record = Record::new(CognitiveType::Semantic, "decisions", "Use PostgreSQL", Utc::now())
//!     .with_body("We picked PostgreSQL.\n");
//! let text = codec.serialize(&record).unwrap();
//! assert!(text.starts_with("+++\n"));
//! assert_eq!(codec.parse(&text).unwrap(), record);
//! ```

use std::fmt::Write as _;
use std::sync::LazyLock;

use mnemo_types::{
    Citation, CodeRef, Decay, EntityBlock, Provenance, Record, RecordHeader, Relationship, Temporal,
};
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

/// Line that opens and closes the header block.
pub const HEADER_DELIMITER: &str = "+++";

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("record does not start with a `+++` header delimiter")]
    MissingHeader,
    #[error("record header is not closed by a `+++` line")]
    UnterminatedHeader,
    #[error("invalid record header: {0}")]
    Header(#[from] toml::de::Error),
    #[error("failed to serialize record header: {0}")]
    Serialize(#[from] toml::ser::Error),
}

// ─────────────────────────────────────────────────────────────────────────────
// Header strategies
// ─────────────────────────────────────────────────────────────────────────────

/// Converts between header text (without delimiters) and [`RecordHeader`].
///
/// Every implementation must round-trip its own output exactly.
pub trait HeaderStrategy: Send + Sync {
    fn name(&self) -> &'static str;
    fn parse(&self, text: &str) -> Result<RecordHeader, CodecError>;
    fn serialize(&self, header: &RecordHeader) -> Result<String, CodecError>;
}

/// Full TOML via the `toml` crate.
#[derive(Debug, Clone, Copy, Default)]
pub struct StructuredHeader;

impl HeaderStrategy for StructuredHeader {
    fn name(&self) -> &'static str {
        "structured"
    }

    fn parse(&self, text: &str) -> Result<RecordHeader, CodecError> {
        Ok(toml::from_str(text)?)
    }

    /// Writes every string as a single-line basic string, so no header line
    /// can ever read as a `+++` delimiter.
    fn serialize(&self, header: &RecordHeader) -> Result<String, CodecError> {
        let toml::Value::Table(table) = toml::Value::try_from(header)? else {
            return Err(CodecError::Serialize(serde::ser::Error::custom(
                "record header is not a table",
            )));
        };
        let mut out = String::new();
        emit_table(&mut out, &[], &table);
        Ok(out.trim_start_matches('\n').to_string())
    }
}

/// Plain keys first, then `[sub.tables]`, then `[[arrays.of.tables]]`.
fn emit_table(out: &mut String, path: &[String], table: &toml::Table) {
    let is_section = |value: &toml::Value| match value {
        toml::Value::Table(_) => true,
        toml::Value::Array(items) => is_table_array(items),
        _ => false,
    };
    for (key, value) in table.iter().filter(|&(_, v)| !is_section(v)) {
        let _ = writeln!(out, "{} = {}", bare_or_quoted_key(key), inline_value(value));
    }
    for (key, value) in table.iter().filter(|&(_, v)| is_section(v)) {
        let mut child = path.to_vec();
        child.push(bare_or_quoted_key(key));
        match value {
            toml::Value::Table(sub) => {
                let _ = writeln!(out, "\n[{}]", child.join("."));
                emit_table(out, &child, sub);
            }
            toml::Value::Array(items) => {
                for item in items.iter().filter_map(toml::Value::as_table) {
                    let _ = writeln!(out, "\n[[{}]]", child.join("."));
                    emit_table(out, &child, item);
                }
            }
            _ => {}
        }
    }
}

fn is_table_array(items: &[toml::Value]) -> bool {
    !items.is_empty() && items.iter().all(toml::Value::is_table)
}

fn inline_value(value: &toml::Value) -> String {
    match value {
        toml::Value::String(s) => quote(s),
        toml::Value::Integer(i) => i.to_string(),
        toml::Value::Float(f) => format_float(*f),
        toml::Value::Boolean(b) => b.to_string(),
        toml::Value::Datetime(d) => d.to_string(),
        toml::Value::Array(items) => {
            let items: Vec<String> = items.iter().map(inline_value).collect();
            format!("[{}]", items.join(", "))
        }
        toml::Value::Table(table) if table.is_empty() => "{}".to_string(),
        toml::Value::Table(table) => {
            let pairs: Vec<String> = table
                .iter()
                .map(|(k, v)| format!("{} = {}", bare_or_quoted_key(k), inline_value(v)))
                .collect();
            format!("{{ {} }}", pairs.join(", "))
        }
    }
}

/// Lenient line-oriented header parser.
#[derive(Debug, Clone, Copy, Default)]
pub struct LineHeader;

static TABLE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\[\s*([A-Za-z0-9_.-]+)\s*\]$").expect("table pattern is valid"));
static ARRAY_TABLE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\[\[\s*([A-Za-z0-9_.-]+)\s*\]\]$").expect("array table pattern is valid")
});
static KEY_VALUE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^("[^"]*"|'[^']*'|[A-Za-z0-9_-]+)\s*=\s*(.*)$"#).expect("key/value pattern is valid")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Root,
    Temporal,
    Decay,
    Provenance,
    Entity,
    EntityFields,
    Citation,
    Relationship,
    CodeRef,
    Unknown,
}

#[derive(Debug, Clone, PartialEq)]
enum Value {
    Text(String),
    List(Vec<String>),
}

impl Value {
    fn into_text(self) -> String {
        match self {
            Value::Text(s) => s,
            Value::List(items) => items.join(", "),
        }
    }
}

impl HeaderStrategy for LineHeader {
    fn name(&self) -> &'static str {
        "line"
    }

    fn parse(&self, text: &str) -> Result<RecordHeader, CodecError> {
        let mut header = RecordHeader::default();
        let mut section = Section::Root;

        for (n, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if let Some(caps) = ARRAY_TABLE_RE.captures(line) {
                section = open_array_table(&mut header, &caps[1]);
                continue;
            }
            if let Some(caps) = TABLE_RE.captures(line) {
                section = open_table(&mut header, &caps[1]);
                continue;
            }
            let Some(caps) = KEY_VALUE_RE.captures(line) else {
                warn!(line = n + 1, content = line, "skipping unparseable header line");
                continue;
            };
            let key = unquote_key(&caps[1]);
            let value = parse_value(&caps[2]);
            if !assign(&mut header, section, &key, value) {
                debug!(line = n + 1, key = %key, "ignoring unknown header key");
            }
        }
        Ok(header)
    }

    fn serialize(&self, header: &RecordHeader) -> Result<String, CodecError> {
        let mut out = String::new();
        let h = header;
        for (key, value) in [
            ("id", &h.id),
            ("kind", &h.kind),
            ("namespace", &h.namespace),
            ("created", &h.created),
            ("modified", &h.modified),
            ("title", &h.title),
        ] {
            if !value.is_empty() {
                push_str(&mut out, key, value);
            }
        }
        if !h.tags.is_empty() {
            let items: Vec<String> = h.tags.iter().map(|t| quote(t)).collect();
            let _ = writeln!(out, "tags = [{}]", items.join(", "));
        }

        if let Some(t) = &h.temporal {
            out.push_str("\n[temporal]\n");
            push_nonempty(&mut out, "valid_from", &t.valid_from);
            push_nonempty(&mut out, "recorded_at", &t.recorded_at);
            if let Some(d) = &t.decay {
                out.push_str("\n[temporal.decay]\n");
                push_str(&mut out, "model", &d.model);
                push_opt(&mut out, "half_life", &d.half_life);
                push_float(&mut out, "strength", d.strength);
                push_opt(&mut out, "last_accessed", &d.last_accessed);
                push_opt(&mut out, "decayed_at", &d.decayed_at);
            }
        }
        if let Some(p) = &h.provenance {
            out.push_str("\n[provenance]\n");
            push_str(&mut out, "source_type", &p.source_type);
            push_nonempty(&mut out, "agent", &p.agent);
            push_float(&mut out, "confidence", p.confidence);
        }
        if let Some(e) = &h.entity {
            out.push_str("\n[entity]\n");
            push_str(&mut out, "type", &e.entity_type);
            if !e.fields.is_empty() {
                out.push_str("\n[entity.fields]\n");
                for (k, v) in &e.fields {
                    push_str(&mut out, &bare_or_quoted_key(k), v);
                }
            }
        }
        for c in &h.citations {
            out.push_str("\n[[citations]]\n");
            push_str(&mut out, "type", &c.citation_type);
            push_str(&mut out, "title", &c.title);
            push_str(&mut out, "url", &c.url);
            push_opt(&mut out, "author", &c.author);
            push_opt(&mut out, "date", &c.date);
            push_opt(&mut out, "accessed", &c.accessed);
            if let Some(r) = c.relevance {
                push_float(&mut out, "relevance", r);
            }
            push_opt(&mut out, "note", &c.note);
        }
        for r in &h.relationships {
            out.push_str("\n[[relationships]]\n");
            push_str(&mut out, "type", &r.relation);
            push_str(&mut out, "target", &r.target);
            push_opt(&mut out, "label", &r.label);
        }
        for r in &h.code_refs {
            out.push_str("\n[[code_refs]]\n");
            push_str(&mut out, "type", &r.ref_type);
            push_str(&mut out, "file", &r.file);
            let _ = writeln!(out, "line = {}", r.line);
        }
        Ok(out.trim_start_matches('\n').to_string())
    }
}

fn open_table(header: &mut RecordHeader, name: &str) -> Section {
    match name {
        "temporal" => {
            header.temporal.get_or_insert_with(Temporal::default);
            Section::Temporal
        }
        "temporal.decay" => {
            header
                .temporal
                .get_or_insert_with(Temporal::default)
                .decay
                .get_or_insert_with(Decay::default);
            Section::Decay
        }
        "provenance" => {
            header.provenance.get_or_insert_with(empty_provenance);
            Section::Provenance
        }
        "entity" => {
            header.entity.get_or_insert_with(EntityBlock::default);
            Section::Entity
        }
        "entity.fields" => {
            header.entity.get_or_insert_with(EntityBlock::default);
            Section::EntityFields
        }
        other => {
            warn!(table = other, "skipping unknown header table");
            Section::Unknown
        }
    }
}

fn open_array_table(header: &mut RecordHeader, name: &str) -> Section {
    match name {
        "citations" => {
            header.citations.push(Citation::default());
            Section::Citation
        }
        "relationships" => {
            header.relationships.push(Relationship {
                relation: String::new(),
                target: String::new(),
                label: None,
            });
            Section::Relationship
        }
        "code_refs" => {
            header.code_refs.push(CodeRef {
                ref_type: String::new(),
                file: String::new(),
                line: 0,
            });
            Section::CodeRef
        }
        other => {
            warn!(table = other, "skipping unknown header array");
            Section::Unknown
        }
    }
}

fn empty_provenance() -> Provenance {
    Provenance {
        source_type: String::new(),
        agent: String::new(),
        confidence: 1.0,
    }
}

/// Store `value` under `key` in `section`.  Returns `false` for keys the
/// header has no slot for.
fn assign(header: &mut RecordHeader, section: Section, key: &str, value: Value) -> bool {
    match section {
        Section::Root => {
            let slot = match key {
                "id" => &mut header.id,
                "kind" => &mut header.kind,
                "namespace" => &mut header.namespace,
                "created" => &mut header.created,
                "modified" => &mut header.modified,
                "title" => &mut header.title,
                "tags" => {
                    header.tags = match value {
                        Value::List(items) => items,
                        Value::Text(s) => split_list(&s),
                    };
                    return true;
                }
                _ => return false,
            };
            *slot = value.into_text();
        }
        Section::Temporal => {
            let t = header.temporal.get_or_insert_with(Temporal::default);
            match key {
                "valid_from" => t.valid_from = value.into_text(),
                "recorded_at" => t.recorded_at = value.into_text(),
                _ => return false,
            }
        }
        Section::Decay => {
            let d = header
                .temporal
                .get_or_insert_with(Temporal::default)
                .decay
                .get_or_insert_with(Decay::default);
            match key {
                "model" => d.model = value.into_text(),
                "half_life" => d.half_life = Some(value.into_text()),
                "strength" => return set_float(&mut d.strength, key, value),
                "last_accessed" => d.last_accessed = Some(value.into_text()),
                "decayed_at" => d.decayed_at = Some(value.into_text()),
                _ => return false,
            }
        }
        Section::Provenance => {
            let p = header.provenance.get_or_insert_with(empty_provenance);
            match key {
                "source_type" => p.source_type = value.into_text(),
                "agent" => p.agent = value.into_text(),
                "confidence" => return set_float(&mut p.confidence, key, value),
                _ => return false,
            }
        }
        Section::Entity => {
            let e = header.entity.get_or_insert_with(EntityBlock::default);
            match key {
                "type" => e.entity_type = value.into_text(),
                _ => return false,
            }
        }
        Section::EntityFields => {
            header
                .entity
                .get_or_insert_with(EntityBlock::default)
                .fields
                .insert(key.to_string(), value.into_text());
        }
        Section::Citation => {
            let Some(c) = header.citations.last_mut() else {
                return false;
            };
            match key {
                "type" => c.citation_type = value.into_text(),
                "title" => c.title = value.into_text(),
                "url" => c.url = value.into_text(),
                "author" => c.author = Some(value.into_text()),
                "date" => c.date = Some(value.into_text()),
                "accessed" => c.accessed = Some(value.into_text()),
                "note" => c.note = Some(value.into_text()),
                "relevance" => {
                    let mut r = 0.0;
                    if !set_float(&mut r, key, value) {
                        return false;
                    }
                    c.relevance = Some(r);
                }
                _ => return false,
            }
        }
        Section::Relationship => {
            let Some(r) = header.relationships.last_mut() else {
                return false;
            };
            match key {
                "type" => r.relation = value.into_text(),
                "target" => r.target = value.into_text(),
                "label" => r.label = Some(value.into_text()),
                _ => return false,
            }
        }
        Section::CodeRef => {
            let Some(r) = header.code_refs.last_mut() else {
                return false;
            };
            match key {
                "type" => r.ref_type = value.into_text(),
                "file" => r.file = value.into_text(),
                "line" => match value.into_text().parse() {
                    Ok(line) => r.line = line,
                    Err(_) => {
                        warn!(key, "code_refs line is not an integer");
                        return false;
                    }
                },
                _ => return false,
            }
        }
        Section::Unknown => return false,
    }
    true
}

fn set_float(slot: &mut f64, key: &str, value: Value) -> bool {
    let raw = value.into_text();
    match raw.parse::<f64>() {
        Ok(v) => {
            *slot = v;
            true
        }
        Err(_) => {
            warn!(key, value = %raw, "header value is not a number");
            false
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Value scanning
// ─────────────────────────────────────────────────────────────────────────────

fn unquote_key(raw: &str) -> String {
    raw.trim_matches(|c: char| c == '"' || c == '\'').to_string()
}

fn bare_or_quoted_key(key: &str) -> String {
    let bare = !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if bare { key.to_string() } else { quote(key) }
}

fn parse_value(raw: &str) -> Value {
    let raw = raw.trim();
    if let Some(inner) = raw.strip_prefix('[') {
        let mut items = Vec::new();
        let mut rest = inner;
        loop {
            rest = rest.trim_start_matches(|c: char| c.is_whitespace() || c == ',');
            if rest.is_empty() || rest.starts_with(']') {
                break;
            }
            let (item, tail) = scan_item(rest);
            if !item.is_empty() {
                items.push(item);
            }
            rest = tail;
        }
        return Value::List(items);
    }
    Value::Text(scan_item(raw).0)
}

/// Scan one string item (quoted or bare) off the front of `s`.
fn scan_item(s: &str) -> (String, &str) {
    if let Some(body) = s.strip_prefix('"') {
        return scan_basic(body);
    }
    if let Some(body) = s.strip_prefix('\'') {
        return match body.find('\'') {
            Some(end) => (body[..end].to_string(), &body[end + 1..]),
            None => (body.to_string(), ""),
        };
    }
    // Bare value: up to a list separator or a trailing comment.
    let end = s
        .find(|c: char| c == ',' || c == ']')
        .into_iter()
        .chain(s.find(" #"))
        .min()
        .unwrap_or(s.len());
    (s[..end].trim().to_string(), &s[end..])
}

fn scan_basic(body: &str) -> (String, &str) {
    let mut out = String::new();
    let mut chars = body.char_indices();
    while let Some((i, c)) = chars.next() {
        match c {
            '"' => return (out, &body[i + 1..]),
            '\\' => match chars.next() {
                Some((_, 'n')) => out.push('\n'),
                Some((_, 't')) => out.push('\t'),
                Some((_, 'r')) => out.push('\r'),
                Some((_, '"')) => out.push('"'),
                Some((_, '\\')) => out.push('\\'),
                Some((_, 'u')) => {
                    let hex: String = chars.by_ref().take(4).map(|(_, h)| h).collect();
                    if let Some(ch) = u32::from_str_radix(&hex, 16).ok().and_then(char::from_u32) {
                        out.push(ch);
                    }
                }
                Some((_, other)) => out.push(other),
                None => break,
            },
            other => out.push(other),
        }
    }
    (out, "")
}

fn split_list(s: &str) -> Vec<String> {
    s.split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            c if c.is_control() => {
                let _ = write!(out, "\\u{:04X}", c as u32);
            }
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

fn push_str(out: &mut String, key: &str, value: &str) {
    let _ = writeln!(out, "{key} = {}", quote(value));
}

fn push_nonempty(out: &mut String, key: &str, value: &str) {
    if !value.is_empty() {
        push_str(out, key, value);
    }
}

fn push_opt(out: &mut String, key: &str, value: &Option<String>) {
    if let Some(v) = value {
        push_str(out, key, v);
    }
}

fn push_float(out: &mut String, key: &str, value: f64) {
    let _ = writeln!(out, "{key} = {}", format_float(value));
}

/// TOML spelling of a float; `{:?}` is the shortest exact form but spells
/// the non-finite values `NaN` and `inf`.
fn format_float(value: f64) -> String {
    if value.is_nan() {
        "nan".to_string()
    } else if value == f64::INFINITY {
        "inf".to_string()
    } else if value == f64::NEG_INFINITY {
        "-inf".to_string()
    } else {
        format!("{value:?}")
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// RecordCodec
// ─────────────────────────────────────────────────────────────────────────────

/// Which [`HeaderStrategy`] a [`RecordCodec`] uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CodecMode {
    Structured,
    Line,
    /// Structured first, line parser on failure.
    #[default]
    Auto,
}

impl CodecMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            CodecMode::Structured => "structured",
            CodecMode::Line => "line",
            CodecMode::Auto => "auto",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "structured" => Some(CodecMode::Structured),
            "line" => Some(CodecMode::Line),
            "auto" => Some(CodecMode::Auto),
            _ => None,
        }
    }
}

/// Parses and serializes whole record files.  Pure: no I/O.
#[derive(Debug, Clone, Copy, Default)]
pub struct RecordCodec {
    mode: CodecMode,
}

impl RecordCodec {
    pub fn new(mode: CodecMode) -> Self {
        Self { mode }
    }

    pub fn mode(&self) -> CodecMode {
        self.mode
    }

    pub fn parse(&self, text: &str) -> Result<Record, CodecError> {
        let (header_text, body) = split_document(text)?;
        let header = match self.mode {
            CodecMode::Structured => StructuredHeader.parse(header_text)?,
            CodecMode::Line => LineHeader.parse(header_text)?,
            CodecMode::Auto => match StructuredHeader.parse(header_text) {
                Ok(header) => header,
                Err(e) => {
                    warn!(error = %e, "structured header parse failed, using line parser");
                    LineHeader.parse(header_text)?
                }
            },
        };
        Ok(Record {
            header,
            body: body.to_string(),
        })
    }

    pub fn serialize(&self, record: &Record) -> Result<String, CodecError> {
        let header = match self.mode {
            CodecMode::Line => LineHeader.serialize(&record.header)?,
            CodecMode::Structured => StructuredHeader.serialize(&record.header)?,
            CodecMode::Auto => match StructuredHeader.serialize(&record.header) {
                Ok(text) => text,
                Err(e) => {
                    warn!(error = %e, "structured header serialization failed, using line writer");
                    LineHeader.serialize(&record.header)?
                }
            },
        };
        let mut out = String::with_capacity(header.len() + record.body.len() + 16);
        out.push_str(HEADER_DELIMITER);
        out.push('\n');
        out.push_str(&header);
        if !header.is_empty() && !header.ends_with('\n') {
            out.push('\n');
        }
        out.push_str(HEADER_DELIMITER);
        out.push_str("\n\n");
        out.push_str(&record.body);
        Ok(out)
    }
}

/// Split a record file into header text and body.
///
/// The opening delimiter must be the first line.  The first following line
/// that is exactly `+++`, outside a multi-line string, closes the header;
/// exactly one newline after it is consumed as the separator, the rest is
/// the body verbatim.
pub fn split_document(text: &str) -> Result<(&str, &str), CodecError> {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    let rest = strip_delimiter_line(text).ok_or(CodecError::MissingHeader)?;

    let mut offset = 0;
    let mut open = None;
    for line in rest.split_inclusive('\n') {
        if open.is_none() && line.trim_end_matches(['\n', '\r']) == HEADER_DELIMITER {
            let header = &rest[..offset];
            let after = &rest[offset + line.len()..];
            let body = after
                .strip_prefix("\r\n")
                .or_else(|| after.strip_prefix('\n'))
                .unwrap_or(after);
            return Ok((header, body));
        }
        open = open_string_after(line, open);
        offset += line.len();
    }
    Err(CodecError::UnterminatedHeader)
}

/// A TOML multi-line string left open at the end of a header line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OpenString {
    Basic,
    Literal,
}

/// Which multi-line string, if any, is still open after `line`.
///
/// Single-line strings and comments end with their line; only `"""` and
/// `'''` strings carry over.
fn open_string_after(line: &str, mut open: Option<OpenString>) -> Option<OpenString> {
    let mut rest = line;
    loop {
        match open {
            Some(OpenString::Basic) => {
                let Some(end) = close_of_multiline_basic(rest) else {
                    return open;
                };
                rest = &rest[end..];
                open = None;
            }
            Some(OpenString::Literal) => {
                let Some(end) = rest.find("'''") else {
                    return open;
                };
                rest = rest[end + 3..].trim_start_matches('\'');
                open = None;
            }
            None => {
                let start = rest.find(['"', '\'', '#'])?;
                rest = &rest[start..];
                if rest.starts_with('#') {
                    return None;
                } else if let Some(tail) = rest.strip_prefix("\"\"\"") {
                    rest = tail;
                    open = Some(OpenString::Basic);
                } else if let Some(tail) = rest.strip_prefix("'''") {
                    rest = tail;
                    open = Some(OpenString::Literal);
                } else if let Some(tail) = rest.strip_prefix('"') {
                    rest = after_basic_string(tail);
                } else {
                    let tail = &rest[1..];
                    rest = tail.find('\'').map_or("", |end| &tail[end + 1..]);
                }
            }
        }
    }
}

/// Byte offset just past the `"""` closing a multi-line basic string.
fn close_of_multiline_basic(s: &str) -> Option<usize> {
    let mut chars = s.char_indices();
    while let Some((i, c)) = chars.next() {
        match c {
            '\\' => {
                chars.next();
            }
            '"' if s[i..].starts_with("\"\"\"") => {
                // Up to two quotes may sit right before the closing delimiter.
                let run = s[i..].len() - s[i..].trim_start_matches('"').len();
                return Some(i + run.min(5));
            }
            _ => {}
        }
    }
    None
}

/// Remainder of `s` after the closing quote of a single-line basic string.
fn after_basic_string(s: &str) -> &str {
    let mut chars = s.char_indices();
    while let Some((i, c)) = chars.next() {
        match c {
            '\\' => {
                chars.next();
            }
            '"' => return &s[i + 1..],
            _ => {}
        }
    }
    ""
}

fn strip_delimiter_line(text: &str) -> Option<&str> {
    let rest = text.strip_prefix(HEADER_DELIMITER)?;
    rest.strip_prefix("\r\n").or_else(|| rest.strip_prefix('\n'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use mnemo_types::CognitiveType;

    fn full_record() -> Record {
        let now = Utc.with_ymd_and_hms(2026, 1, 15, 10, 30, 0).unwrap();
        let mut r = Record::new(CognitiveType::Semantic, "decisions", "Use \"PostgreSQL\" for storage", now)
            .with_tags(["database", "architecture"])
            .with_body("# Decision\n\nWe use PostgreSQL.\n+++\nstill body\n");
        if let Some(t) = r.header.temporal.as_mut() {
            t.decay = Some(Decay {
                half_life: Some("P90D".into()),
                strength: 0.75,
                last_accessed: Some("2026-01-20T08:00:00Z".into()),
                ..Decay::default()
            });
        }
        r.header.provenance = Some(Provenance {
            source_type: "conversation".into(),
            agent: "assistant".into(),
            confidence: 0.9,
        });
        r.header.entity = Some(EntityBlock {
            entity_type: "technology".into(),
            fields: [("name".to_string(), "PostgreSQL".to_string())].into(),
        });
        r.header.citations.push(Citation {
            citation_type: "documentation".into(),
            title: "PostgreSQL docs".into(),
            url: "https://www.postgresql.org/docs/".into(),
            relevance: Some(0.8),
            note: Some("C:\\path\twith tab".into()),
            ..Citation::default()
        });
        r.header.relationships.push(Relationship {
            relation: "Supersedes".into(),
            target: "550e8400-e29b-41d4-a716-446655440000".into(),
            label: Some("old choice".into()),
        });
        r.header.code_refs.push(CodeRef {
            ref_type: "module".into(),
            file: "src/db.rs".into(),
            line: 42,
        });
        r
    }

    // ── round-trip ───────────────────────────────────────────────────────────

    #[test]
    fn structured_round_trip_is_exact() {
        let codec = RecordCodec::new(CodecMode::Structured);
        let rec = full_record();
        let text = codec.serialize(&rec).unwrap();
        assert_eq!(codec.parse(&text).unwrap(), rec);
    }

    #[test]
    fn line_round_trip_is_exact() {
        let codec = RecordCodec::new(CodecMode::Line);
        let rec = full_record();
        let text = codec.serialize(&rec).unwrap();
        assert_eq!(codec.parse(&text).unwrap(), rec);
    }

    #[test]
    fn strategies_read_each_others_output() {
        let rec = full_record();
        let line_text = RecordCodec::new(CodecMode::Line).serialize(&rec).unwrap();
        assert_eq!(RecordCodec::new(CodecMode::Structured).parse(&line_text).unwrap(), rec);
        let toml_text = RecordCodec::new(CodecMode::Structured).serialize(&rec).unwrap();
        assert_eq!(RecordCodec::new(CodecMode::Line).parse(&toml_text).unwrap(), rec);
    }

    #[test]
    fn empty_body_round_trips() {
        let codec = RecordCodec::default();
        let rec = Record::new(CognitiveType::Episodic, "sessions", "s", Utc::now());
        let text = codec.serialize(&rec).unwrap();
        assert!(text.ends_with("+++\n\n"));
        assert_eq!(codec.parse(&text).unwrap().body, "");
    }

    #[test]
    fn body_leading_newlines_are_preserved() {
        let codec = RecordCodec::default();
        let rec = Record::new(CognitiveType::Semantic, "knowledge", "k", Utc::now()).with_body("\n\nindented");
        assert_eq!(codec.parse(&codec.serialize(&rec).unwrap()).unwrap().body, "\n\nindented");
    }

    const MODES: [CodecMode; 3] = [CodecMode::Structured, CodecMode::Line, CodecMode::Auto];

    const AWKWARD: &[&str] = &[
        "a\n+++\nb",
        "+++",
        "say \"hi\"",
        "C:\\dir\\",
        "tab\there",
        "cr\rlf\r\n",
        "bell\u{1}del\u{7f}",
        "é 漢字 🦀",
        "'''",
        "\"\"\"",
        "# not a comment",
        "[brackets], commas = ",
    ];

    fn awkward_record(text: &str) -> Record {
        let mut r = full_record().with_body("body\n");
        r.header.title = text.to_string();
        r.header.tags = vec![text.to_string(), "plain".to_string()];
        if let Some(p) = r.header.provenance.as_mut() {
            p.agent = text.to_string();
        }
        if let Some(e) = r.header.entity.as_mut() {
            e.fields.insert("quirk".to_string(), text.to_string());
        }
        r.header.citations[0].note = Some(text.to_string());
        r.header.relationships[0].label = Some(text.to_string());
        r
    }

    #[test]
    fn awkward_strings_round_trip_in_every_mode() {
        for text in AWKWARD {
            let rec = awkward_record(text);
            for writer in MODES {
                let file = RecordCodec::new(writer).serialize(&rec).unwrap();
                let fences = file.lines().filter(|l| *l == HEADER_DELIMITER).count();
                assert_eq!(fences, 2, "{writer:?} wrote a stray fence for {text:?}");
                for reader in MODES {
                    let parsed = RecordCodec::new(reader).parse(&file);
                    assert_eq!(parsed.unwrap(), rec, "{writer:?} -> {reader:?} for {text:?}");
                }
            }
        }
    }

    #[test]
    fn fence_inside_title_keeps_auto_mode_intact() {
        let codec = RecordCodec::default();
        let rec = awkward_record("a\n+++\nb");
        let parsed = codec.parse(&codec.serialize(&rec).unwrap()).unwrap();
        assert_eq!(parsed.header.title, "a\n+++\nb");
        assert_eq!(parsed.body, "body\n");
    }

    #[test]
    fn edge_floats_round_trip_in_every_mode() {
        let values = [
            0.0,
            -0.0,
            1e-300,
            0.1 + 0.2,
            f64::MAX,
            f64::MIN_POSITIVE,
            f64::INFINITY,
            f64::NEG_INFINITY,
        ];
        for value in values {
            let mut rec = full_record();
            rec.header.provenance.as_mut().unwrap().confidence = value;
            rec.header.citations[0].relevance = Some(value);
            if let Some(d) = rec.header.temporal.as_mut().and_then(|t| t.decay.as_mut()) {
                d.strength = value;
            }
            for writer in MODES {
                let file = RecordCodec::new(writer).serialize(&rec).unwrap();
                for reader in MODES {
                    let parsed = RecordCodec::new(reader).parse(&file).unwrap();
                    assert_eq!(parsed, rec, "{writer:?} -> {reader:?} for {value:?}");
                }
            }
        }
    }

    #[test]
    fn nan_is_written_as_toml_nan() {
        let mut rec = full_record();
        rec.header.provenance.as_mut().unwrap().confidence = f64::NAN;
        for writer in MODES {
            let file = RecordCodec::new(writer).serialize(&rec).unwrap();
            assert!(file.contains("confidence = nan\n"), "{writer:?}: {file}");
            for reader in MODES {
                let parsed = RecordCodec::new(reader).parse(&file).unwrap();
                assert!(parsed.header.provenance.unwrap().confidence.is_nan());
            }
        }
    }

    #[test]
    fn non_finite_floats_use_toml_spelling() {
        assert_eq!(format_float(f64::INFINITY), "inf");
        assert_eq!(format_float(f64::NEG_INFINITY), "-inf");
        assert_eq!(format_float(f64::NAN), "nan");
        assert_eq!(format_float(0.75), "0.75");
        assert_eq!(format_float(1.0), "1.0");
    }

    // ── framing ──────────────────────────────────────────────────────────────

    #[test]
    fn fence_inside_multiline_string_does_not_close_header() {
        let text = "+++\n\
            title = \"\"\"\n\
            first\n\
            +++\n\
            last\"\"\"\n\
            namespace = '''\n\
            +++\n\
            '''\n\
            kind = \"semantic\" # ''' in a comment\n\
            tags = [\"'''\", '\"\"\"']\n\
            +++\n\nbody";
        let (header, body) = split_document(text).unwrap();
        assert!(header.ends_with("'\"\"\"']\n"));
        assert_eq!(body, "body");

        let rec = RecordCodec::default().parse(text).unwrap();
        assert_eq!(rec.header.title, "first\n+++\nlast");
        assert_eq!(rec.header.namespace, "+++\n");
        assert_eq!(rec.header.kind, "semantic");
        assert_eq!(rec.header.tags, vec!["'''", "\"\"\""]);
    }

    #[test]
    fn unclosed_multiline_string_leaves_header_unterminated() {
        let text = "+++\ntitle = \"\"\"\n+++\n\nbody";
        assert!(matches!(split_document(text), Err(CodecError::UnterminatedHeader)));
    }


    #[test]
    fn missing_and_unterminated_headers_fail() {
        let codec = RecordCodec::default();
        assert!(matches!(codec.parse("no header"), Err(CodecError::MissingHeader)));
        assert!(matches!(
            codec.parse("+++\ntitle = \"x\"\n"),
            Err(CodecError::UnterminatedHeader)
        ));
    }

    #[test]
    fn crlf_files_are_accepted() {
        let text = "+++\r\ntitle = \"x\"\r\n+++\r\n\r\nbody\r\n";
        let rec = RecordCodec::default().parse(text).unwrap();
        assert_eq!(rec.header.title, "x");
        assert_eq!(rec.body, "body\r\n");
    }

    // ── leniency ─────────────────────────────────────────────────────────────

    #[test]
    fn structured_mode_rejects_invalid_toml() {
        let text = "+++\ntitle = Use PostgreSQL\n+++\n\n";
        assert!(matches!(
            RecordCodec::new(CodecMode::Structured).parse(text),
            Err(CodecError::Header(_))
        ));
    }

    #[test]
    fn auto_mode_falls_back_to_line_parser() {
        let text = "+++\n\
            id = 550e8400-e29b-41d4-a716-446655440000\n\
            kind = semantic\n\
            title = first\n\
            title = Use PostgreSQL # trailing comment\n\
            this line is junk\n\
            tags = [database, 'architecture']\n\
            \n\
            [provenance]\n\
            source_type = manual\n\
            confidence = high\n\
            \n\
            [mystery]\n\
            key = value\n\
            +++\n\nbody";
        let rec = RecordCodec::default().parse(text).unwrap();
        assert_eq!(rec.header.id, "550e8400-e29b-41d4-a716-446655440000");
        assert_eq!(rec.header.kind, "semantic");
        assert_eq!(rec.header.title, "Use PostgreSQL");
        assert_eq!(rec.header.tags, vec!["database", "architecture"]);
        let p = rec.header.provenance.unwrap();
        assert_eq!(p.source_type, "manual");
        assert_eq!(p.confidence, 1.0);
        assert_eq!(rec.body, "body");
    }

    #[test]
    fn mode_names_parse() {
        assert_eq!(CodecMode::parse("AUTO"), Some(CodecMode::Auto));
        assert_eq!(CodecMode::parse("line"), Some(CodecMode::Line));
        assert!(CodecMode::parse("yaml").is_none());
        assert_eq!(CodecMode::Structured.as_str(), "structured");
    }
}
