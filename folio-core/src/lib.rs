//! Core data model for the Folio block-document store.
//!
//! Defines the pointer/record vocabulary shared by every layer: tables,
//! pointers, roles, block types, rich-text segments, and the JSON value
//! helpers (path lookup, deep merge) that the cache and store views build on.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// The tables records can live in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Table {
    Block,
    Space,
    Collection,
}

impl Table {
    pub fn as_str(&self) -> &'static str {
        match self {
            Table::Block => "block",
            Table::Space => "space",
            Table::Collection => "collection",
        }
    }
}

/// Stable identity of a record: which table, which row.
///
/// Equality is structural, so two independently constructed pointers to the
/// same logical record compare (and hash) equal.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Pointer {
    pub table: Table,
    pub id: String,
}

impl Pointer {
    pub fn new(table: Table, id: impl Into<String>) -> Self {
        Self { table, id: id.into() }
    }

    pub fn block(id: impl Into<String>) -> Self {
        Self::new(Table::Block, id)
    }

    pub fn space(id: impl Into<String>) -> Self {
        Self::new(Table::Space, id)
    }
}

/// What the current viewer may do with a record.
///
/// Ordered: a larger role strictly contains the capabilities of a smaller
/// one, so capability checks are plain comparisons.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    #[default]
    None,
    Reader,
    Commenter,
    Editor,
    Owner,
}

impl Role {
    pub fn can_edit(self) -> bool {
        self >= Role::Editor
    }

    pub fn can_read(self) -> bool {
        self >= Role::Reader
    }
}

/// A cached record: the persisted value tree plus the viewer's role on it.
///
/// The role lives next to the value (not inside it) because the same pointer
/// can carry different roles for different users.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub value: Value,
    pub role: Role,
}

impl Record {
    pub fn new(value: Value, role: Role) -> Self {
        Self { value, role }
    }
}

/// Block variants understood by the editing surface.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockType {
    Text,
    Header,
    SubHeader,
    Todo,
    BulletedList,
    NumberedList,
    Quote,
    Divider,
    Page,
}

impl BlockType {
    pub fn as_str(&self) -> &'static str {
        match self {
            BlockType::Text => "text",
            BlockType::Header => "header",
            BlockType::SubHeader => "sub_header",
            BlockType::Todo => "todo",
            BlockType::BulletedList => "bulleted_list",
            BlockType::NumberedList => "numbered_list",
            BlockType::Quote => "quote",
            BlockType::Divider => "divider",
            BlockType::Page => "page",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "text" => Some(BlockType::Text),
            "header" => Some(BlockType::Header),
            "sub_header" => Some(BlockType::SubHeader),
            "todo" => Some(BlockType::Todo),
            "bulleted_list" => Some(BlockType::BulletedList),
            "numbered_list" => Some(BlockType::NumberedList),
            "quote" => Some(BlockType::Quote),
            "divider" => Some(BlockType::Divider),
            "page" => Some(BlockType::Page),
            _ => None,
        }
    }
}

/// Inline formatting applied to a run of text.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mark {
    Bold,
    Italic,
    Strikethrough,
    Code,
    Link(String),
}

/// One run of rich text: the characters plus the marks covering them.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Segment {
    pub text: String,
    pub marks: Vec<Mark>,
}

impl Segment {
    pub fn plain(text: impl Into<String>) -> Self {
        Self { text: text.into(), marks: Vec::new() }
    }

    pub fn with_marks(text: impl Into<String>, marks: Vec<Mark>) -> Self {
        Self { text: text.into(), marks }
    }
}

/// Encode segments into the persisted title shape: an array of
/// `[text]` / `[text, [mark…]]` pairs.
pub fn segments_to_value(segments: &[Segment]) -> Value {
    Value::Array(
        segments
            .iter()
            .map(|s| {
                if s.marks.is_empty() {
                    json!([s.text])
                } else {
                    json!([s.text, s.marks])
                }
            })
            .collect(),
    )
}

/// Decode a persisted title value back into segments.
///
/// Tolerant: entries that do not match the expected shape are skipped rather
/// than failing the whole title.
pub fn segments_from_value(value: &Value) -> Vec<Segment> {
    let Value::Array(entries) = value else {
        return Vec::new();
    };
    entries
        .iter()
        .filter_map(|entry| {
            let parts = entry.as_array()?;
            let text = parts.first()?.as_str()?.to_string();
            let marks = parts
                .get(1)
                .map(|m| serde_json::from_value(m.clone()).unwrap_or_default())
                .unwrap_or_default();
            Some(Segment { text, marks })
        })
        .collect()
}

/// Walk `path` down a value tree. `None` when any step is missing or the
/// intermediate value is not an object.
pub fn get_path<'a>(value: &'a Value, path: &[String]) -> Option<&'a Value> {
    let mut current = value;
    for segment in path {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

/// Walk `path` down a value tree, creating empty objects for missing or
/// non-object intermediate steps, and return the slot at the end.
pub fn ensure_path_mut<'a>(value: &'a mut Value, path: &[String]) -> &'a mut Value {
    let mut current = value;
    for segment in path {
        if !current.is_object() {
            *current = Value::Object(Map::new());
        }
        current = match current {
            Value::Object(map) => map.entry(segment.clone()).or_insert(Value::Null),
            _ => unreachable!(),
        };
    }
    current
}

/// Structural deep merge: object fields merge recursively, everything else
/// (arrays, scalars, null) replaces the target wholesale.
pub fn deep_merge(target: &mut Value, incoming: Value) {
    match (target, incoming) {
        (Value::Object(existing), Value::Object(fields)) => {
            for (key, value) in fields {
                match existing.get_mut(&key) {
                    Some(slot) => deep_merge(slot, value),
                    None => {
                        existing.insert(key, value);
                    }
                }
            }
        }
        (target, incoming) => *target = incoming,
    }
}
