//! Editor state tree and the snapshot codec.
//!
//! The tree mirrors the Lexical editor-state JSON layout (`{"root": {...}}`
//! with `type`-tagged nodes), so snapshots produced here can be loaded by a
//! browser editor and vice versa. Fields and node types the tree does not
//! model are carried through untouched. Snapshots are canonical JSON: object keys
//! are sorted at every depth, so logically identical trees always serialize
//! to identical bytes.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Errors that can occur while encoding or decoding snapshots
#[derive(Error, Debug)]
pub enum SnapshotError {
    #[error("Snapshot encoding failed: {0}")]
    Encode(String),

    #[error("Malformed snapshot: {0}")]
    Malformed(String),
}

pub type SnapshotResult<T> = Result<T, SnapshotError>;

/// Text format bits, matching the browser editor's bitmask
pub mod format {
    pub const BOLD: u32 = 1;
    pub const ITALIC: u32 = 1 << 1;
    pub const STRIKETHROUGH: u32 = 1 << 2;
    pub const UNDERLINE: u32 = 1 << 3;
    pub const CODE: u32 = 1 << 4;
}

fn default_version() -> u32 {
    1
}

fn default_mode() -> String {
    "normal".to_string()
}

/// Fields shared by every element (non-leaf) node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElementNode {
    #[serde(default)]
    pub children: Vec<Node>,
    #[serde(default)]
    pub direction: Option<String>,
    #[serde(default)]
    pub format: String,
    #[serde(default)]
    pub indent: u32,
    #[serde(default = "default_version")]
    pub version: u32,
    /// Keys this tree does not model, e.g. a paragraph's `textFormat`
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for ElementNode {
    fn default() -> Self {
        Self {
            children: Vec::new(),
            direction: None,
            format: String::new(),
            indent: 0,
            version: 1,
            extra: Map::new(),
        }
    }
}

impl ElementNode {
    pub fn with_children(children: Vec<Node>) -> Self {
        let direction = if children.is_empty() {
            None
        } else {
            Some("ltr".to_string())
        };
        Self {
            children,
            direction,
            ..Default::default()
        }
    }

    /// Concatenated text of all descendants; line breaks become `\n`
    pub fn text_content(&self) -> String {
        let mut out = String::new();
        for child in &self.children {
            child.collect_text(&mut out);
        }
        out
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeadingNode {
    /// `h1` through `h6`
    pub tag: String,
    #[serde(flatten)]
    pub element: ElementNode,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListNode {
    /// `bullet`, `number` or `check`
    pub list_type: String,
    #[serde(default = "default_version")]
    pub start: u32,
    /// `ul` or `ol`
    pub tag: String,
    #[serde(flatten)]
    pub element: ElementNode,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListItemNode {
    #[serde(default = "default_version")]
    pub value: u32,
    #[serde(flatten)]
    pub element: ElementNode,
}

/// A run of text with uniform formatting
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextNode {
    #[serde(default)]
    pub detail: u32,
    #[serde(default)]
    pub format: u32,
    #[serde(default = "default_mode")]
    pub mode: String,
    #[serde(default)]
    pub style: String,
    pub text: String,
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl TextNode {
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            detail: 0,
            format: 0,
            mode: default_mode(),
            style: String::new(),
            text: text.into(),
            version: 1,
            extra: Map::new(),
        }
    }

    pub fn with_format(mut self, bits: u32) -> Self {
        self.format |= bits;
        self
    }

    pub fn has_format(&self, bits: u32) -> bool {
        self.format & bits == bits
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineBreakNode {
    #[serde(default = "default_version")]
    pub version: u32,
}

/// Any node below the root.
///
/// Node types without a dedicated variant (links, code blocks, images...)
/// decode as `Other` and serialize back exactly as they were read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Node {
    Paragraph(ElementNode),
    Heading(HeadingNode),
    Quote(ElementNode),
    List(ListNode),
    #[serde(rename = "listitem")]
    ListItem(ListItemNode),
    Text(TextNode),
    #[serde(rename = "linebreak")]
    LineBreak(LineBreakNode),
    #[serde(untagged)]
    Other(Value),
}

impl Node {
    pub fn paragraph(text: impl Into<String>) -> Self {
        let text = text.into();
        let children = if text.is_empty() {
            Vec::new()
        } else {
            vec![Node::Text(TextNode::plain(text))]
        };
        Node::Paragraph(ElementNode::with_children(children))
    }

    pub fn heading(tag: impl Into<String>, text: impl Into<String>) -> Self {
        Node::Heading(HeadingNode {
            tag: tag.into(),
            element: ElementNode::with_children(vec![Node::Text(TextNode::plain(text))]),
        })
    }

    pub fn line_break() -> Self {
        Node::LineBreak(LineBreakNode { version: 1 })
    }

    /// Element fields, if this is an element node
    pub fn element(&self) -> Option<&ElementNode> {
        match self {
            Node::Paragraph(e) | Node::Quote(e) => Some(e),
            Node::Heading(h) => Some(&h.element),
            Node::List(l) => Some(&l.element),
            Node::ListItem(i) => Some(&i.element),
            Node::Text(_) | Node::LineBreak(_) | Node::Other(_) => None,
        }
    }

    pub fn element_mut(&mut self) -> Option<&mut ElementNode> {
        match self {
            Node::Paragraph(e) | Node::Quote(e) => Some(e),
            Node::Heading(h) => Some(&mut h.element),
            Node::List(l) => Some(&mut l.element),
            Node::ListItem(i) => Some(&mut i.element),
            Node::Text(_) | Node::LineBreak(_) | Node::Other(_) => None,
        }
    }

    fn collect_text(&self, out: &mut String) {
        match self {
            Node::Text(t) => out.push_str(&t.text),
            Node::LineBreak(_) => out.push('\n'),
            Node::Other(value) => collect_value_text(value, out),
            other => {
                if let Some(element) = other.element() {
                    for child in &element.children {
                        child.collect_text(out);
                    }
                }
            }
        }
    }
}

/// Text of a node kept as raw JSON, following the same rules as typed nodes
fn collect_value_text(value: &Value, out: &mut String) {
    if value["type"] == "linebreak" {
        out.push('\n');
        return;
    }
    if let Some(text) = value["text"].as_str() {
        out.push_str(text);
    }
    if let Some(children) = value["children"].as_array() {
        for child in children {
            collect_value_text(child, out);
        }
    }
}

/// Marker that serializes as `"root"`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RootTag {
    #[default]
    #[serde(rename = "root")]
    Root,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RootNode {
    #[serde(rename = "type")]
    pub tag: RootTag,
    #[serde(flatten)]
    pub element: ElementNode,
}

/// The full editor state: a root holding block-level nodes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EditorState {
    pub root: RootNode,
}

impl Default for EditorState {
    /// The empty document: a root holding one empty paragraph
    fn default() -> Self {
        Self::with_blocks(vec![Node::paragraph("")])
    }
}

impl EditorState {
    pub fn with_blocks(blocks: Vec<Node>) -> Self {
        Self {
            root: RootNode {
                tag: RootTag::Root,
                element: ElementNode::with_children(blocks),
            },
        }
    }

    pub fn blocks(&self) -> &[Node] {
        &self.root.element.children
    }

    pub fn blocks_mut(&mut self) -> &mut Vec<Node> {
        &mut self.root.element.children
    }

    /// Append a new paragraph holding `text`
    pub fn append_paragraph(&mut self, text: impl Into<String>) {
        self.blocks_mut().push(Node::paragraph(text));
        self.root.element.direction = Some("ltr".to_string());
    }

    /// Append text to the last block, creating a paragraph if there is none
    pub fn push_text(&mut self, text: impl Into<String>) {
        let text = text.into();
        if self.blocks().last().and_then(Node::element).is_none() {
            self.append_paragraph(text);
            return;
        }
        if let Some(block) = self.blocks_mut().last_mut().and_then(Node::element_mut) {
            match block.children.last_mut() {
                Some(Node::Text(run)) if run.format == 0 => run.text.push_str(&text),
                _ => block.children.push(Node::Text(TextNode::plain(text))),
            }
            block.direction = Some("ltr".to_string());
        }
    }

    /// Plain text of the document, blocks separated by blank lines
    pub fn plain_text(&self) -> String {
        self.blocks()
            .iter()
            .map(|block| {
                let mut out = String::new();
                block.collect_text(&mut out);
                out
            })
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    /// True for the default empty document
    pub fn is_blank(&self) -> bool {
        self.root.element.text_content().is_empty()
    }
}

/// Immutable, canonical serialized form of an editor state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Snapshot(Value);

impl Snapshot {
    /// Wrap a JSON value, canonicalizing key order
    pub fn from_value(value: Value) -> Self {
        Self(canonicalize(value))
    }

    /// A snapshot of "no content"
    pub fn null() -> Self {
        Self(Value::Null)
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }

    pub fn into_value(self) -> Value {
        self.0
    }

    /// `null` or `{}`
    pub fn is_empty(&self) -> bool {
        match &self.0 {
            Value::Null => true,
            Value::Object(map) => map.is_empty(),
            _ => false,
        }
    }

    /// Canonical JSON text
    pub fn to_canonical_string(&self) -> String {
        self.0.to_string()
    }

    /// SHA-256 over the canonical text, hex encoded
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.to_canonical_string().as_bytes());
        hex::encode(hasher.finalize())
    }
}

impl From<Value> for Snapshot {
    fn from(value: Value) -> Self {
        Self::from_value(value)
    }
}

/// Rebuild objects with keys inserted in sorted order, recursively.
fn canonicalize(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> = map.into_iter().collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            let mut sorted = Map::new();
            for (key, value) in entries {
                sorted.insert(key, canonicalize(value));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.into_iter().map(canonicalize).collect()),
        other => other,
    }
}

/// Converts between live editor state and snapshots
pub struct SnapshotCodec;

impl SnapshotCodec {
    /// Serialize an editor state into a snapshot
    pub fn to_snapshot(state: &EditorState) -> SnapshotResult<Snapshot> {
        let value =
            serde_json::to_value(state).map_err(|e| SnapshotError::Encode(e.to_string()))?;
        Ok(Snapshot::from_value(value))
    }

    /// Decode a snapshot; `None`, `null` and `{}` give the empty document.
    ///
    /// Anything else that is not an editor state is an error. Opening such
    /// content as a blank tree would let the next autosave overwrite it.
    pub fn from_snapshot(snapshot: Option<&Snapshot>) -> SnapshotResult<EditorState> {
        match snapshot {
            None => Ok(EditorState::default()),
            Some(s) if s.is_empty() => Ok(EditorState::default()),
            Some(s) => serde_json::from_value(s.as_value().clone())
                .map_err(|e| SnapshotError::Malformed(e.to_string())),
        }
    }
}
