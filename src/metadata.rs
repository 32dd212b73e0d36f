//! Loosely-typed metadata tree read from the container's XML
//!
//! The container ships its metadata as an XML document whose shape varies
//! between acquisition software versions. It is loaded into a
//! [`MetadataNode`] tree following these rules:
//!
//! - attributes become `@name` keys
//! - text of a leaf element becomes a [`MetadataNode::Scalar`]
//! - text of an element that also has attributes or children is kept under `#text`
//! - repeated sibling elements collapse into a [`MetadataNode::Sequence`]
//!
//! A single child stays a bare node, so consumers that expect lists go
//! through [`MetadataNode::items`].

use crate::error::{CziError, Result};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};
use std::fmt;

/// Key under which element text is stored when the element is not a leaf
pub const TEXT_KEY: &str = "#text";

static ABSENT: MetadataNode = MetadataNode::Absent;

/// One node of the metadata tree
#[derive(Debug, Clone, PartialEq, Default)]
pub enum MetadataNode {
    #[default]
    Absent,
    Scalar(String),
    Sequence(Vec<MetadataNode>),
    Mapping(Vec<(String, MetadataNode)>),
}

impl MetadataNode {
    pub fn mapping() -> Self {
        MetadataNode::Mapping(Vec::new())
    }

    pub fn scalar(value: impl Into<String>) -> Self {
        MetadataNode::Scalar(value.into())
    }

    /// Add a field to a mapping, turning repeated keys into a sequence.
    /// Has no effect on non-mapping nodes.
    pub fn push_field(&mut self, key: impl Into<String>, value: MetadataNode) {
        let MetadataNode::Mapping(fields) = self else {
            return;
        };
        let key = key.into();
        match fields.iter_mut().find(|(k, _)| *k == key) {
            Some((_, MetadataNode::Sequence(items))) => items.push(value),
            Some((_, existing)) => {
                let first = std::mem::take(existing);
                *existing = MetadataNode::Sequence(vec![first, value]);
            }
            None => fields.push((key, value)),
        }
    }

    /// Builder-style [`push_field`](Self::push_field)
    pub fn with_field(mut self, key: impl Into<String>, value: MetadataNode) -> Self {
        self.push_field(key, value);
        self
    }

    /// Shared [`MetadataNode::Absent`] for lookups that find nothing
    pub fn absent() -> &'static MetadataNode {
        &ABSENT
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, MetadataNode::Absent)
    }

    /// Child of a mapping; [`MetadataNode::Absent`] for anything else
    pub fn get(&self, key: &str) -> &MetadataNode {
        match self {
            MetadataNode::Mapping(fields) => fields
                .iter()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v)
                .unwrap_or(&ABSENT),
            _ => &ABSENT,
        }
    }

    /// Follow a dotted key chain such as `Metadata.Scaling.Items`
    pub fn at(&self, path: &str) -> &MetadataNode {
        path.split('.')
            .filter(|k| !k.is_empty())
            .fold(self, |node, key| node.get(key))
    }

    /// Elements of a sequence, or the node itself when it is a single item
    pub fn items(&self) -> Vec<&MetadataNode> {
        match self {
            MetadataNode::Absent => Vec::new(),
            MetadataNode::Sequence(items) => items.iter().collect(),
            other => vec![other],
        }
    }

    /// Text of a scalar, or the `#text` of a mapping
    pub fn as_str(&self) -> Option<&str> {
        match self {
            MetadataNode::Scalar(s) => Some(s.as_str()),
            MetadataNode::Mapping(_) => match self.get(TEXT_KEY) {
                MetadataNode::Scalar(s) => Some(s.as_str()),
                _ => None,
            },
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        self.as_str()?.trim().parse().ok()
    }

    pub fn as_f64(&self) -> Option<f64> {
        self.as_str()?.trim().parse().ok()
    }

    /// Lazily enumerate the paths at which `field` occurs as a mapping key.
    /// The iterator is `Clone`, so a search can be restarted from a copy.
    pub fn field_paths<'a>(&'a self, field: &'a str) -> FieldPaths<'a> {
        FieldPaths {
            field,
            stack: vec![(String::new(), None, self)],
        }
    }

    /// Parse container XML into a tree rooted at an unnamed mapping
    pub fn from_xml(xml: &str) -> Result<Self> {
        let mut reader = Reader::from_str(xml);
        reader.trim_text(true);

        let mut root = MetadataNode::mapping();
        let mut stack: Vec<ElementBuilder> = Vec::new();

        loop {
            match reader.read_event()? {
                Event::Start(e) => stack.push(ElementBuilder::open(&e)?),
                Event::Empty(e) => {
                    let (name, node) = ElementBuilder::open(&e)?.finish();
                    attach(&mut stack, &mut root, name, node);
                }
                Event::Text(e) => {
                    if let Some(current) = stack.last_mut() {
                        let text = e
                            .unescape()
                            .map_err(|err| CziError::Xml(err.to_string()))?;
                        current.text.push_str(&text);
                    }
                }
                Event::CData(e) => {
                    if let Some(current) = stack.last_mut() {
                        current
                            .text
                            .push_str(&String::from_utf8_lossy(&e.into_inner()));
                    }
                }
                Event::End(_) => {
                    let builder = stack
                        .pop()
                        .ok_or_else(|| CziError::Xml("unbalanced closing tag".to_string()))?;
                    let (name, node) = builder.finish();
                    attach(&mut stack, &mut root, name, node);
                }
                Event::Eof => break,
                _ => {}
            }
        }

        if !stack.is_empty() {
            return Err(CziError::Xml(format!(
                "{} unclosed element(s) at end of document",
                stack.len()
            )));
        }
        Ok(root)
    }
}

fn attach(
    stack: &mut [ElementBuilder],
    root: &mut MetadataNode,
    name: String,
    node: MetadataNode,
) {
    match stack.last_mut() {
        Some(parent) => parent.node.push_field(name, node),
        None => root.push_field(name, node),
    }
}

struct ElementBuilder {
    name: String,
    node: MetadataNode,
    text: String,
}

impl ElementBuilder {
    fn open(start: &BytesStart<'_>) -> Result<Self> {
        let name = String::from_utf8_lossy(start.name().as_ref()).to_string();
        let mut node = MetadataNode::mapping();
        for attribute in start.attributes() {
            let attribute = attribute.map_err(|e| CziError::Xml(e.to_string()))?;
            let key = String::from_utf8_lossy(attribute.key.as_ref()).to_string();
            let value = attribute
                .unescape_value()
                .map_err(|e| CziError::Xml(e.to_string()))?;
            node.push_field(format!("@{key}"), MetadataNode::scalar(value));
        }
        Ok(Self {
            name,
            node,
            text: String::new(),
        })
    }

    fn finish(self) -> (String, MetadataNode) {
        let ElementBuilder { name, node, text } = self;
        let has_fields = matches!(&node, MetadataNode::Mapping(fields) if !fields.is_empty());
        let node = if has_fields {
            if text.is_empty() {
                node
            } else {
                node.with_field(TEXT_KEY, MetadataNode::Scalar(text))
            }
        } else {
            MetadataNode::Scalar(text)
        };
        (name, node)
    }
}

/// Iterator over structural paths of a field name; see [`MetadataNode::field_paths`]
#[derive(Debug, Clone)]
pub struct FieldPaths<'a> {
    field: &'a str,
    stack: Vec<(String, Option<&'a str>, &'a MetadataNode)>,
}

impl<'a> Iterator for FieldPaths<'a> {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        while let Some((path, key, node)) = self.stack.pop() {
            match node {
                MetadataNode::Mapping(fields) => {
                    for (k, v) in fields.iter().rev() {
                        let child = if path.is_empty() {
                            k.clone()
                        } else {
                            format!("{path}.{k}")
                        };
                        self.stack.push((child, Some(k.as_str()), v));
                    }
                }
                MetadataNode::Sequence(items) => {
                    for (i, v) in items.iter().enumerate().rev() {
                        self.stack.push((format!("{path}[{i}]"), key, v));
                    }
                }
                MetadataNode::Absent | MetadataNode::Scalar(_) => {}
            }
            // sequence elements inherit their key; the sequence itself is reported once
            if key == Some(self.field) && !path.ends_with(']') {
                return Some(path);
            }
        }
        None
    }
}

impl Serialize for MetadataNode {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            MetadataNode::Absent => serializer.serialize_none(),
            MetadataNode::Scalar(s) => serializer.serialize_str(s),
            MetadataNode::Sequence(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            MetadataNode::Mapping(fields) => {
                let mut map = serializer.serialize_map(Some(fields.len()))?;
                for (k, v) in fields {
                    map.serialize_entry(k, v)?;
                }
                map.end()
            }
        }
    }
}

impl fmt::Display for MetadataNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match serde_json::to_string_pretty(self) {
            Ok(s) => f.write_str(&s),
            Err(_) => Err(fmt::Error),
        }
    }
}
