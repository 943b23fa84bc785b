//! Format-preserving XML document tree
//!
//! Parses manifest XML into an arena of nodes and serializes it back out.
//! Comments, text (including whitespace between elements), CDATA, processing
//! instructions, and the XML declaration are stored as raw byte runs and
//! re-emitted verbatim. Elements remember the exact content of their original
//! start tag and re-emit it untouched until the first attribute edit, at
//! which point the tag is re-rendered canonically (`name="value"` pairs
//! separated by single spaces, minimal escaping of `&`, `<`, `"`).
//!
//! quick-xml supplies the tokenizer and entity unescaping; this module only
//! assembles its event stream into an editable tree.

use crate::{ManifestError, Result};
use indexmap::IndexMap;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::cell::RefCell;

/// Handle to one node in a [`Document`] arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

#[derive(Debug, Clone)]
enum Payload {
    /// Synthetic top-level node holding the declaration, comments, and the root element
    Root { children: Vec<NodeId> },
    Element {
        tag: String,
        attrs: IndexMap<String, String>,
        /// Original start-tag content, re-emitted verbatim until the first attribute edit
        raw_start: Option<String>,
        self_closing: bool,
        children: Vec<NodeId>,
    },
    Text(String),
    CData(String),
    Comment(String),
    Decl(String),
    ProcessingInstruction(String),
    Doctype(String),
}

#[derive(Debug, Clone)]
struct Node {
    parent: Option<NodeId>,
    payload: Payload,
}

/// A parsed XML document
///
/// Node storage sits behind a `RefCell` so that element handles can write
/// through shared references; the type is single-threaded (`!Sync`) by
/// construction. Detaching a node removes it from its parent's child list
/// but keeps its data in the arena, so stale handles can still report what
/// they pointed at.
#[derive(Debug)]
pub struct Document {
    nodes: RefCell<Vec<Node>>,
    root: NodeId,
}

impl Document {
    /// Parse a document from XML text
    pub fn parse(text: &str) -> Result<Self> {
        let mut nodes = vec![Node {
            parent: None,
            payload: Payload::Root {
                children: Vec::new(),
            },
        }];
        let root = NodeId(0);
        let mut stack = vec![root];
        let mut reader = Reader::from_str(text);

        loop {
            let parent = *stack.last().unwrap_or(&root);
            match reader.read_event() {
                Ok(Event::Start(ref e)) => {
                    let id = push_parsed_element(&mut nodes, parent, e, false)?;
                    stack.push(id);
                }
                Ok(Event::Empty(ref e)) => {
                    push_parsed_element(&mut nodes, parent, e, true)?;
                }
                Ok(Event::End(_)) => {
                    if stack.len() > 1 {
                        stack.pop();
                    }
                }
                Ok(Event::Text(ref t)) => {
                    push_leaf(
                        &mut nodes,
                        parent,
                        Payload::Text(String::from_utf8_lossy(t).into_owned()),
                    );
                }
                Ok(Event::GeneralRef(ref r)) => {
                    // Entity references in text arrive as their own events;
                    // store them back in raw form so the run re-emits as-is.
                    push_leaf(
                        &mut nodes,
                        parent,
                        Payload::Text(format!("&{};", String::from_utf8_lossy(r))),
                    );
                }
                Ok(Event::CData(ref t)) => {
                    push_leaf(
                        &mut nodes,
                        parent,
                        Payload::CData(String::from_utf8_lossy(t).into_owned()),
                    );
                }
                Ok(Event::Comment(ref t)) => {
                    push_leaf(
                        &mut nodes,
                        parent,
                        Payload::Comment(String::from_utf8_lossy(t).into_owned()),
                    );
                }
                Ok(Event::Decl(ref d)) => {
                    push_leaf(
                        &mut nodes,
                        parent,
                        Payload::Decl(String::from_utf8_lossy(d).into_owned()),
                    );
                }
                Ok(Event::PI(ref p)) => {
                    push_leaf(
                        &mut nodes,
                        parent,
                        Payload::ProcessingInstruction(String::from_utf8_lossy(p).into_owned()),
                    );
                }
                Ok(Event::DocType(ref d)) => {
                    push_leaf(
                        &mut nodes,
                        parent,
                        Payload::Doctype(String::from_utf8_lossy(d).into_owned()),
                    );
                }
                Ok(Event::Eof) => break,
                Err(e) => {
                    return Err(ManifestError::Parse(format!(
                        "Error parsing manifest XML: {}",
                        e
                    )));
                }
            }
        }

        Ok(Document {
            nodes: RefCell::new(nodes),
            root,
        })
    }

    /// Serialize the document back to XML text
    ///
    /// Pure read; calling this repeatedly yields identical output for an
    /// unchanged tree.
    pub fn serialize(&self) -> String {
        let nodes = self.nodes.borrow();
        let mut out = String::new();
        write_node(&nodes, self.root, &mut out);
        out
    }

    /// The synthetic top-level node
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// The document's root element, if the document has one
    pub fn root_element(&self) -> Option<NodeId> {
        self.child_elements(self.root).into_iter().next()
    }

    /// Tag name of an element node; `None` for non-element nodes
    pub fn tag(&self, id: NodeId) -> Option<String> {
        let nodes = self.nodes.borrow();
        match &nodes[id.0].payload {
            Payload::Element { tag, .. } => Some(tag.clone()),
            _ => None,
        }
    }

    /// Whether the node is an element
    pub fn is_element(&self, id: NodeId) -> bool {
        let nodes = self.nodes.borrow();
        matches!(nodes[id.0].payload, Payload::Element { .. })
    }

    /// Value of an attribute physically present on the element
    pub fn attr(&self, id: NodeId, name: &str) -> Option<String> {
        let nodes = self.nodes.borrow();
        match &nodes[id.0].payload {
            Payload::Element { attrs, .. } => attrs.get(name).cloned(),
            _ => None,
        }
    }

    /// All attributes physically present on the element, in document order
    pub fn attrs(&self, id: NodeId) -> Vec<(String, String)> {
        let nodes = self.nodes.borrow();
        match &nodes[id.0].payload {
            Payload::Element { attrs, .. } => attrs
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Set an attribute, overwriting in place or appending if new
    ///
    /// Marks the element's start tag dirty so serialization re-renders it.
    pub fn set_attr(&self, id: NodeId, name: &str, value: &str) {
        let mut nodes = self.nodes.borrow_mut();
        if let Payload::Element {
            attrs, raw_start, ..
        } = &mut nodes[id.0].payload
        {
            attrs.insert(name.to_string(), value.to_string());
            *raw_start = None;
        }
    }

    /// Remove an attribute; returns `false` if it was not present
    ///
    /// Remaining attributes keep their relative order.
    pub fn remove_attr(&self, id: NodeId, name: &str) -> bool {
        let mut nodes = self.nodes.borrow_mut();
        if let Payload::Element {
            attrs, raw_start, ..
        } = &mut nodes[id.0].payload
        {
            if attrs.shift_remove(name).is_some() {
                *raw_start = None;
                return true;
            }
        }
        false
    }

    /// All child nodes, in document order
    pub fn children(&self, id: NodeId) -> Vec<NodeId> {
        let nodes = self.nodes.borrow();
        match &nodes[id.0].payload {
            Payload::Root { children } | Payload::Element { children, .. } => children.clone(),
            _ => Vec::new(),
        }
    }

    /// Element children only, in document order
    pub fn child_elements(&self, id: NodeId) -> Vec<NodeId> {
        let nodes = self.nodes.borrow();
        match &nodes[id.0].payload {
            Payload::Root { children } | Payload::Element { children, .. } => children
                .iter()
                .copied()
                .filter(|c| matches!(nodes[c.0].payload, Payload::Element { .. }))
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Create a new element with the given tag and attribute pairs and
    /// append it as the last child of `parent`
    pub fn append_element(&self, parent: NodeId, tag: &str, attrs: &[(&str, &str)]) -> NodeId {
        let mut nodes = self.nodes.borrow_mut();
        let mut attr_map = IndexMap::new();
        for (name, value) in attrs {
            attr_map.insert((*name).to_string(), (*value).to_string());
        }
        let id = NodeId(nodes.len());
        nodes.push(Node {
            parent: Some(parent),
            payload: Payload::Element {
                tag: tag.to_string(),
                attrs: attr_map,
                raw_start: None,
                self_closing: true,
                children: Vec::new(),
            },
        });
        if let Payload::Root { children } | Payload::Element { children, .. } =
            &mut nodes[parent.0].payload
        {
            children.push(id);
        }
        id
    }

    /// Detach a node from its parent's child list; returns `false` if the
    /// node had no parent
    pub fn detach(&self, id: NodeId) -> bool {
        let mut nodes = self.nodes.borrow_mut();
        let Some(parent) = nodes[id.0].parent else {
            return false;
        };
        if let Payload::Root { children } | Payload::Element { children, .. } =
            &mut nodes[parent.0].payload
        {
            children.retain(|c| *c != id);
        }
        nodes[id.0].parent = None;
        true
    }

    /// Parent of a node, if it has one
    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        let nodes = self.nodes.borrow();
        nodes[id.0].parent
    }

    /// Whether the node is still reachable from the document root
    ///
    /// Checked by walking parent links, so descendants of a detached
    /// subtree also report as detached.
    pub fn is_attached(&self, id: NodeId) -> bool {
        let nodes = self.nodes.borrow();
        let mut cur = id;
        loop {
            if cur == self.root {
                return true;
            }
            match nodes[cur.0].parent {
                Some(p) => cur = p,
                None => return false,
            }
        }
    }
}

fn push_parsed_element(
    nodes: &mut Vec<Node>,
    parent: NodeId,
    e: &BytesStart<'_>,
    self_closing: bool,
) -> Result<NodeId> {
    let tag = String::from_utf8_lossy(e.name().as_ref()).into_owned();
    let mut attrs = IndexMap::new();
    for attr in e.attributes() {
        let attr = attr.map_err(|err| {
            ManifestError::Parse(format!("Invalid attribute in <{}>: {}", tag, err))
        })?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr.unescape_value().map_err(|err| {
            ManifestError::Parse(format!("Invalid attribute value in <{}>: {}", tag, err))
        })?;
        attrs.insert(key, value.into_owned());
    }
    let raw_start = Some(String::from_utf8_lossy(e).into_owned());

    let id = NodeId(nodes.len());
    nodes.push(Node {
        parent: Some(parent),
        payload: Payload::Element {
            tag,
            attrs,
            raw_start,
            self_closing,
            children: Vec::new(),
        },
    });
    link_child(nodes, parent, id);
    Ok(id)
}

fn push_leaf(nodes: &mut Vec<Node>, parent: NodeId, payload: Payload) {
    let id = NodeId(nodes.len());
    nodes.push(Node {
        parent: Some(parent),
        payload,
    });
    link_child(nodes, parent, id);
}

fn link_child(nodes: &mut [Node], parent: NodeId, child: NodeId) {
    if let Payload::Root { children } | Payload::Element { children, .. } =
        &mut nodes[parent.0].payload
    {
        children.push(child);
    }
}

fn write_node(nodes: &[Node], id: NodeId, out: &mut String) {
    match &nodes[id.0].payload {
        Payload::Root { children } => {
            for c in children {
                write_node(nodes, *c, out);
            }
        }
        Payload::Element {
            tag,
            attrs,
            raw_start,
            self_closing,
            children,
        } => {
            let start = match raw_start {
                Some(raw) => raw.clone(),
                None => render_start(tag, attrs),
            };
            if children.is_empty() {
                if *self_closing {
                    out.push('<');
                    out.push_str(&start);
                    out.push_str("/>");
                } else {
                    out.push('<');
                    out.push_str(&start);
                    out.push('>');
                    out.push_str("</");
                    out.push_str(tag);
                    out.push('>');
                }
            } else {
                // A start tag captured from a self-closing element can carry
                // trailing whitespace that sat before the original `/>`.
                let start = if *self_closing {
                    start.trim_end().to_string()
                } else {
                    start
                };
                out.push('<');
                out.push_str(&start);
                out.push('>');
                for c in children {
                    write_node(nodes, *c, out);
                }
                out.push_str("</");
                out.push_str(tag);
                out.push('>');
            }
        }
        Payload::Text(raw) => out.push_str(raw),
        Payload::CData(raw) => {
            out.push_str("<![CDATA[");
            out.push_str(raw);
            out.push_str("]]>");
        }
        Payload::Comment(raw) => {
            out.push_str("<!--");
            out.push_str(raw);
            out.push_str("-->");
        }
        Payload::Decl(raw) | Payload::ProcessingInstruction(raw) => {
            out.push_str("<?");
            out.push_str(raw);
            out.push_str("?>");
        }
        Payload::Doctype(raw) => {
            out.push_str("<!DOCTYPE ");
            out.push_str(raw);
            out.push('>');
        }
    }
}

fn render_start(tag: &str, attrs: &IndexMap<String, String>) -> String {
    let mut s = String::from(tag);
    for (name, value) in attrs {
        s.push(' ');
        s.push_str(name);
        s.push_str("=\"");
        s.push_str(&escape_attr(value));
        s.push('"');
    }
    s
}

fn escape_attr(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '"' => escaped.push_str("&quot;"),
            _ => escaped.push(ch),
        }
    }
    escaped
}
