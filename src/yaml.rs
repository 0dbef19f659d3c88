//! Generic position-tagged YAML tree.
//!
//! The first parsing phase: the document is read with the `yaml-rust2` event
//! parser and folded into a small [`Node`] tree where every scalar, sequence
//! and mapping knows where it starts. No workflow semantics live here; the
//! typed projection happens in [`parse`](crate::parse).

use crate::ast::{Pos, Str};
use std::collections::HashMap;
use yaml_rust2::parser::{Event, MarkedEventReceiver, Parser};
use yaml_rust2::scanner::{Marker, TScalarStyle};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarStyle {
    Plain,
    Quoted,
    Block,
}

#[derive(Debug, Clone)]
pub struct Scalar {
    pub value: String,
    /// Position of the first character of the content.
    pub pos: Pos,
    pub style: ScalarStyle,
}

impl Scalar {
    /// Plain `~`, `null` and empty scalars are YAML nulls.
    pub fn is_null(&self) -> bool {
        self.style == ScalarStyle::Plain
            && matches!(self.value.as_str(), "" | "~" | "null" | "Null" | "NULL")
    }

    pub fn to_str(&self) -> Str {
        Str {
            value: self.value.clone(),
            pos: self.pos,
            block: self.style == ScalarStyle::Block,
        }
    }
}

#[derive(Debug, Clone)]
pub enum Node {
    Scalar(Scalar),
    Sequence(Vec<Node>, Pos),
    Mapping(Vec<(Scalar, Node)>, Pos),
}

impl Node {
    pub fn pos(&self) -> Pos {
        match self {
            Node::Scalar(s) => s.pos,
            Node::Sequence(_, p) | Node::Mapping(_, p) => *p,
        }
    }

    /// Human name of the node kind, used in type-mismatch messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Node::Scalar(s) if s.is_null() => "null",
            Node::Scalar(_) => "scalar",
            Node::Sequence(..) => "sequence",
            Node::Mapping(..) => "mapping",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Node::Scalar(s) if s.is_null())
    }
}

/// A failure to read the document as YAML at all.
#[derive(Debug, Clone)]
pub struct YamlError {
    pub message: String,
    pub pos: Pos,
}

enum Frame {
    Sequence {
        items: Vec<Node>,
        pos: Pos,
        anchor: usize,
    },
    Mapping {
        entries: Vec<(Scalar, Node)>,
        key: Option<Scalar>,
        pos: Pos,
        anchor: usize,
    },
}

struct TreeBuilder<'a> {
    lines: Vec<&'a str>,
    stack: Vec<Frame>,
    root: Option<Node>,
    anchors: HashMap<usize, Node>,
    error: Option<YamlError>,
}

impl<'a> TreeBuilder<'a> {
    fn new(source: &'a str) -> Self {
        TreeBuilder {
            lines: source.lines().collect(),
            stack: Vec::new(),
            root: None,
            anchors: HashMap::new(),
            error: None,
        }
    }

    fn scalar(&self, value: String, style: TScalarStyle, mark: Marker) -> Scalar {
        let at = Pos::new(mark.line(), mark.col() + 1);
        match style {
            TScalarStyle::Plain => Scalar {
                value,
                pos: at,
                style: ScalarStyle::Plain,
            },
            TScalarStyle::SingleQuoted | TScalarStyle::DoubleQuoted => Scalar {
                value,
                pos: Pos::new(at.line, at.col + 1),
                style: ScalarStyle::Quoted,
            },
            TScalarStyle::Literal | TScalarStyle::Folded => {
                // Block scalar: the marker sits on the `|` / `>` indicator and
                // the content starts on the following line at its indentation.
                let line = at.line + 1;
                let indent = self
                    .lines
                    .get(line - 1)
                    .map(|l| l.len() - l.trim_start_matches(' ').len())
                    .unwrap_or(0);
                Scalar {
                    value,
                    pos: Pos::new(line, indent + 1),
                    style: ScalarStyle::Block,
                }
            }
        }
    }

    fn attach(&mut self, node: Node, anchor: usize) {
        if anchor > 0 {
            self.anchors.insert(anchor, node.clone());
        }
        match self.stack.last_mut() {
            None => {
                if self.root.is_none() {
                    self.root = Some(node);
                }
            }
            Some(Frame::Sequence { items, .. }) => items.push(node),
            Some(Frame::Mapping { entries, key, .. }) => match key.take() {
                Some(k) => entries.push((k, node)),
                None => match node {
                    Node::Scalar(s) => *key = Some(s),
                    other => {
                        if self.error.is_none() {
                            self.error = Some(YamlError {
                                message: format!(
                                    "mapping key must be a scalar but found {}",
                                    other.kind()
                                ),
                                pos: other.pos(),
                            });
                        }
                    }
                },
            },
        }
    }
}

impl MarkedEventReceiver for TreeBuilder<'_> {
    fn on_event(&mut self, ev: Event, mark: Marker) {
        let pos = Pos::new(mark.line(), mark.col() + 1);
        match ev {
            Event::Scalar(value, style, anchor, _) => {
                let s = self.scalar(value, style, mark);
                self.attach(Node::Scalar(s), anchor);
            }
            Event::SequenceStart(anchor, _) => self.stack.push(Frame::Sequence {
                items: Vec::new(),
                pos,
                anchor,
            }),
            Event::MappingStart(anchor, _) => self.stack.push(Frame::Mapping {
                entries: Vec::new(),
                key: None,
                pos,
                anchor,
            }),
            Event::SequenceEnd | Event::MappingEnd => match self.stack.pop() {
                Some(Frame::Sequence { items, pos, anchor }) => {
                    self.attach(Node::Sequence(items, pos), anchor)
                }
                Some(Frame::Mapping {
                    entries,
                    pos,
                    anchor,
                    ..
                }) => self.attach(Node::Mapping(entries, pos), anchor),
                None => {}
            },
            Event::Alias(id) => match self.anchors.get(&id).cloned() {
                Some(node) => self.attach(node, 0),
                None => {
                    if self.error.is_none() {
                        self.error = Some(YamlError {
                            message: "alias refers to an unknown anchor".to_string(),
                            pos,
                        });
                    }
                }
            },
            _ => {}
        }
    }
}

/// Parses the first YAML document in `source`.
///
/// Returns `Ok(None)` for an empty stream.
pub fn load(source: &str) -> Result<Option<Node>, YamlError> {
    let mut builder = TreeBuilder::new(source);
    let mut parser = Parser::new(source.chars());
    parser
        .load(&mut builder, false)
        .map_err(|e| YamlError {
            message: e.info().to_string(),
            pos: Pos::new(e.marker().line(), e.marker().col() + 1),
        })?;
    if let Some(err) = builder.error {
        return Err(err);
    }
    Ok(builder.root)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn root(src: &str) -> Node {
        load(src).unwrap().unwrap()
    }

    #[test]
    fn mapping_keys_keep_positions() {
        let node = root("on: push\njobs:\n  build:\n    runs-on: ubuntu-latest\n");
        let Node::Mapping(entries, _) = node else {
            panic!("expected mapping");
        };
        assert_eq!(entries[0].0.value, "on");
        assert_eq!(entries[0].0.pos, Pos::new(1, 1));
        assert_eq!(entries[1].0.pos, Pos::new(2, 1));
        let Node::Mapping(jobs, _) = &entries[1].1 else {
            panic!("expected jobs mapping");
        };
        assert_eq!(jobs[0].0.pos, Pos::new(3, 3));
    }

    #[test]
    fn block_scalar_content_position() {
        let node = root("run: |\n  echo hi\n  echo bye\n");
        let Node::Mapping(entries, _) = node else {
            panic!("expected mapping");
        };
        let Node::Scalar(s) = &entries[0].1 else {
            panic!("expected scalar");
        };
        assert_eq!(s.style, ScalarStyle::Block);
        assert_eq!(s.pos, Pos::new(2, 3));
        assert_eq!(s.value, "echo hi\necho bye\n");
    }

    #[test]
    fn quoted_scalar_skips_quote() {
        let node = root("name: 'hello'\n");
        let Node::Mapping(entries, _) = node else {
            panic!("expected mapping");
        };
        assert_eq!(entries[0].1.pos(), Pos::new(1, 8));
    }

    #[test]
    fn empty_value_is_null() {
        let node = root("on:\n");
        let Node::Mapping(entries, _) = node else {
            panic!("expected mapping");
        };
        assert!(entries[0].1.is_null());
    }

    #[test]
    fn anchors_are_expanded() {
        let node = root("a: &x [1, 2]\nb: *x\n");
        let Node::Mapping(entries, _) = node else {
            panic!("expected mapping");
        };
        assert!(matches!(&entries[1].1, Node::Sequence(items, _) if items.len() == 2));
    }

    #[test]
    fn malformed_yaml_is_error() {
        let err = load("jobs:\n  a: [\n").unwrap_err();
        assert!(err.pos.line >= 2);
    }

    #[test]
    fn empty_document_is_none() {
        assert!(load("").unwrap().is_none());
    }
}
