//! Block-tag parser.
//!
//! Walks the segment stream keeping an explicit stack of open blocks.
//! Opening tags (`for`, `if`, block `set`) push a frame; nodes are
//! collected into the frame on top; `elseif`/`else` start a new branch
//! inside the top frame; `end<tag>` pops it and appends the finished
//! node to its parent.

use std::mem;

use crate::ast::{Expr, Node};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::lexer::{split_segments, Segment, SegmentKind, Token};
use crate::parser::{parse_expression, Parser};

enum FrameKind {
    Root,
    For {
        key: Option<String>,
        value: String,
        iterable: Expr,
        /// Main body, once `{% else %}` has been seen.
        body: Option<Vec<Node>>,
    },
    If {
        branches: Vec<(Expr, Vec<Node>)>,
        /// Condition of the branch being collected; `None` inside `else`.
        pending: Option<Expr>,
    },
    Set {
        name: String,
    },
}

struct Frame<'a> {
    kind: FrameKind,
    /// Source of the opening tag, e.g. `for item in items`.
    opener: &'a str,
    position: usize,
    nodes: Vec<Node>,
}

impl<'a> Frame<'a> {
    fn tag(&self) -> &'static str {
        match self.kind {
            FrameKind::Root => "",
            FrameKind::For { .. } => "for",
            FrameKind::If { .. } => "if",
            FrameKind::Set { .. } => "set",
        }
    }

    /// Turn a closed frame into its node. The root frame has none.
    fn finish(self) -> Option<Node> {
        let node = match self.kind {
            FrameKind::Root => return None,
            FrameKind::For {
                key,
                value,
                iterable,
                body,
            } => {
                let (body, else_body) = match body {
                    Some(body) => (body, Some(self.nodes)),
                    None => (self.nodes, None),
                };
                Node::For {
                    key,
                    value,
                    iterable,
                    body,
                    else_body,
                }
            }
            FrameKind::If {
                mut branches,
                pending,
            } => {
                let else_body = match pending {
                    Some(condition) => {
                        branches.push((condition, self.nodes));
                        None
                    }
                    None => Some(self.nodes),
                };
                Node::If {
                    branches,
                    else_body,
                }
            }
            FrameKind::Set { name } => Node::SetBlock {
                name,
                body: self.nodes,
            },
        };
        Some(node)
    }
}

struct TagParser<'a> {
    stack: Vec<Frame<'a>>,
    /// Expression nesting limit handed to every tag's parser.
    max_depth: usize,
}

impl<'a> TagParser<'a> {
    fn new(max_depth: usize) -> Self {
        Self {
            stack: vec![Frame {
                kind: FrameKind::Root,
                opener: "",
                position: 0,
                nodes: Vec::new(),
            }],
            max_depth,
        }
    }

    fn top(&mut self) -> &mut Frame<'a> {
        let last = self.stack.len() - 1;
        &mut self.stack[last]
    }

    fn push_node(&mut self, node: Node) {
        self.top().nodes.push(node);
    }

    fn open(&mut self, kind: FrameKind, segment: &Segment<'a>) {
        self.stack.push(Frame {
            kind,
            opener: segment.source.trim(),
            position: segment.position,
            nodes: Vec::new(),
        });
    }

    fn segment(&mut self, segment: Segment<'a>) -> Result<()> {
        match segment.kind {
            SegmentKind::Text => self.push_node(Node::Text(segment.source.to_string())),
            SegmentKind::Comment => {}
            SegmentKind::Output => {
                let expr = parse_expression(segment.source, segment.position, self.max_depth)?;
                self.push_node(Node::Output(expr));
            }
            SegmentKind::Logic => self.logic(segment)?,
        }
        Ok(())
    }

    fn logic(&mut self, segment: Segment<'a>) -> Result<()> {
        let mut parser =
            Parser::for_source(segment.source, segment.position)?.with_max_depth(self.max_depth);
        let tag = parser.expect_ident("tag name")?;

        match tag.as_str() {
            "set" => {
                let name = parser.expect_ident("variable name after `set`")?;
                if parser.is_at_end() {
                    self.open(FrameKind::Set { name }, &segment);
                } else {
                    parser.expect(Token::Assign)?;
                    let value = parser.parse_expr()?;
                    parser.expect_end()?;
                    self.push_node(Node::Set { name, value });
                }
            }
            "for" => {
                let first = parser.expect_ident("loop variable after `for`")?;
                let (key, value) = if parser.peek() == Some(&Token::Comma) {
                    parser.consume();
                    (Some(first), parser.expect_ident("loop value variable")?)
                } else {
                    (None, first)
                };
                parser.expect(Token::In)?;
                let iterable = parser.parse_expr()?;
                parser.expect_end()?;
                self.open(
                    FrameKind::For {
                        key,
                        value,
                        iterable,
                        body: None,
                    },
                    &segment,
                );
            }
            "if" => {
                let condition = parser.parse_expr()?;
                parser.expect_end()?;
                self.open(
                    FrameKind::If {
                        branches: Vec::new(),
                        pending: Some(condition),
                    },
                    &segment,
                );
            }
            "elseif" | "elif" => {
                let condition = parser.parse_expr()?;
                parser.expect_end()?;
                self.elseif(condition, &tag)?;
            }
            "else" => {
                parser.expect_end()?;
                self.else_branch()?;
            }
            "endfor" | "endif" | "endset" => {
                parser.expect_end()?;
                self.close(&tag)?;
            }
            _ => {
                return Err(Error::parse(
                    "unknown tag",
                    format!("`{tag}`"),
                    segment.position,
                ))
            }
        }
        Ok(())
    }

    fn elseif(&mut self, condition: Expr, tag: &str) -> Result<()> {
        let frame = self.top();
        match &frame.kind {
            FrameKind::If { pending: Some(_), .. } => {}
            FrameKind::If { pending: None, .. } => {
                return Err(Error::TagMismatch {
                    message: format!("`{tag}` after `else`"),
                    opener: Some(frame.opener.to_string()),
                })
            }
            _ => return Err(unexpected(tag, frame)),
        }

        let nodes = mem::take(&mut frame.nodes);
        if let FrameKind::If { branches, pending } = &mut frame.kind {
            if let Some(previous) = pending.replace(condition) {
                branches.push((previous, nodes));
            }
        }
        Ok(())
    }

    fn else_branch(&mut self) -> Result<()> {
        let frame = self.top();
        let repeated = match &frame.kind {
            FrameKind::If { pending, .. } => pending.is_none(),
            FrameKind::For { body, .. } => body.is_some(),
            _ => return Err(unexpected("else", frame)),
        };
        if repeated {
            return Err(Error::TagMismatch {
                message: format!("second `else` in the same `{}`", frame.tag()),
                opener: Some(frame.opener.to_string()),
            });
        }

        let nodes = mem::take(&mut frame.nodes);
        match &mut frame.kind {
            FrameKind::If { branches, pending } => {
                if let Some(previous) = pending.take() {
                    branches.push((previous, nodes));
                }
            }
            FrameKind::For { body, .. } => *body = Some(nodes),
            _ => {}
        }
        Ok(())
    }

    fn close(&mut self, end_tag: &str) -> Result<()> {
        let expected = format!("end{}", self.top().tag());
        if end_tag != expected {
            let frame = self.top();
            return Err(unexpected(end_tag, frame));
        }
        if let Some(node) = self.stack.pop().and_then(Frame::finish) {
            self.push_node(node);
        }
        Ok(())
    }

    fn finish(mut self) -> Result<Vec<Node>> {
        if self.stack.len() > 1 {
            let frame = self.top();
            return Err(Error::TagMismatch {
                message: format!(
                    "unclosed `{}` tag opened at byte {}, expected `end{}`",
                    frame.tag(),
                    frame.position,
                    frame.tag()
                ),
                opener: Some(frame.opener.to_string()),
            });
        }
        Ok(self.stack.pop().map(|root| root.nodes).unwrap_or_default())
    }
}

fn unexpected(tag: &str, frame: &Frame<'_>) -> Error {
    match frame.kind {
        FrameKind::Root => Error::TagMismatch {
            message: format!("unexpected `{tag}` with no open block"),
            opener: None,
        },
        _ => Error::TagMismatch {
            message: format!(
                "unexpected `{tag}` inside `{}` opened at byte {}",
                frame.tag(),
                frame.position
            ),
            opener: Some(frame.opener.to_string()),
        },
    }
}

/// Compile template source into its node forest.
pub fn parse_template(source: &str, config: &Config) -> Result<Vec<Node>> {
    let mut parser = TagParser::new(config.max_depth);
    for segment in split_segments(source, config.trim_blocks)? {
        parser.segment(segment)?;
    }
    parser.finish()
}
