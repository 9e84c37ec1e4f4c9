//! Label-based read access: the authorizations a scan runs with and the
//! visibility expressions attached to written columns.

use crate::error::{Error, Result};
use std::collections::BTreeSet;
use std::fmt;

/// Set of labels a reader holds.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Authorizations {
    labels: BTreeSet<Vec<u8>>,
}

impl Authorizations {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn new<I, S>(labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<[u8]>,
    {
        Self {
            labels: labels.into_iter().map(|l| l.as_ref().to_vec()).collect(),
        }
    }

    pub fn contains(&self, label: &[u8]) -> bool {
        self.labels.contains(label)
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &[u8]> {
        self.labels.iter().map(|l| l.as_slice())
    }
}

impl fmt::Display for Authorizations {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let labels: Vec<_> = self
            .labels
            .iter()
            .map(|l| String::from_utf8_lossy(l).into_owned())
            .collect();
        write!(f, "{}", labels.join(","))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Node {
    Label(Vec<u8>),
    And(Vec<Node>),
    Or(Vec<Node>),
}

impl Node {
    fn evaluate(&self, auths: &Authorizations) -> bool {
        match self {
            Node::Label(label) => auths.contains(label),
            Node::And(children) => children.iter().all(|c| c.evaluate(auths)),
            Node::Or(children) => children.iter().any(|c| c.evaluate(auths)),
        }
    }
}

/// A parsed visibility expression such as `admin&(audit|ops)`.
///
/// The empty expression is visible to every reader. `&` and `|` may not be
/// mixed at one nesting level without parentheses. Labels containing
/// characters outside `[A-Za-z0-9_-:./]` must be double-quoted.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ColumnVisibility {
    expression: Vec<u8>,
    root: Option<Node>,
}

impl ColumnVisibility {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn parse(expression: impl AsRef<[u8]>) -> Result<Self> {
        let expression = expression.as_ref().to_vec();
        if expression.is_empty() {
            return Ok(Self::empty());
        }
        let mut parser = Parser {
            input: &expression,
            pos: 0,
        };
        let root = parser.expression().map_err(|reason| Error::InvalidVisibility {
            expression: String::from_utf8_lossy(&expression).into_owned(),
            reason,
        })?;
        if parser.pos != expression.len() {
            return Err(Error::InvalidVisibility {
                expression: String::from_utf8_lossy(&expression).into_owned(),
                reason: format!("unexpected character at offset {}", parser.pos),
            });
        }
        Ok(Self {
            expression,
            root: Some(root),
        })
    }

    pub fn expression(&self) -> &[u8] {
        &self.expression
    }

    pub fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    pub fn evaluate(&self, auths: &Authorizations) -> bool {
        match &self.root {
            None => true,
            Some(root) => root.evaluate(auths),
        }
    }
}

impl fmt::Display for ColumnVisibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(&self.expression))
    }
}

struct Parser<'a> {
    input: &'a [u8],
    pos: usize,
}

fn is_label_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || matches!(b, b'_' | b'-' | b':' | b'.' | b'/')
}

impl Parser<'_> {
    fn peek(&self) -> Option<u8> {
        self.input.get(self.pos).copied()
    }

    fn expression(&mut self) -> std::result::Result<Node, String> {
        let first = self.term()?;
        let op = match self.peek() {
            Some(op @ (b'&' | b'|')) => op,
            _ => return Ok(first),
        };

        let mut children = vec![first];
        while let Some(next) = self.peek() {
            match next {
                b'&' | b'|' if next == op => {
                    self.pos += 1;
                    children.push(self.term()?);
                }
                b'&' | b'|' => {
                    return Err(format!(
                        "cannot mix '&' and '|' without parentheses at offset {}",
                        self.pos
                    ))
                }
                _ => break,
            }
        }

        Ok(if op == b'&' {
            Node::And(children)
        } else {
            Node::Or(children)
        })
    }

    fn term(&mut self) -> std::result::Result<Node, String> {
        match self.peek() {
            Some(b'(') => {
                self.pos += 1;
                let node = self.expression()?;
                if self.peek() != Some(b')') {
                    return Err(format!("expected ')' at offset {}", self.pos));
                }
                self.pos += 1;
                Ok(node)
            }
            Some(b'"') => self.quoted(),
            Some(b) if is_label_byte(b) => {
                let start = self.pos;
                while self.peek().is_some_and(is_label_byte) {
                    self.pos += 1;
                }
                Ok(Node::Label(self.input[start..self.pos].to_vec()))
            }
            Some(_) => Err(format!("unexpected character at offset {}", self.pos)),
            None => Err("unexpected end of expression".to_string()),
        }
    }

    fn quoted(&mut self) -> std::result::Result<Node, String> {
        self.pos += 1;
        let mut label = Vec::new();
        loop {
            match self.peek() {
                None => return Err("unterminated quoted label".to_string()),
                Some(b'"') => {
                    self.pos += 1;
                    break;
                }
                Some(b'\\') => {
                    let escaped = self.input.get(self.pos + 1).copied();
                    match escaped {
                        Some(c @ (b'"' | b'\\')) => {
                            label.push(c);
                            self.pos += 2;
                        }
                        _ => return Err(format!("invalid escape at offset {}", self.pos)),
                    }
                }
                Some(b) => {
                    label.push(b);
                    self.pos += 1;
                }
            }
        }
        if label.is_empty() {
            return Err("empty quoted label".to_string());
        }
        Ok(Node::Label(label))
    }
}
