//! Tree text format parser.
//!
//! Node names are resolved after the whole body is read, so children may be
//! referenced before they are defined. The first node listed is the head.

use super::{FeatureType, NodeId, Tree, TreeBuilder, TreeError};
use std::collections::HashMap;
use thiserror::Error;

/// Errors raised while parsing the tree text format.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("line {line}: {message}")]
    Syntax { line: usize, message: String },

    #[error("undefined node '{name}'")]
    UndefinedNode { name: String },

    #[error("node '{name}' is defined twice")]
    DuplicateNode { name: String },

    #[error(transparent)]
    Tree(#[from] TreeError),
}

/// Parse a single annotated tree.
pub fn parse_tree(text: &str) -> Result<Tree, ParseError> {
    let parser = Parser::new(text);
    parser.parse()
}

#[derive(Debug)]
enum Body<'a> {
    Leaf {
        prediction: u32,
    },
    Split {
        feature: u32,
        threshold: f64,
        left: &'a str,
        right: &'a str,
    },
}

#[derive(Debug)]
struct NodeDef<'a> {
    name: &'a str,
    body: Body<'a>,
    samples: Option<u64>,
}

struct Parser<'a> {
    text: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(text: &'a str) -> Self {
        Self { text, pos: 0 }
    }

    fn parse(mut self) -> Result<Tree, ParseError> {
        self.expect_keyword("tree")?;
        let namespace = self.read_identifier()?;
        self.expect_keyword("dim")?;
        let dim = self.read_u32("dimension")?;
        let type_word = self.read_identifier()?;
        let feature_type = FeatureType::from_keyword(type_word)
            .ok_or_else(|| self.error(format!("unknown feature type '{}'", type_word)))?;
        self.expect('{')?;

        let mut defs: Vec<NodeDef<'a>> = Vec::new();
        let mut names: HashMap<&'a str, NodeId> = HashMap::new();
        while !self.try_read('}') {
            if self.is_eof() {
                return Err(self.error("expected '}' but found end of input".to_string()));
            }
            let def = self.parse_node()?;
            if names.insert(def.name, NodeId(defs.len() as u32)).is_some() {
                return Err(ParseError::DuplicateNode {
                    name: def.name.to_string(),
                });
            }
            defs.push(def);
        }

        self.skip_whitespace();
        if !self.is_eof() {
            return Err(self.error("unexpected input after tree".to_string()));
        }

        let resolve = |name: &str| {
            names.get(name).copied().ok_or_else(|| ParseError::UndefinedNode {
                name: name.to_string(),
            })
        };

        // Ids follow definition order, matching the name map above.
        let mut builder = TreeBuilder::new(namespace, dim, feature_type);
        for def in &defs {
            let id = match def.body {
                Body::Leaf { prediction } => builder.leaf(prediction),
                Body::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => builder.split(feature, threshold, resolve(left)?, resolve(right)?),
            };
            if let Some(samples) = def.samples {
                builder.set_samples(id, samples);
            }
        }

        let mut tree = builder.build(NodeId(0))?;
        tree.annotate_path_probabilities();
        Ok(tree)
    }

    fn parse_node(&mut self) -> Result<NodeDef<'a>, ParseError> {
        let name = self.read_identifier()?;
        self.expect(':')?;
        let kind = self.read_identifier()?;
        let body = match kind {
            "leaf" => Body::Leaf {
                prediction: self.read_u32("prediction")?,
            },
            "split" => {
                let feature = self.read_u32("feature index")?;
                self.expect_str("<=")?;
                let threshold = self.read_number()?;
                self.expect('?')?;
                let left = self.read_identifier()?;
                self.expect(':')?;
                let right = self.read_identifier()?;
                Body::Split {
                    feature,
                    threshold,
                    left,
                    right,
                }
            }
            other => {
                return Err(self.error(format!("expected 'leaf' or 'split' but found '{}'", other)))
            }
        };

        let samples = if self.peek_keyword("samples") {
            self.read_identifier()?;
            Some(self.read_unsigned()?)
        } else {
            None
        };

        Ok(NodeDef {
            name,
            body,
            samples,
        })
    }

    fn error(&self, message: String) -> ParseError {
        let consumed = &self.text[..self.pos.min(self.text.len())];
        ParseError::Syntax {
            line: consumed.matches('\n').count() + 1,
            message,
        }
    }

    fn is_eof(&self) -> bool {
        self.pos >= self.text.len()
    }

    fn current_char(&self) -> Option<char> {
        self.text[self.pos..].chars().next()
    }

    fn advance(&mut self) {
        if let Some(ch) = self.current_char() {
            self.pos += ch.len_utf8();
        }
    }

    fn skip_whitespace(&mut self) {
        while let Some(ch) = self.current_char() {
            if ch == ';' {
                // Skip comment line
                while let Some(ch) = self.current_char() {
                    self.advance();
                    if ch == '\n' {
                        break;
                    }
                }
            } else if ch.is_whitespace() {
                self.advance();
            } else {
                break;
            }
        }
    }

    fn try_read(&mut self, ch: char) -> bool {
        self.skip_whitespace();
        if self.current_char() == Some(ch) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, ch: char) -> Result<(), ParseError> {
        if !self.try_read(ch) {
            let found = self.current_char();
            return Err(self.error(format!("expected '{}' but found {:?}", ch, found)));
        }
        Ok(())
    }

    fn expect_str(&mut self, s: &str) -> Result<(), ParseError> {
        self.skip_whitespace();
        if self.text[self.pos..].starts_with(s) {
            self.pos += s.len();
            Ok(())
        } else {
            Err(self.error(format!("expected '{}'", s)))
        }
    }

    fn peek_keyword(&mut self, keyword: &str) -> bool {
        self.skip_whitespace();
        let rest = &self.text[self.pos..];
        rest.starts_with(keyword)
            && !rest[keyword.len()..]
                .chars()
                .next()
                .is_some_and(|c| c.is_alphanumeric() || c == '_')
    }

    fn expect_keyword(&mut self, keyword: &str) -> Result<(), ParseError> {
        let word = self.read_identifier()?;
        if word != keyword {
            return Err(self.error(format!("expected '{}' but found '{}'", keyword, word)));
        }
        Ok(())
    }

    fn read_identifier(&mut self) -> Result<&'a str, ParseError> {
        self.skip_whitespace();
        let start = self.pos;

        match self.current_char() {
            Some(ch) if ch.is_alphabetic() || ch == '_' => {}
            Some(ch) => return Err(self.error(format!("expected identifier but found '{}'", ch))),
            None => return Err(self.error("expected identifier but found end of input".to_string())),
        }

        while let Some(ch) = self.current_char() {
            if ch.is_alphanumeric() || ch == '_' {
                self.advance();
            } else {
                break;
            }
        }

        Ok(&self.text[start..self.pos])
    }

    fn read_digits(&mut self) -> &'a str {
        let start = self.pos;
        while self.current_char().is_some_and(|c| c.is_ascii_digit()) {
            self.advance();
        }
        &self.text[start..self.pos]
    }

    fn read_unsigned(&mut self) -> Result<u64, ParseError> {
        self.skip_whitespace();
        let digits = self.read_digits();
        digits
            .parse()
            .map_err(|_| self.error(format!("expected unsigned integer but found '{}'", digits)))
    }

    fn read_u32(&mut self, what: &str) -> Result<u32, ParseError> {
        let value = self.read_unsigned()?;
        u32::try_from(value).map_err(|_| self.error(format!("{} {} does not fit in 32 bits", what, value)))
    }

    fn read_number(&mut self) -> Result<f64, ParseError> {
        self.skip_whitespace();
        let start = self.pos;
        if matches!(self.current_char(), Some('-' | '+')) {
            self.advance();
        }
        self.read_digits();
        if self.current_char() == Some('.') {
            self.advance();
            self.read_digits();
        }
        if matches!(self.current_char(), Some('e' | 'E')) {
            self.advance();
            if matches!(self.current_char(), Some('-' | '+')) {
                self.advance();
            }
            self.read_digits();
        }

        let text = &self.text[start..self.pos];
        text.parse()
            .map_err(|_| self.error(format!("expected number but found '{}'", text)))
    }
}
