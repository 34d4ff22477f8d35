//! The CSS subset understood by the in-memory document.
//!
//! Supported: type and universal selectors, `#id`, `.class`, attribute tests
//! (`[a]`, `=`, `*=`, `^=`, `$=`, `~=`, optional ` i` flag), `:has(...)`, the
//! descendant and child combinators, and comma-separated lists. Anything else
//! fails to parse and matches nothing, which mirrors how a browser rejects an
//! invalid selector.

#[derive(Clone, Debug, PartialEq)]
pub struct SelectorList(pub(crate) Vec<Complex>);

#[derive(Clone, Debug, PartialEq)]
pub(crate) struct Complex {
    /// Compounds left to right; each carries the combinator that precedes it.
    pub(crate) parts: Vec<(Combinator, Compound)>,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) enum Combinator {
    Descendant,
    Child,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub(crate) struct Compound {
    pub(crate) tag: Option<String>,
    pub(crate) ids: Vec<String>,
    pub(crate) classes: Vec<String>,
    pub(crate) attrs: Vec<AttrTest>,
    pub(crate) has: Vec<SelectorList>,
}

#[derive(Clone, Debug, PartialEq)]
pub(crate) struct AttrTest {
    pub(crate) name: String,
    pub(crate) op: AttrOp,
    pub(crate) value: String,
    pub(crate) insensitive: bool,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) enum AttrOp {
    Exists,
    Equals,
    Contains,
    Prefix,
    Suffix,
    Word,
}

impl AttrTest {
    pub(crate) fn matches(&self, actual: Option<&str>) -> bool {
        let Some(actual) = actual else {
            return false;
        };
        let (actual, expected) = if self.insensitive {
            (actual.to_lowercase(), self.value.to_lowercase())
        } else {
            (actual.to_string(), self.value.clone())
        };
        match self.op {
            AttrOp::Exists => true,
            AttrOp::Equals => actual == expected,
            AttrOp::Contains => !expected.is_empty() && actual.contains(&expected),
            AttrOp::Prefix => !expected.is_empty() && actual.starts_with(&expected),
            AttrOp::Suffix => !expected.is_empty() && actual.ends_with(&expected),
            AttrOp::Word => actual.split_whitespace().any(|w| w == expected),
        }
    }
}

impl SelectorList {
    pub fn parse(input: &str) -> Result<Self, String> {
        let mut parser = Parser {
            chars: input.chars().collect(),
            pos: 0,
        };
        let list = parser.list()?;
        parser.skip_ws();
        if parser.pos < parser.chars.len() {
            return Err(format!("unexpected '{}' in selector", parser.chars[parser.pos]));
        }
        Ok(list)
    }
}

struct Parser {
    chars: Vec<char>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek();
        self.pos += 1;
        c
    }

    fn skip_ws(&mut self) -> bool {
        let start = self.pos;
        while matches!(self.peek(), Some(c) if c.is_whitespace()) {
            self.pos += 1;
        }
        self.pos > start
    }

    fn list(&mut self) -> Result<SelectorList, String> {
        let mut complexes = vec![self.complex()?];
        loop {
            self.skip_ws();
            if self.peek() == Some(',') {
                self.pos += 1;
                complexes.push(self.complex()?);
            } else {
                break;
            }
        }
        Ok(SelectorList(complexes))
    }

    fn complex(&mut self) -> Result<Complex, String> {
        self.skip_ws();
        let mut parts = vec![(Combinator::Descendant, self.compound()?)];
        loop {
            let had_ws = self.skip_ws();
            match self.peek() {
                Some('>') => {
                    self.pos += 1;
                    self.skip_ws();
                    parts.push((Combinator::Child, self.compound()?));
                }
                Some(',') | Some(')') | None => break,
                Some(_) if had_ws => parts.push((Combinator::Descendant, self.compound()?)),
                Some(c) => return Err(format!("unexpected '{c}' in selector")),
            }
        }
        Ok(Complex { parts })
    }

    fn ident(&mut self) -> String {
        let mut out = String::new();
        while let Some(c) = self.peek() {
            if c.is_alphanumeric() || c == '-' || c == '_' {
                out.push(c);
                self.pos += 1;
            } else {
                break;
            }
        }
        out
    }

    fn compound(&mut self) -> Result<Compound, String> {
        let mut compound = Compound::default();
        let mut any = false;
        if self.peek() == Some('*') {
            self.pos += 1;
            any = true;
        } else {
            let tag = self.ident();
            if !tag.is_empty() {
                compound.tag = Some(tag.to_ascii_lowercase());
                any = true;
            }
        }
        loop {
            match self.peek() {
                Some('#') => {
                    self.pos += 1;
                    compound.ids.push(self.required_ident("id")?);
                }
                Some('.') => {
                    self.pos += 1;
                    compound.classes.push(self.required_ident("class")?);
                }
                Some('[') => {
                    self.pos += 1;
                    compound.attrs.push(self.attr()?);
                }
                Some(':') => {
                    self.pos += 1;
                    let name = self.ident();
                    if name != "has" || self.bump() != Some('(') {
                        return Err(format!("unsupported pseudo-class :{name}"));
                    }
                    let inner = self.list()?;
                    self.skip_ws();
                    if self.bump() != Some(')') {
                        return Err("unterminated :has(".to_string());
                    }
                    compound.has.push(inner);
                }
                _ => break,
            }
            any = true;
        }
        if any {
            Ok(compound)
        } else {
            Err("empty compound selector".to_string())
        }
    }

    fn required_ident(&mut self, what: &str) -> Result<String, String> {
        let ident = self.ident();
        if ident.is_empty() {
            Err(format!("missing {what} name"))
        } else {
            Ok(ident)
        }
    }

    fn attr(&mut self) -> Result<AttrTest, String> {
        self.skip_ws();
        let name = self.required_ident("attribute")?.to_ascii_lowercase();
        self.skip_ws();
        let op = match self.peek() {
            Some(']') => {
                self.pos += 1;
                return Ok(AttrTest {
                    name,
                    op: AttrOp::Exists,
                    value: String::new(),
                    insensitive: false,
                });
            }
            Some('=') => AttrOp::Equals,
            Some('*') => AttrOp::Contains,
            Some('^') => AttrOp::Prefix,
            Some('$') => AttrOp::Suffix,
            Some('~') => AttrOp::Word,
            _ => return Err("malformed attribute selector".to_string()),
        };
        self.pos += 1;
        if op != AttrOp::Equals && self.bump() != Some('=') {
            return Err("malformed attribute operator".to_string());
        }
        self.skip_ws();
        let value = match self.peek() {
            Some(q) if q == '\'' || q == '"' => {
                self.pos += 1;
                let mut out = String::new();
                loop {
                    match self.bump() {
                        Some(c) if c == q => break,
                        Some(c) => out.push(c),
                        None => return Err("unterminated attribute value".to_string()),
                    }
                }
                out
            }
            _ => self.ident(),
        };
        self.skip_ws();
        let mut insensitive = false;
        if matches!(self.peek(), Some('i') | Some('I')) {
            self.pos += 1;
            insensitive = true;
            self.skip_ws();
        }
        if self.bump() != Some(']') {
            return Err("unterminated attribute selector".to_string());
        }
        Ok(AttrTest {
            name,
            op,
            value,
            insensitive,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_lists_and_combinators() {
        let list = SelectorList::parse("select[id*='TipoDeclaracion'], form > input[type=file]")
            .expect("valid selector");
        assert_eq!(list.0.len(), 2);
        assert_eq!(list.0[1].parts.len(), 2);
        assert_eq!(list.0[1].parts[1].0, Combinator::Child);
        let attr = &list.0[0].parts[0].1.attrs[0];
        assert_eq!(attr.op, AttrOp::Contains);
        assert_eq!(attr.value, "TipoDeclaracion");
    }

    #[test]
    fn parses_case_flag_and_has() {
        let list = SelectorList::parse("button:has(svg), [aria-label*='eliminar' i]")
            .expect("valid selector");
        assert_eq!(list.0[0].parts[0].1.has.len(), 1);
        assert!(list.0[1].parts[0].1.attrs[0].insensitive);
    }

    #[test]
    fn rejects_unsupported_syntax() {
        assert!(SelectorList::parse("div:nth-child(2)").is_err());
        assert!(SelectorList::parse("[id='open").is_err());
        assert!(SelectorList::parse("").is_err());
    }
}
