//! Textual type syntax used in scripts.
//!
//! ```text
//! type     := base suffix*
//! base     := "(" list ")"                  tuple
//!           | "fn" "(" list ")" "->" "(" list ")"
//!           | "$" ident                     template parameter
//!           | ident ("<" list ">")?         primitive or record
//! suffix   := "*" | "&" | "[]"
//! list     := (type ("," type)*)?
//! ```
//!
//! Primitive names: `bool`, `char`, `short`, `int`, `long`, `float`,
//! `double`, `uint`, `ulong`. Every other identifier is a record/object
//! name. This is the syntax `Type`'s `Display` produces, except that
//! template parameters carry a `$`.

use cpg_core::types::Type;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid type '{text}' at offset {offset}: {reason}")]
pub struct TypeSyntaxError {
    pub text: String,
    pub offset: usize,
    pub reason: String,
}

pub fn parse_type(text: &str) -> Result<Type, TypeSyntaxError> {
    let mut parser = Parser {
        text,
        chars: text.char_indices().collect(),
        pos: 0,
    };
    let ty = parser.parse()?;
    parser.skip_ws();
    if parser.pos < parser.chars.len() {
        return Err(parser.error("unexpected trailing input"));
    }
    Ok(ty)
}

fn primitive(name: &str) -> Option<Type> {
    Some(match name {
        "bool" | "boolean" => Type::boolean(),
        "char" => Type::char(),
        "short" => Type::short(),
        "int" => Type::int(),
        "long" => Type::long(),
        "float" => Type::float(),
        "double" => Type::double(),
        "uint" => Type::integer("uint", 32, false),
        "ulong" => Type::integer("ulong", 64, false),
        _ => return None,
    })
}

struct Parser<'a> {
    text: &'a str,
    chars: Vec<(usize, char)>,
    pos: usize,
}

impl Parser<'_> {
    fn error(&self, reason: &str) -> TypeSyntaxError {
        let offset = self
            .chars
            .get(self.pos)
            .map(|(i, _)| *i)
            .unwrap_or(self.text.len());
        TypeSyntaxError {
            text: self.text.to_string(),
            offset,
            reason: reason.to_string(),
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).map(|(_, c)| *c)
    }

    fn skip_ws(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.pos += 1;
        }
    }

    fn eat(&mut self, c: char) -> bool {
        self.skip_ws();
        if self.peek() == Some(c) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, c: char) -> Result<(), TypeSyntaxError> {
        if self.eat(c) {
            Ok(())
        } else {
            Err(self.error(&format!("expected '{c}'")))
        }
    }

    fn ident(&mut self) -> Result<String, TypeSyntaxError> {
        self.skip_ws();
        let start = self.pos;
        while self
            .peek()
            .is_some_and(|c| c.is_alphanumeric() || matches!(c, '_' | ':' | '.'))
        {
            self.pos += 1;
        }
        if start == self.pos {
            return Err(self.error("expected a type name"));
        }
        Ok(self.chars[start..self.pos].iter().map(|(_, c)| *c).collect())
    }

    fn list(&mut self, close: char) -> Result<Vec<Type>, TypeSyntaxError> {
        let mut items = Vec::new();
        if self.eat(close) {
            return Ok(items);
        }
        loop {
            items.push(self.parse()?);
            if self.eat(close) {
                return Ok(items);
            }
            self.expect(',')?;
        }
    }

    fn parse(&mut self) -> Result<Type, TypeSyntaxError> {
        let mut ty = self.base()?;
        loop {
            if self.eat('*') {
                ty = ty.pointer();
            } else if self.eat('&') {
                ty = ty.reference();
            } else if self.eat('[') {
                self.expect(']')?;
                ty = ty.array();
            } else {
                return Ok(ty);
            }
        }
    }

    fn base(&mut self) -> Result<Type, TypeSyntaxError> {
        if self.eat('(') {
            return Ok(Type::tuple(self.list(')')?));
        }
        if self.eat('$') {
            return Ok(Type::parameter(&self.ident()?));
        }
        let name = self.ident()?;
        if name == "fn" {
            self.expect('(')?;
            let params = self.list(')')?;
            self.expect('-')?;
            self.expect('>')?;
            self.expect('(')?;
            let returns = self.list(')')?;
            return Ok(Type::function(params, returns));
        }
        if let Some(p) = primitive(&name) {
            return Ok(p);
        }
        if self.eat('<') {
            return Ok(Type::generic(&name, self.list('>')?));
        }
        Ok(Type::object(&name))
    }
}
