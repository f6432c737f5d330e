//! Path Search
//!
//! Evaluates a small JMESPath-like expression against a loosely typed JSON
//! response. Absence of data is never an error: missing fields, nulls, shape
//! mismatches and unparsable expressions all resolve to the caller's default.
//!
//! Supported syntax:
//!
//! - field access: `vault.billing.status`, quoted fields: `"x-name".id`
//! - indexing: `backups[0]`, `backups[-1]`
//! - projection: `resources[*].id` (source order is preserved)
//! - filter: `items[?name=='x'].id` (first matching element)
//! - pipe: `[*].includes|[0]`

use serde_json::Value;

/// Error raised when an expression cannot be parsed
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid path expression '{expr}' at offset {pos}: {reason}")]
pub struct PathError {
    pub expr: String,
    pub pos: usize,
    pub reason: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Comparator {
    Eq,
    Ne,
}

#[derive(Debug, Clone, PartialEq)]
enum Segment {
    Field(String),
    Index(i64),
    Wildcard,
    Filter {
        field: Vec<String>,
        cmp: Comparator,
        literal: Value,
    },
}

/// A parsed path expression
#[derive(Debug, Clone, PartialEq)]
pub struct PathExpr {
    /// Chains separated by `|`; each chain is evaluated on the previous result
    chains: Vec<Vec<Segment>>,
}

impl PathExpr {
    /// Parse an expression
    pub fn parse(expr: &str) -> Result<Self, PathError> {
        Parser::new(expr).parse()
    }

    /// Evaluate against `root`. `None` means absent (missing, null or wrong shape).
    pub fn search(&self, root: &Value) -> Option<Value> {
        let mut current = root.clone();
        for chain in &self.chains {
            current = eval(chain, &current)?;
        }
        Some(current)
    }
}

fn eval(segments: &[Segment], value: &Value) -> Option<Value> {
    let Some((head, rest)) = segments.split_first() else {
        return if value.is_null() {
            None
        } else {
            Some(value.clone())
        };
    };

    match head {
        Segment::Field(name) => eval(rest, value.as_object()?.get(name)?),
        Segment::Index(idx) => {
            let items = value.as_array()?;
            let resolved = if *idx < 0 {
                items.len().checked_sub(idx.unsigned_abs() as usize)?
            } else {
                *idx as usize
            };
            eval(rest, items.get(resolved)?)
        },
        Segment::Wildcard => {
            let items = value.as_array()?;
            let projected = items.iter().filter_map(|item| eval(rest, item)).collect();
            Some(Value::Array(projected))
        },
        Segment::Filter {
            field,
            cmp,
            literal,
        } => {
            let items = value.as_array()?;
            let matched = items
                .iter()
                .find(|item| filter_matches(item, field, *cmp, literal))?;
            eval(rest, matched)
        },
    }
}

fn filter_matches(item: &Value, field: &[String], cmp: Comparator, literal: &Value) -> bool {
    let mut current = item;
    for name in field {
        match current.get(name) {
            Some(v) => current = v,
            None => return cmp == Comparator::Ne,
        }
    }

    let equal = match (current, literal) {
        (Value::Number(a), Value::Number(b)) => a.as_f64() == b.as_f64(),
        (a, b) => a == b,
    };

    match cmp {
        Comparator::Eq => equal,
        Comparator::Ne => !equal,
    }
}

struct Parser<'a> {
    expr: &'a str,
    chars: Vec<char>,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(expr: &'a str) -> Self {
        Self {
            expr,
            chars: expr.chars().collect(),
            pos: 0,
        }
    }

    fn error(&self, reason: &str) -> PathError {
        PathError {
            expr: self.expr.to_string(),
            pos: self.pos,
            reason: reason.to_string(),
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
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

    fn expect(&mut self, c: char) -> Result<(), PathError> {
        if self.eat(c) {
            Ok(())
        } else {
            Err(self.error(&format!("expected '{}'", c)))
        }
    }

    fn parse(mut self) -> Result<PathExpr, PathError> {
        let mut chains = vec![self.parse_chain()?];
        while self.eat('|') {
            chains.push(self.parse_chain()?);
        }

        self.skip_ws();
        if self.pos < self.chars.len() {
            return Err(self.error("unexpected trailing input"));
        }

        Ok(PathExpr { chains })
    }

    fn parse_chain(&mut self) -> Result<Vec<Segment>, PathError> {
        let mut segments = Vec::new();

        loop {
            self.skip_ws();
            match self.peek() {
                Some('[') => segments.push(self.parse_bracket()?),
                Some('.') => {
                    if segments.is_empty() {
                        return Err(self.error("expression cannot start with '.'"));
                    }
                    self.pos += 1;
                    let name = self.parse_identifier()?;
                    segments.push(Segment::Field(name));
                },
                Some(c) if is_identifier_start(c) || c == '"' => {
                    if !segments.is_empty() {
                        return Err(self.error("expected '.' before field name"));
                    }
                    let name = self.parse_identifier()?;
                    segments.push(Segment::Field(name));
                },
                Some('|') | None => break,
                Some(_) => return Err(self.error("unexpected character")),
            }
        }

        if segments.is_empty() {
            return Err(self.error("empty expression"));
        }

        Ok(segments)
    }

    fn parse_identifier(&mut self) -> Result<String, PathError> {
        self.skip_ws();
        match self.peek() {
            Some('"') => {
                self.pos += 1;
                let start = self.pos;
                while self.peek().is_some_and(|c| c != '"') {
                    self.pos += 1;
                }
                if self.peek() != Some('"') {
                    return Err(self.error("unterminated quoted field"));
                }
                let name: String = self.chars[start..self.pos].iter().collect();
                self.pos += 1;
                Ok(name)
            },
            Some(c) if is_identifier_start(c) => {
                let start = self.pos;
                while self.peek().is_some_and(is_identifier_char) {
                    self.pos += 1;
                }
                Ok(self.chars[start..self.pos].iter().collect())
            },
            _ => Err(self.error("expected field name")),
        }
    }

    fn parse_bracket(&mut self) -> Result<Segment, PathError> {
        self.expect('[')?;

        if self.eat('*') {
            self.expect(']')?;
            return Ok(Segment::Wildcard);
        }

        if self.eat('?') {
            let mut field = vec![self.parse_identifier()?];
            while self.eat('.') {
                field.push(self.parse_identifier()?);
            }

            self.skip_ws();
            let cmp = match (self.peek(), self.chars.get(self.pos + 1).copied()) {
                (Some('='), Some('=')) => Comparator::Eq,
                (Some('!'), Some('=')) => Comparator::Ne,
                _ => return Err(self.error("expected '==' or '!='")),
            };
            self.pos += 2;

            let literal = self.parse_literal()?;
            self.expect(']')?;
            return Ok(Segment::Filter {
                field,
                cmp,
                literal,
            });
        }

        self.skip_ws();
        let start = self.pos;
        if self.peek() == Some('-') {
            self.pos += 1;
        }
        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.pos += 1;
        }
        let raw: String = self.chars[start..self.pos].iter().collect();
        let index = raw
            .parse::<i64>()
            .map_err(|_| self.error("expected index, '*' or '?'"))?;
        self.expect(']')?;

        Ok(Segment::Index(index))
    }

    fn parse_literal(&mut self) -> Result<Value, PathError> {
        self.skip_ws();
        let delimiter = match self.peek() {
            Some(c @ ('\'' | '`')) => c,
            _ => return Err(self.error("expected literal")),
        };
        self.pos += 1;

        let start = self.pos;
        while self.peek().is_some_and(|c| c != delimiter) {
            self.pos += 1;
        }
        if self.peek() != Some(delimiter) {
            return Err(self.error("unterminated literal"));
        }
        let raw: String = self.chars[start..self.pos].iter().collect();
        self.pos += 1;

        if delimiter == '\'' {
            return Ok(Value::String(raw));
        }

        serde_json::from_str(&raw).map_err(|_| self.error("invalid JSON literal"))
    }
}

fn is_identifier_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_identifier_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Search `root` for `expr`, returning `default` when nothing is found
pub fn path_search(expr: &str, root: &Value, default: Value) -> Value {
    match PathExpr::parse(expr) {
        Ok(parsed) => parsed.search(root).unwrap_or(default),
        Err(e) => {
            tracing::debug!("{}", e);
            default
        },
    }
}

/// Search for a string value
pub fn path_search_str(expr: &str, root: &Value, default: &str) -> String {
    match path_search(expr, root, Value::Null) {
        Value::String(s) => s,
        _ => default.to_string(),
    }
}

/// Search for a numeric value as `f64`
pub fn path_search_f64(expr: &str, root: &Value, default: f64) -> f64 {
    path_search(expr, root, Value::Null)
        .as_f64()
        .unwrap_or(default)
}

/// Search for an integer value. Floats are truncated, as the API reports counts as JSON numbers.
pub fn path_search_i64(expr: &str, root: &Value, default: i64) -> i64 {
    let found = path_search(expr, root, Value::Null);
    found
        .as_i64()
        .or_else(|| found.as_f64().map(|f| f as i64))
        .unwrap_or(default)
}

pub fn path_search_bool(expr: &str, root: &Value, default: bool) -> bool {
    path_search(expr, root, Value::Null)
        .as_bool()
        .unwrap_or(default)
}

/// Search for a list; anything that is not an array yields an empty list
pub fn path_search_array(expr: &str, root: &Value) -> Vec<Value> {
    match path_search(expr, root, Value::Null) {
        Value::Array(items) => items,
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc() -> Value {
        json!({
            "vault": {
                "id": "v-1",
                "billing": {"status": "available", "size": 100, "allocated": 2048.5},
                "resources": [
                    {
                        "id": "r-1",
                        "extra_info": {"include_volumes": [{"id": "vol-1"}, {"id": "vol-2"}]}
                    },
                    {"id": "r-2", "extra_info": {}},
                    {"name": "no-id"}
                ],
                "description": null
            },
            "items": [
                {"name": "a", "id": "id-a", "size": 1},
                {"name": "x", "id": "id-x", "size": 2},
                {"name": "x", "id": "id-x2", "size": 2}
            ],
            "backups": []
        })
    }

    #[test]
    fn test_plain_field_access() {
        let d = doc();
        assert_eq!(path_search("vault.id", &d, Value::Null), json!("v-1"));
        assert_eq!(
            path_search("vault.billing.size", &d, Value::Null),
            json!(100)
        );
    }

    #[test]
    fn test_missing_field_returns_default() {
        let d = doc();
        let default = json!({"marker": true});
        assert_eq!(path_search("vault.nope.deeper", &d, default.clone()), default);
    }

    #[test]
    fn test_explicit_null_returns_default() {
        let d = doc();
        assert_eq!(
            path_search("vault.description", &d, json!("fallback")),
            json!("fallback")
        );
    }

    #[test]
    fn test_index_on_empty_list_returns_default() {
        let d = doc();
        assert_eq!(
            path_search("backups[0].id", &d, json!("none")),
            json!("none")
        );
    }

    #[test]
    fn test_index_and_negative_index() {
        let d = doc();
        assert_eq!(path_search("items[1].id", &d, Value::Null), json!("id-x"));
        assert_eq!(path_search("items[-1].id", &d, Value::Null), json!("id-x2"));
        assert_eq!(path_search("items[-4].id", &d, json!(0)), json!(0));
        assert_eq!(path_search("items[9].id", &d, json!(0)), json!(0));
    }

    #[test]
    fn test_wildcard_projection_preserves_order_and_skips_missing() {
        let d = doc();
        assert_eq!(
            path_search("vault.resources[*].id", &d, Value::Null),
            json!(["r-1", "r-2"])
        );
        assert_eq!(
            path_search(
                "vault.resources[*].extra_info.include_volumes[*].id",
                &d,
                Value::Null
            ),
            json!([["vol-1", "vol-2"]])
        );
    }

    #[test]
    fn test_projection_over_empty_list_is_empty_list() {
        let d = doc();
        assert_eq!(path_search("backups[*].id", &d, Value::Null), json!([]));
    }

    #[test]
    fn test_filter_single_match() {
        let d = json!({"items": [{"name": "a", "id": 1}, {"name": "x", "id": 2}]});
        assert_eq!(
            path_search("items[?name=='x'].id", &d, Value::Null),
            json!(2)
        );
    }

    #[test]
    fn test_filter_no_match_returns_default() {
        let d = doc();
        assert_eq!(
            path_search("items[?name=='zzz'].id", &d, json!("default")),
            json!("default")
        );
    }

    #[test]
    fn test_filter_picks_first_of_many() {
        let d = doc();
        assert_eq!(
            path_search("items[?name=='x'].id", &d, Value::Null),
            json!("id-x")
        );
    }

    #[test]
    fn test_filter_with_json_literal_and_not_equal() {
        let d = doc();
        assert_eq!(
            path_search("items[?size==`2`].id", &d, Value::Null),
            json!("id-x")
        );
        assert_eq!(
            path_search("items[?name!='a'].id", &d, Value::Null),
            json!("id-x")
        );
    }

    #[test]
    fn test_pipe_stops_projection() {
        let d = json!([{"includes": ["a", "b"]}, {"includes": ["c"]}]);
        assert_eq!(
            path_search("[*].includes|[0]", &d, Value::Null),
            json!(["a", "b"])
        );
        assert_eq!(
            path_search("[*].includes[0]", &d, Value::Null),
            json!(["a", "c"])
        );
    }

    #[test]
    fn test_quoted_field() {
        let d = json!({"x-auth": {"token": "t"}});
        assert_eq!(path_search("\"x-auth\".token", &d, Value::Null), json!("t"));
    }

    #[test]
    fn test_shape_mismatch_returns_default() {
        let d = doc();
        assert_eq!(path_search("vault.id[0]", &d, json!(-1)), json!(-1));
        assert_eq!(path_search("vault[*]", &d, json!(-1)), json!(-1));
        assert_eq!(path_search("items.name", &d, json!(-1)), json!(-1));
    }

    #[test]
    fn test_invalid_expression_returns_default() {
        let d = doc();
        for expr in ["", ".a", "a..b", "a[", "a[x]", "a[?b=c]", "a b", "a|"] {
            assert_eq!(path_search(expr, &d, json!("d")), json!("d"), "{expr}");
            assert!(PathExpr::parse(expr).is_err(), "{expr}");
        }
    }

    #[test]
    fn test_typed_helpers() {
        let d = doc();
        assert_eq!(path_search_str("vault.id", &d, ""), "v-1");
        assert_eq!(path_search_str("vault.billing.size", &d, "-"), "-");
        assert_eq!(path_search_f64("vault.billing.allocated", &d, 0.0), 2048.5);
        assert_eq!(path_search_i64("vault.billing.allocated", &d, 0), 2048);
        assert!(!path_search_bool("vault.locked", &d, false));
        assert_eq!(path_search_array("items", &d).len(), 3);
        assert!(path_search_array("vault.id", &d).is_empty());
    }
}
