//! Attribute templates and expressions
//!
//! String attribute values are templates: literal text interleaved with
//! `${ ... }` expression segments. An expression is an attribute reference,
//! a quoted string, or a function call:
//!
//! ```toml
//! content = "endpoint is ${resource.cluster.main.endpoint}"
//! token   = "${secret(\"registry-token\", \"3\")}"
//! digest  = "${blake3(file(\"manifest.yaml\"))}"
//! ```
//!
//! `$${` escapes a literal `${`. A template consisting of a single
//! expression keeps the expression's value type; mixed templates render to
//! strings.

use crate::address::{Address, AttrRef};
use crate::error::EvalError;
use crate::value::{interpolate, Resolved};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde_json::Value;
use std::path::Path;

/// Built-in expression functions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Func {
    /// Read a file relative to the document directory
    File,
    /// Hex-encoded blake3 hash of the argument
    Blake3,
    Base64Encode,
    Base64Decode,
    Upper,
    Lower,
    /// Fetch a secret by (name, version) from the configured secret store
    Secret,
}

impl Func {
    fn from_name(name: &str) -> Option<Self> {
        match name {
            "file" => Some(Self::File),
            "blake3" => Some(Self::Blake3),
            "base64encode" => Some(Self::Base64Encode),
            "base64decode" => Some(Self::Base64Decode),
            "upper" => Some(Self::Upper),
            "lower" => Some(Self::Lower),
            "secret" => Some(Self::Secret),
            _ => None,
        }
    }

    fn name(self) -> &'static str {
        match self {
            Self::File => "file",
            Self::Blake3 => "blake3",
            Self::Base64Encode => "base64encode",
            Self::Base64Decode => "base64decode",
            Self::Upper => "upper",
            Self::Lower => "lower",
            Self::Secret => "secret",
        }
    }
}

/// A parsed expression inside `${ ... }`
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Reference to another node's attribute
    Ref(AttrRef),
    /// Quoted string literal
    Str(String),
    /// Function call
    Call { func: Func, args: Vec<Expr> },
}

/// One segment of a template
#[derive(Debug, Clone, PartialEq)]
pub enum Segment {
    Literal(String),
    Expr(Expr),
}

/// A parsed string attribute value
#[derive(Debug, Clone, PartialEq)]
pub struct Template {
    pub segments: Vec<Segment>,
}

/// Parse failure inside a template; the loader attaches address context
#[derive(Debug)]
pub enum TemplateError {
    Syntax(String),
    UnknownFunction(String),
}

/// Resolves references and secrets during evaluation
///
/// The planner and executor provide different implementations: the planner
/// resolves against planned values (producing `Unknown` for attributes of
/// nodes not yet created), the executor against realized values.
pub trait Resolver {
    fn resolve_attr(&self, attr: &AttrRef) -> Result<Resolved, EvalError>;
    fn resolve_secret(&self, name: &str, version: &str) -> Result<Value, EvalError>;
}

/// Context for template evaluation
pub struct EvalContext<'a> {
    /// Directory `file()` paths are resolved against
    pub base_dir: &'a Path,
    pub resolver: &'a dyn Resolver,
}

impl Template {
    /// Parse a raw string into a template
    pub fn parse(input: &str) -> Result<Self, TemplateError> {
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut rest = input;

        while let Some(pos) = rest.find("${") {
            // `$${` is an escaped literal `${`
            if pos > 0 && rest.as_bytes()[pos - 1] == b'$' {
                literal.push_str(&rest[..pos - 1]);
                literal.push_str("${");
                rest = &rest[pos + 2..];
                continue;
            }
            literal.push_str(&rest[..pos]);
            if !literal.is_empty() {
                segments.push(Segment::Literal(std::mem::take(&mut literal)));
            }
            let body = &rest[pos + 2..];
            let end = find_closing_brace(body)
                .ok_or_else(|| TemplateError::Syntax("unterminated ${ in template".into()))?;
            let mut parser = ExprParser::new(&body[..end]);
            let expr = parser.parse_expr()?;
            parser.expect_end()?;
            segments.push(Segment::Expr(expr));
            rest = &body[end + 1..];
        }
        literal.push_str(rest);
        if !literal.is_empty() || segments.is_empty() {
            segments.push(Segment::Literal(literal));
        }
        Ok(Self { segments })
    }

    /// Whether the template contains any expression segment
    pub fn is_literal(&self) -> bool {
        self.segments
            .iter()
            .all(|s| matches!(s, Segment::Literal(_)))
    }

    /// Collect every attribute reference in the template
    pub fn collect_refs(&self, out: &mut Vec<AttrRef>) {
        for segment in &self.segments {
            if let Segment::Expr(expr) = segment {
                collect_expr_refs(expr, out);
            }
        }
    }

    /// Whether any expression fetches a secret
    pub fn uses_secret(&self) -> bool {
        self.segments.iter().any(|s| match s {
            Segment::Literal(_) => false,
            Segment::Expr(e) => expr_uses_secret(e),
        })
    }

    /// Evaluate the template
    ///
    /// A single-expression template keeps the expression's value type;
    /// mixed templates concatenate into a string. Any `Unknown` reference
    /// makes the whole result `Unknown`.
    pub fn eval(&self, ctx: &EvalContext<'_>) -> Result<Resolved, EvalError> {
        if let [Segment::Expr(expr)] = self.segments.as_slice() {
            return eval_expr(expr, ctx);
        }
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(s) => out.push_str(s),
                Segment::Expr(expr) => match eval_expr(expr, ctx)? {
                    Resolved::Unknown => return Ok(Resolved::Unknown),
                    Resolved::Known(v) => out.push_str(&interpolate(&v)),
                },
            }
        }
        Ok(Resolved::Known(Value::String(out)))
    }
}

fn collect_expr_refs(expr: &Expr, out: &mut Vec<AttrRef>) {
    match expr {
        Expr::Ref(r) => out.push(r.clone()),
        Expr::Str(_) => {}
        Expr::Call { args, .. } => {
            for arg in args {
                collect_expr_refs(arg, out);
            }
        }
    }
}

fn expr_uses_secret(expr: &Expr) -> bool {
    match expr {
        Expr::Ref(_) | Expr::Str(_) => false,
        Expr::Call { func, args } => {
            *func == Func::Secret || args.iter().any(expr_uses_secret)
        }
    }
}

/// Find the `}` closing an expression, skipping over quoted strings
fn find_closing_brace(body: &str) -> Option<usize> {
    let mut in_string = false;
    let mut escaped = false;
    for (i, c) in body.char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
        } else {
            match c {
                '"' => in_string = true,
                '}' => return Some(i),
                _ => {}
            }
        }
    }
    None
}

// ============================================================================
// Expression parser
// ============================================================================

struct ExprParser<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> ExprParser<'a> {
    fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }

    fn rest(&self) -> &'a str {
        &self.input[self.pos..]
    }

    fn skip_ws(&mut self) {
        while self.rest().starts_with(|c: char| c.is_ascii_whitespace()) {
            self.pos += 1;
        }
    }

    fn peek(&mut self) -> Option<char> {
        self.skip_ws();
        self.rest().chars().next()
    }

    fn bump(&mut self, c: char) {
        self.pos += c.len_utf8();
    }

    fn expect_end(&mut self) -> Result<(), TemplateError> {
        self.skip_ws();
        if self.rest().is_empty() {
            Ok(())
        } else {
            Err(TemplateError::Syntax(format!(
                "unexpected trailing input `{}`",
                self.rest()
            )))
        }
    }

    fn parse_expr(&mut self) -> Result<Expr, TemplateError> {
        match self.peek() {
            Some('"') => self.parse_string().map(Expr::Str),
            Some(c) if c.is_ascii_lowercase() => self.parse_ident_expr(),
            Some(c) => Err(TemplateError::Syntax(format!(
                "unexpected character `{c}` in expression"
            ))),
            None => Err(TemplateError::Syntax("empty expression".into())),
        }
    }

    fn parse_string(&mut self) -> Result<String, TemplateError> {
        self.skip_ws();
        self.bump('"');
        let mut out = String::new();
        loop {
            let Some(c) = self.rest().chars().next() else {
                return Err(TemplateError::Syntax("unterminated string literal".into()));
            };
            self.bump(c);
            match c {
                '"' => return Ok(out),
                '\\' => {
                    let Some(esc) = self.rest().chars().next() else {
                        return Err(TemplateError::Syntax("unterminated escape".into()));
                    };
                    self.bump(esc);
                    match esc {
                        '"' => out.push('"'),
                        '\\' => out.push('\\'),
                        'n' => out.push('\n'),
                        't' => out.push('\t'),
                        other => {
                            return Err(TemplateError::Syntax(format!(
                                "unknown escape `\\{other}`"
                            )));
                        }
                    }
                }
                other => out.push(other),
            }
        }
    }

    fn parse_ident(&mut self) -> Result<&'a str, TemplateError> {
        self.skip_ws();
        let start = self.pos;
        while self
            .rest()
            .starts_with(|c: char| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
        {
            self.pos += 1;
        }
        if self.pos == start {
            return Err(TemplateError::Syntax("expected identifier".into()));
        }
        Ok(&self.input[start..self.pos])
    }

    fn parse_ident_expr(&mut self) -> Result<Expr, TemplateError> {
        let first = self.parse_ident()?;

        // A call: ident(...)
        if self.peek() == Some('(') {
            let func = Func::from_name(first)
                .ok_or_else(|| TemplateError::UnknownFunction(first.to_string()))?;
            self.bump('(');
            let mut args = Vec::new();
            if self.peek() != Some(')') {
                loop {
                    args.push(self.parse_expr()?);
                    match self.peek() {
                        Some(',') => self.bump(','),
                        Some(')') => break,
                        _ => {
                            return Err(TemplateError::Syntax(
                                "expected `,` or `)` in argument list".into(),
                            ));
                        }
                    }
                }
            }
            self.bump(')');
            return Ok(Expr::Call { func, args });
        }

        // A reference: kind.type.name.attr
        let mut parts = vec![first];
        while self.peek() == Some('.') {
            self.bump('.');
            parts.push(self.parse_ident()?);
        }
        let [kind, type_name, name, attr] = parts.as_slice() else {
            return Err(TemplateError::Syntax(format!(
                "reference must be `resource.<type>.<name>.<attr>` or \
                 `data.<type>.<name>.<attr>`, got `{}`",
                parts.join(".")
            )));
        };
        let address = format!("{kind}.{type_name}.{name}")
            .parse::<Address>()
            .map_err(|e| TemplateError::Syntax(e.to_string()))?;
        Ok(Expr::Ref(AttrRef {
            address,
            attr: (*attr).to_string(),
        }))
    }
}

// ============================================================================
// Evaluation
// ============================================================================

fn eval_expr(expr: &Expr, ctx: &EvalContext<'_>) -> Result<Resolved, EvalError> {
    match expr {
        Expr::Str(s) => Ok(Resolved::Known(Value::String(s.clone()))),
        Expr::Ref(attr) => ctx.resolver.resolve_attr(attr),
        Expr::Call { func, args } => eval_call(*func, args, ctx),
    }
}

fn eval_call(func: Func, args: &[Expr], ctx: &EvalContext<'_>) -> Result<Resolved, EvalError> {
    // Resolve arguments first; any unknown argument poisons the call.
    let mut values = Vec::with_capacity(args.len());
    for arg in args {
        match eval_expr(arg, ctx)? {
            Resolved::Unknown => return Ok(Resolved::Unknown),
            Resolved::Known(v) => values.push(v),
        }
    }

    let string_arg = |idx: usize| -> Result<&str, EvalError> {
        values
            .get(idx)
            .and_then(Value::as_str)
            .ok_or_else(|| EvalError::BadArgument {
                function: func.name().to_string(),
                message: format!("argument {} must be a string", idx + 1),
            })
    };
    let expect_args = |n: usize| -> Result<(), EvalError> {
        if values.len() == n {
            Ok(())
        } else {
            Err(EvalError::BadArgument {
                function: func.name().to_string(),
                message: format!("expected {n} argument(s), got {}", values.len()),
            })
        }
    };

    let value = match func {
        Func::File => {
            expect_args(1)?;
            let path = ctx.base_dir.join(string_arg(0)?);
            let content = std::fs::read_to_string(&path)
                .map_err(|source| EvalError::FileRead { path, source })?;
            Value::String(content)
        }
        Func::Blake3 => {
            expect_args(1)?;
            Value::String(blake3::hash(string_arg(0)?.as_bytes()).to_hex().to_string())
        }
        Func::Base64Encode => {
            expect_args(1)?;
            Value::String(BASE64.encode(string_arg(0)?))
        }
        Func::Base64Decode => {
            expect_args(1)?;
            let bytes = BASE64.decode(string_arg(0)?)?;
            Value::String(String::from_utf8(bytes)?)
        }
        Func::Upper => {
            expect_args(1)?;
            Value::String(string_arg(0)?.to_uppercase())
        }
        Func::Lower => {
            expect_args(1)?;
            Value::String(string_arg(0)?.to_lowercase())
        }
        Func::Secret => {
            if values.is_empty() || values.len() > 2 {
                return Err(EvalError::BadArgument {
                    function: "secret".into(),
                    message: format!("expected 1 or 2 arguments, got {}", values.len()),
                });
            }
            let name = string_arg(0)?;
            let version = if values.len() == 2 { string_arg(1)? } else { "latest" };
            ctx.resolver.resolve_secret(name, version)?
        }
    };
    Ok(Resolved::Known(value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    struct MapResolver {
        attrs: BTreeMap<String, Resolved>,
        secrets: BTreeMap<String, Value>,
    }

    impl Resolver for MapResolver {
        fn resolve_attr(&self, attr: &AttrRef) -> Result<Resolved, EvalError> {
            self.attrs
                .get(&attr.to_string())
                .cloned()
                .ok_or_else(|| EvalError::UnresolvedRef(attr.to_string(), "not in map".into()))
        }

        fn resolve_secret(&self, name: &str, _version: &str) -> Result<Value, EvalError> {
            self.secrets
                .get(name)
                .cloned()
                .ok_or_else(|| EvalError::SecretFetch {
                    name: name.into(),
                    version: "latest".into(),
                    message: "missing".into(),
                })
        }
    }

    fn resolver() -> MapResolver {
        let mut attrs = BTreeMap::new();
        attrs.insert(
            "resource.null.a.id".to_string(),
            Resolved::Known(Value::String("a-17".into())),
        );
        attrs.insert("resource.null.pending.id".to_string(), Resolved::Unknown);
        let mut secrets = BTreeMap::new();
        secrets.insert("token".to_string(), Value::String("hunter2".into()));
        MapResolver { attrs, secrets }
    }

    fn eval(input: &str) -> Resolved {
        let r = resolver();
        let ctx = EvalContext {
            base_dir: Path::new("."),
            resolver: &r,
        };
        Template::parse(input).unwrap().eval(&ctx).unwrap()
    }

    #[test]
    fn plain_literal() {
        let t = Template::parse("just text").unwrap();
        assert!(t.is_literal());
        assert_eq!(eval("just text"), Resolved::Known(Value::String("just text".into())));
    }

    #[test]
    fn escaped_interpolation() {
        assert_eq!(
            eval("cost is $${price}"),
            Resolved::Known(Value::String("cost is ${price}".into()))
        );
    }

    #[test]
    fn reference_in_mixed_template() {
        assert_eq!(
            eval("id=${resource.null.a.id}!"),
            Resolved::Known(Value::String("id=a-17!".into()))
        );
    }

    #[test]
    fn unknown_reference_poisons_template() {
        assert_eq!(eval("x${resource.null.pending.id}y"), Resolved::Unknown);
    }

    #[test]
    fn nested_function_calls() {
        assert_eq!(
            eval(r#"${upper(base64decode(base64encode("abc")))}"#),
            Resolved::Known(Value::String("ABC".into()))
        );
    }

    #[test]
    fn blake3_is_hex() {
        let Resolved::Known(Value::String(h)) = eval(r#"${blake3("x")}"#) else {
            panic!("expected known string");
        };
        assert_eq!(h.len(), 64);
        assert!(h.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn secret_lookup() {
        assert_eq!(
            eval(r#"${secret("token")}"#),
            Resolved::Known(Value::String("hunter2".into()))
        );
        let t = Template::parse(r#"${secret("token", "3")}"#).unwrap();
        assert!(t.uses_secret());
    }

    #[test]
    fn collects_references() {
        let t = Template::parse("${resource.null.a.id}-${blake3(data.env.user.value)}").unwrap();
        let mut refs = Vec::new();
        t.collect_refs(&mut refs);
        assert_eq!(refs.len(), 2);
        assert_eq!(refs[1].address, Address::data("env", "user"));
        assert_eq!(refs[1].attr, "value");
    }

    #[test]
    fn syntax_errors() {
        assert!(Template::parse("${").is_err());
        assert!(Template::parse("${resource.null.a}").is_err());
        assert!(Template::parse("${module.null.a.id}").is_err());
        assert!(Template::parse(r#"${nonsense("x")}"#).is_err());
        assert!(Template::parse(r#"${"unclosed}"#).is_err());
    }

    #[test]
    fn string_literal_may_contain_brace() {
        assert_eq!(
            eval(r#"${lower("A}B")}"#),
            Resolved::Known(Value::String("a}b".into()))
        );
    }
}
