//! Path pattern compilation.
//!
//! A pattern such as `/users/:id/files/:name.:ext?` is compiled into a single
//! anchored regular expression. Supported syntax:
//!
//! | Syntax        | Meaning                                                   |
//! |---------------|-----------------------------------------------------------|
//! | `:name`       | named segment, up to the next `/` (or `.` after a `.`)     |
//! | `:name(re)`   | named segment constrained by a custom expression           |
//! | `:name?`      | optional segment, its leading `/` or `.` included          |
//! | `*`           | positional capture of anything, including `/`              |
//! | `?` `+` `()`  | passed through as regex operators on the preceding literal |
//! | `\c`          | literal `c`                                                |
//!
//! Matching is case-insensitive unless `sensitive` is set, and ignores a single
//! trailing slash unless `strict` is set. A non-terminal pattern (`end = false`)
//! matches any path that continues with `/` (or ends) after the pattern; the
//! consumed prefix never includes that separator.

use {
    super::params::Params,
    crate::{Result, utils::decode_param},
    regex::Regex,
};

const TAIL_GROUP: &str = "tail";

/// Compilation options for a [`PathPattern`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MatchOptions {
    pub sensitive: bool,
    pub strict: bool,
    /// When false the pattern only needs to match a prefix of the path.
    pub end: bool,
}

/// A parameter key declared by a pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Key {
    pub name: String,
    pub optional: bool,
    group: String,
}

/// Result of a successful match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathMatch {
    /// The portion of the path consumed by the pattern.
    pub path: String,
    pub params: Params,
}

#[derive(Debug, Clone)]
pub struct PathPattern {
    source: String,
    regex: Regex,
    keys: Vec<Key>,
}

impl PathPattern {
    pub fn compile(source: &str, options: MatchOptions) -> Result<Self> {
        let mut compiler = Compiler::default();
        let body = match source.strip_suffix('/') {
            Some(stripped) if !options.strict => stripped,
            _ => source,
        };
        compiler.parse(body);

        let mut expr = String::with_capacity(compiler.out.len() + 24);
        if !options.sensitive {
            expr.push_str("(?i)");
        }
        expr.push('^');
        expr.push_str(&compiler.out);
        if !options.strict {
            expr.push_str("/?");
        }
        if options.end {
            expr.push('$');
        } else if !(options.strict && source.ends_with('/')) {
            expr.push_str(&format!("(?:(?P<{TAIL_GROUP}>/)|$)"));
        }

        let regex = Regex::new(&expr)?;
        tracing::trace!(path = %source, regex = %expr, "compiled path pattern");

        Ok(Self {
            source: source.to_string(),
            regex,
            keys: compiler.keys,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn keys(&self) -> &[Key] {
        &self.keys
    }

    /// Matches `path` against the pattern, percent-decoding every capture.
    ///
    /// When the same key is captured twice, a later undefined capture never
    /// replaces an earlier defined one.
    pub fn exec(&self, path: &str) -> Result<Option<PathMatch>> {
        let Some(caps) = self.regex.captures(path) else {
            return Ok(None);
        };

        let whole = caps.get(0).map_or("", |m| m.as_str());
        let consumed = if caps.name(TAIL_GROUP).is_some() {
            &whole[..whole.len() - 1]
        } else {
            whole
        };

        let mut params = Params::new();
        for key in &self.keys {
            let value = caps
                .name(&key.group)
                .map(|m| decode_param(m.as_str()))
                .transpose()?;
            if value.is_some() || !params.contains_key(&key.name) {
                params.insert(key.name.clone(), value);
            }
        }

        Ok(Some(PathMatch {
            path: consumed.to_string(),
            params,
        }))
    }
}

#[derive(Default)]
struct Compiler {
    out: String,
    keys: Vec<Key>,
    positional: usize,
    /// Trailing literal characters and their offsets in `out`, reset by any
    /// non-literal output. Used to fold a `/` or `.` into a following param.
    trailing: Vec<(char, usize)>,
}

impl Compiler {
    fn parse(&mut self, source: &str) {
        let mut chars = source.chars().peekable();
        while let Some(c) = chars.next() {
            match c {
                '\\' => {
                    if let Some(escaped) = chars.next() {
                        self.literal(escaped);
                    }
                }
                ':' => {
                    let mut name = String::new();
                    while let Some(&n) = chars.peek() {
                        if n.is_ascii_alphanumeric() || n == '_' {
                            name.push(n);
                            chars.next();
                        } else {
                            break;
                        }
                    }
                    if name.is_empty() {
                        self.literal(':');
                        continue;
                    }

                    let mut custom = None;
                    if chars.peek() == Some(&'(') {
                        chars.next();
                        let mut depth = 1;
                        let mut inner = String::new();
                        for n in chars.by_ref() {
                            match n {
                                '(' => depth += 1,
                                ')' => {
                                    depth -= 1;
                                    if depth == 0 {
                                        break;
                                    }
                                }
                                _ => {}
                            }
                            inner.push(n);
                        }
                        custom = Some(inner);
                    }

                    let optional = chars.peek() == Some(&'?');
                    if optional {
                        chars.next();
                    }
                    self.param(name, custom, optional);
                }
                '*' => {
                    let name = self.positional.to_string();
                    self.positional += 1;
                    self.capture(name, ".*".to_string(), "", false);
                }
                '(' => self.raw("(?:"),
                ')' | '?' | '+' => self.raw(&c.to_string()),
                _ => self.literal(c),
            }
        }
    }

    fn literal(&mut self, c: char) {
        self.trailing.push((c, self.out.len()));
        self.out.push_str(&regex::escape(&c.to_string()));
    }

    fn raw(&mut self, expr: &str) {
        self.trailing.clear();
        self.out.push_str(expr);
    }

    fn param(&mut self, name: String, custom: Option<String>, optional: bool) {
        let mut prefix = String::new();
        let mut format = false;
        if let Some(&('.', offset)) = self.trailing.last() {
            self.trailing.pop();
            self.out.truncate(offset);
            prefix.insert_str(0, r"\.");
            format = true;
        }
        if let Some(&('/', offset)) = self.trailing.last() {
            self.trailing.pop();
            self.out.truncate(offset);
            prefix.insert(0, '/');
        }

        let capture = custom.unwrap_or_else(|| {
            if format {
                r"[^/.]+?".to_string()
            } else {
                r"[^/]+?".to_string()
            }
        });
        self.capture(name, capture, &prefix, optional);
    }

    fn capture(&mut self, name: String, capture: String, prefix: &str, optional: bool) {
        let group = format!("k{}", self.keys.len());
        self.raw(&format!("(?:{prefix}(?P<{group}>{capture}))"));
        if optional {
            self.out.push('?');
        }
        self.keys.push(Key {
            name,
            optional,
            group,
        });
    }
}
