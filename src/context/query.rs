//! Query string parsing.
//!
//! The simple parser yields a flat object where repeated keys collect into
//! arrays. The extended parser also understands bracket notation:
//!
//! | Query | Parsed |
//! |-------|--------|
//! | `a=1&a=2` | `{"a": ["1", "2"]}` |
//! | `user[name]=ann&user[age]=7` | `{"user": {"name": "ann", "age": "7"}}` |
//! | `ids[]=1&ids[]=2` | `{"ids": ["1", "2"]}` |
//! | `ids[1]=b&ids[0]=a` | `{"ids": ["a", "b"]}` |

use {
    regex::Regex,
    serde_json::{Map, Value},
    std::{collections::BTreeMap, sync::LazyLock},
    url::form_urlencoded,
};

/// Nesting below this depth is kept as a literal key.
const MAX_DEPTH: usize = 5;
/// Indices above this become object keys instead of array slots.
const ARRAY_LIMIT: usize = 20;
/// Pairs past this count are ignored.
const PARAMETER_LIMIT: usize = 1000;

static BRACKET_SEGMENT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\[[^\[\]]*\]").unwrap());

pub(crate) fn parse_simple(query: &str) -> Value {
    let mut object = Map::new();
    for (key, value) in form_urlencoded::parse(query.as_bytes()).take(PARAMETER_LIMIT) {
        let value = Value::String(value.into_owned());
        match object.get_mut(key.as_ref()) {
            Some(Value::Array(items)) => items.push(value),
            Some(existing) => {
                let first = existing.take();
                *existing = Value::Array(vec![first, value]);
            }
            None => {
                object.insert(key.into_owned(), value);
            }
        }
    }
    Value::Object(object)
}

pub(crate) fn parse_extended(query: &str) -> Value {
    let mut root = Node::Map(Vec::new());
    for (key, value) in form_urlencoded::parse(query.as_bytes()).take(PARAMETER_LIMIT) {
        if key.is_empty() {
            continue;
        }
        let segments = split_key(&key);
        let Some(node) = build(&segments, value.into_owned()) else {
            continue;
        };
        root = merge(root, node);
    }
    root.into_value()
}

/// Splits `a[b][c]` into `["a", "[b]", "[c]"]`, folding anything past
/// [`MAX_DEPTH`] into one trailing literal segment.
fn split_key(key: &str) -> Vec<String> {
    let mut segments = Vec::new();
    let mut brackets = BRACKET_SEGMENT.find_iter(key).peekable();

    let parent = match brackets.peek() {
        Some(first) => &key[..first.start()],
        None => key,
    };
    if !parent.is_empty() {
        segments.push(parent.to_string());
    }

    let mut depth = 0;
    for segment in brackets {
        if depth == MAX_DEPTH {
            segments.push(format!("[{}]", &key[segment.start()..]));
            break;
        }
        segments.push(segment.as_str().to_string());
        depth += 1;
    }
    segments
}

/// Builds the nested node for one pair, innermost segment first.
fn build(segments: &[String], value: String) -> Option<Node> {
    if segments.is_empty() {
        return None;
    }
    let mut node = Node::Str(value);
    for segment in segments.iter().rev() {
        node = wrap(segment, node);
    }
    Some(node)
}

/// Nests `node` under one key segment. Only bracketed numeric segments
/// (`[0]`, `[]`) create arrays.
fn wrap(segment: &str, node: Node) -> Node {
    if segment == "[]" {
        return Node::List(BTreeMap::from([(0, node)]));
    }
    let bracketed = segment
        .strip_prefix('[')
        .and_then(|s| s.strip_suffix(']'));
    let clean = bracketed.unwrap_or(segment);
    match clean.parse::<usize>() {
        Ok(index) if bracketed.is_some() && index.to_string() == clean && index <= ARRAY_LIMIT => {
            Node::List(BTreeMap::from([(index, node)]))
        }
        _ => Node::Map(vec![(clean.to_string(), node)]),
    }
}

/// Intermediate tree; lists are sparse until converted to JSON.
#[derive(Debug, Clone)]
enum Node {
    Str(String),
    True,
    List(BTreeMap<usize, Node>),
    Map(Vec<(String, Node)>),
}

impl Node {
    fn is_container(&self) -> bool {
        matches!(self, Node::List(_) | Node::Map(_))
    }

    fn into_map(self) -> Vec<(String, Node)> {
        match self {
            Node::Map(entries) => entries,
            Node::List(items) => items.into_iter().map(|(i, n)| (i.to_string(), n)).collect(),
            scalar => vec![("0".to_string(), scalar)],
        }
    }

    fn into_value(self) -> Value {
        match self {
            Node::Str(s) => Value::String(s),
            Node::True => Value::Bool(true),
            Node::List(items) => Value::Array(items.into_values().map(Node::into_value).collect()),
            Node::Map(entries) => Value::Object(
                entries
                    .into_iter()
                    .map(|(k, v)| (k, v.into_value()))
                    .collect(),
            ),
        }
    }
}

fn push(items: &mut BTreeMap<usize, Node>, node: Node) {
    let next = items.keys().next_back().map_or(0, |last| last + 1);
    items.insert(next, node);
}

fn merge(target: Node, source: Node) -> Node {
    match (target, source) {
        (Node::List(mut items), source @ (Node::Str(_) | Node::True)) => {
            push(&mut items, source);
            Node::List(items)
        }
        (Node::Map(mut entries), Node::Str(key)) => {
            if !entries.iter().any(|(k, _)| *k == key) {
                entries.push((key, Node::True));
            }
            Node::Map(entries)
        }
        (Node::Map(entries), Node::True) => Node::Map(entries),
        (target @ (Node::Str(_) | Node::True), source) => {
            let mut items = BTreeMap::from([(0, target)]);
            match source {
                Node::List(rest) => rest.into_values().for_each(|n| push(&mut items, n)),
                other => push(&mut items, other),
            }
            Node::List(items)
        }
        (Node::List(mut items), Node::List(source)) => {
            for (index, node) in source {
                match items.remove(&index) {
                    Some(existing) if existing.is_container() && node.is_container() => {
                        items.insert(index, merge(existing, node));
                    }
                    Some(existing) => {
                        items.insert(index, existing);
                        push(&mut items, node);
                    }
                    None => {
                        items.insert(index, node);
                    }
                }
            }
            Node::List(items)
        }
        (target, source) => {
            let mut entries = target.into_map();
            for (key, node) in source.into_map() {
                match entries.iter().position(|(k, _)| *k == key) {
                    Some(pos) => {
                        let existing = std::mem::replace(&mut entries[pos].1, Node::True);
                        entries[pos].1 = merge(existing, node);
                    }
                    None => entries.push((key, node)),
                }
            }
            Node::Map(entries)
        }
    }
}
