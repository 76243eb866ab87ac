//! Response shape detection
//!
//! Collection endpoints answer either with a bare array or with the array
//! nested under a conventional wrapper key. Detection is an ordered list of
//! rules; the first rule that matches decides the page's items.

use serde_json::Value;

/// Conventional top-level keys that wrap a result array, in priority order.
pub const WRAPPER_KEYS: [&str; 6] = ["data", "items", "results", "content", "records", "rows"];

/// Hypermedia collection key (`{"_embedded": {"sessions": [...]}}`).
pub const EMBEDDED_KEY: &str = "_embedded";

/// One shape-detection rule: a predicate plus an extractor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShapeRule {
    /// The body is itself an array.
    BareArray,
    /// The body is an object holding an array under this key.
    WrapperKey(&'static str),
    /// A hypermedia `_embedded` object holding an array.
    EmbeddedCollection,
    /// The first property (document order) whose value is an array.
    FirstArrayProperty,
}

pub const SHAPE_RULES: [ShapeRule; 9] = [
    ShapeRule::BareArray,
    ShapeRule::WrapperKey(WRAPPER_KEYS[0]),
    ShapeRule::WrapperKey(WRAPPER_KEYS[1]),
    ShapeRule::WrapperKey(WRAPPER_KEYS[2]),
    ShapeRule::WrapperKey(WRAPPER_KEYS[3]),
    ShapeRule::WrapperKey(WRAPPER_KEYS[4]),
    ShapeRule::WrapperKey(WRAPPER_KEYS[5]),
    ShapeRule::EmbeddedCollection,
    ShapeRule::FirstArrayProperty,
];

impl ShapeRule {
    pub fn matches(self, body: &Value) -> bool {
        self.extract(body).is_some()
    }

    pub fn extract(self, body: &Value) -> Option<&Vec<Value>> {
        match self {
            Self::BareArray => body.as_array(),
            Self::WrapperKey(key) => body.get(key).and_then(Value::as_array),
            Self::EmbeddedCollection => body
                .get(EMBEDDED_KEY)
                .and_then(Value::as_object)
                .and_then(|embedded| embedded.values().find_map(Value::as_array)),
            Self::FirstArrayProperty => body
                .as_object()
                .and_then(|map| map.values().find_map(Value::as_array)),
        }
    }
}

/// Items on a page; an unrecognised shape counts as an empty page.
pub fn extract_items(body: &Value) -> Vec<Value> {
    detect_shape(body)
        .and_then(|rule| rule.extract(body))
        .cloned()
        .unwrap_or_default()
}

/// Name of the rule that matched, for diagnostics.
pub fn detect_shape(body: &Value) -> Option<ShapeRule> {
    SHAPE_RULES.iter().copied().find(|rule| rule.matches(body))
}

/// A documented "next page" link is present and non-empty.
pub fn has_next_link(body: &Value) -> bool {
    let candidates = [
        body.get("next"),
        body.pointer("/links/next"),
        body.pointer("/_links/next/href"),
        body.pointer("/_links/next"),
        body.pointer("/meta/next"),
        body.pointer("/paging/next"),
    ];
    candidates.into_iter().flatten().any(|link| match link {
        Value::String(s) => !s.trim().is_empty(),
        Value::Object(map) => map
            .get("href")
            .and_then(Value::as_str)
            .is_some_and(|href| !href.trim().is_empty()),
        _ => false,
    })
}

/// A meta flag signals that more data exists.
pub fn has_more_flag(body: &Value) -> bool {
    ["/meta/hasMore", "/meta/has_more", "/hasMore", "/has_more", "/meta/hasNextPage"]
        .iter()
        .filter_map(|pointer| body.pointer(pointer))
        .any(|flag| flag.as_bool().unwrap_or(false))
}
