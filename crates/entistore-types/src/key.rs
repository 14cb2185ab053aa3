use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Identifier of an entity within its kind.
///
/// Numeric ids are usually allocated by the datastore; names are chosen by
/// the application. Numeric ids order before names.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum KeyId {
    /// Store-allocated (or application-supplied) numeric id.
    Id(i64),
    /// Application-chosen name.
    Name(String),
}

impl KeyId {
    /// The numeric id, if this is one.
    pub fn as_id(&self) -> Option<i64> {
        match self {
            Self::Id(id) => Some(*id),
            Self::Name(_) => None,
        }
    }

    /// The name, if this is one.
    pub fn as_name(&self) -> Option<&str> {
        match self {
            Self::Id(_) => None,
            Self::Name(name) => Some(name),
        }
    }
}

impl From<i64> for KeyId {
    fn from(id: i64) -> Self {
        Self::Id(id)
    }
}

impl From<&str> for KeyId {
    fn from(name: &str) -> Self {
        Self::Name(name.to_string())
    }
}

impl From<String> for KeyId {
    fn from(name: String) -> Self {
        Self::Name(name)
    }
}

impl fmt::Display for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Id(id) => write!(f, "{id}"),
            Self::Name(name) => {
                f.write_str("\"")?;
                for c in name.chars() {
                    if c == '"' || c == '\\' {
                        f.write_str("\\")?;
                    }
                    write!(f, "{c}")?;
                }
                f.write_str("\"")
            }
        }
    }
}

impl fmt::Debug for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

/// Check that `kind` can appear in a key's text form.
///
/// Kinds must be non-empty and must not contain `(`, `)`, `/`, `"` or
/// whitespace.
pub fn validate_kind(kind: &str) -> Result<(), TypeError> {
    let invalid = |reason: &str| TypeError::InvalidKind {
        kind: kind.to_string(),
        reason: reason.to_string(),
    };
    if kind.is_empty() {
        return Err(invalid("kind must not be empty"));
    }
    if let Some(c) = kind
        .chars()
        .find(|c| matches!(c, '(' | ')' | '/' | '"') || c.is_whitespace())
    {
        return Err(invalid(&format!("character {c:?} is not allowed")));
    }
    Ok(())
}

/// Hierarchical entity key.
///
/// A key is a kind plus an id, optionally nested under a parent key. Two
/// keys are equal only when kind, id and the whole parent chain match. The
/// parent relation scopes ancestor queries; it never cascades mutations.
///
/// The text form lists the chain root first, for example
/// `Product(7)/Image("front")`.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityKey {
    kind: String,
    id: KeyId,
    parent: Option<Box<EntityKey>>,
}

impl EntityKey {
    /// Create a root key.
    pub fn new(kind: impl Into<String>, id: impl Into<KeyId>) -> Self {
        Self {
            kind: kind.into(),
            id: id.into(),
            parent: None,
        }
    }

    /// Create a key under `parent`, or a root key when `parent` is `None`.
    pub fn with_parent(
        parent: Option<EntityKey>,
        kind: impl Into<String>,
        id: impl Into<KeyId>,
    ) -> Self {
        Self {
            kind: kind.into(),
            id: id.into(),
            parent: parent.map(Box::new),
        }
    }

    /// Create a key nested directly under this one.
    pub fn child(&self, kind: impl Into<String>, id: impl Into<KeyId>) -> Self {
        Self::with_parent(Some(self.clone()), kind, id)
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn id(&self) -> &KeyId {
        &self.id
    }

    pub fn parent(&self) -> Option<&EntityKey> {
        self.parent.as_deref()
    }

    /// Returns `true` if this key has a parent.
    pub fn is_child(&self) -> bool {
        self.parent.is_some()
    }

    /// The top of the parent chain (this key if it has no parent).
    pub fn root(&self) -> &EntityKey {
        let mut key = self;
        while let Some(parent) = key.parent() {
            key = parent;
        }
        key
    }

    /// Iterate over the key chain, starting with this key itself and
    /// walking up to the root.
    pub fn ancestors(&self) -> Ancestors<'_> {
        Ancestors { next: Some(self) }
    }

    /// Returns `true` if `ancestor` appears anywhere in this key's chain,
    /// including the key itself.
    pub fn has_ancestor(&self, ancestor: &EntityKey) -> bool {
        self.ancestors().any(|key| key == ancestor)
    }

    /// Number of keys in the chain (1 for a root key).
    pub fn depth(&self) -> usize {
        self.ancestors().count()
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(parent) = self.parent() {
            write!(f, "{parent}/")?;
        }
        write!(f, "{}({})", self.kind, self.id)
    }
}

impl fmt::Debug for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EntityKey({self})")
    }
}

impl FromStr for EntityKey {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parser = KeyParser { input: s, pos: 0 };
        let (kind, id) = parser.segment()?;
        let mut key = EntityKey::new(kind, id);
        while !parser.at_end() {
            parser.expect('/')?;
            let (kind, id) = parser.segment()?;
            key = key.child(kind, id);
        }
        Ok(key)
    }
}

/// Iterator over a key and its parents. See [`EntityKey::ancestors`].
#[derive(Clone, Debug)]
pub struct Ancestors<'a> {
    next: Option<&'a EntityKey>,
}

impl<'a> Iterator for Ancestors<'a> {
    type Item = &'a EntityKey;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next?;
        self.next = current.parent();
        Some(current)
    }
}

struct KeyParser<'a> {
    input: &'a str,
    pos: usize,
}

impl KeyParser<'_> {
    fn error_at(&self, offset: usize, reason: impl Into<String>) -> TypeError {
        TypeError::MalformedKey {
            input: self.input.to_string(),
            offset,
            reason: reason.into(),
        }
    }

    fn peek(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn at_end(&self) -> bool {
        self.pos >= self.input.len()
    }

    fn expect(&mut self, want: char) -> Result<(), TypeError> {
        match self.peek() {
            Some(c) if c == want => {
                self.bump();
                Ok(())
            }
            Some(c) => Err(self.error_at(self.pos, format!("expected '{want}', found '{c}'"))),
            None => Err(self.error_at(self.pos, format!("expected '{want}', found end of input"))),
        }
    }

    fn segment(&mut self) -> Result<(String, KeyId), TypeError> {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if c == '(' || c == '/' {
                break;
            }
            self.bump();
        }
        let kind = &self.input[start..self.pos];
        if let Err(TypeError::InvalidKind { reason, .. }) = validate_kind(kind) {
            return Err(self.error_at(start, reason));
        }
        self.expect('(')?;
        let id = if self.peek() == Some('"') {
            self.name()?
        } else {
            self.number()?
        };
        self.expect(')')?;
        Ok((kind.to_string(), id))
    }

    fn number(&mut self) -> Result<KeyId, TypeError> {
        let start = self.pos;
        if self.peek() == Some('-') {
            self.bump();
        }
        while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
            self.bump();
        }
        let digits = &self.input[start..self.pos];
        digits
            .parse::<i64>()
            .map(KeyId::Id)
            .map_err(|e| self.error_at(start, format!("invalid numeric id {digits:?}: {e}")))
    }

    fn name(&mut self) -> Result<KeyId, TypeError> {
        let start = self.pos;
        self.expect('"')?;
        let mut name = String::new();
        loop {
            match self.bump() {
                Some('"') => return Ok(KeyId::Name(name)),
                Some('\\') => match self.bump() {
                    Some(c @ ('"' | '\\')) => name.push(c),
                    Some(c) => return Err(self.error_at(self.pos, format!("unknown escape '\\{c}'"))),
                    None => return Err(self.error_at(start, "unterminated name")),
                },
                Some(c) => name.push(c),
                None => return Err(self.error_at(start, "unterminated name")),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn product(id: i64) -> EntityKey {
        EntityKey::new("Product", id)
    }

    // -----------------------------------------------------------------------
    // Identity and hierarchy
    // -----------------------------------------------------------------------

    #[test]
    fn equal_keys_require_equal_parent_chains() {
        let a = product(1).child("Image", "front");
        let b = product(1).child("Image", "front");
        let c = product(2).child("Image", "front");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_ne!(a, EntityKey::new("Image", "front"));
    }

    #[test]
    fn child_keys_report_parent() {
        let parent = product(7);
        let child = parent.child("Image", 3);
        assert!(child.is_child());
        assert!(!parent.is_child());
        assert_eq!(child.parent(), Some(&parent));
        assert_eq!(child.root(), &parent);
        assert_eq!(child.depth(), 2);
    }

    #[test]
    fn ancestors_start_with_self() {
        let key = product(1).child("Image", 2).child("ChunkFile", 3);
        let kinds: Vec<&str> = key.ancestors().map(EntityKey::kind).collect();
        assert_eq!(kinds, vec!["ChunkFile", "Image", "Product"]);
    }

    #[test]
    fn has_ancestor_walks_whole_chain() {
        let root = product(1);
        let grandchild = root.child("Image", 2).child("ChunkFile", 3);
        assert!(grandchild.has_ancestor(&root));
        assert!(grandchild.has_ancestor(&grandchild));
        assert!(!grandchild.has_ancestor(&product(2)));
        assert!(!root.has_ancestor(&grandchild));
    }

    #[test]
    fn with_parent_none_is_root() {
        let key = EntityKey::with_parent(None, "Product", 4);
        assert_eq!(key, product(4));
    }

    #[test]
    fn numeric_ids_sort_before_names() {
        assert!(KeyId::Id(i64::MAX) < KeyId::Name(String::new()));
        assert!(product(1) < product(2));
    }

    #[test]
    fn key_id_accessors() {
        assert_eq!(KeyId::from(5).as_id(), Some(5));
        assert_eq!(KeyId::from("x").as_name(), Some("x"));
        assert_eq!(KeyId::from("x").as_id(), None);
    }

    // -----------------------------------------------------------------------
    // Text form
    // -----------------------------------------------------------------------

    #[test]
    fn display_lists_root_first() {
        let key = product(7).child("Image", "front");
        assert_eq!(key.to_string(), r#"Product(7)/Image("front")"#);
        assert_eq!(format!("{key:?}"), r#"EntityKey(Product(7)/Image("front"))"#);
    }

    #[test]
    fn names_are_escaped() {
        let key = EntityKey::new("File", r#"a/"b"\c"#);
        let text = key.to_string();
        assert_eq!(text, r#"File("a/\"b\"\\c")"#);
        assert_eq!(text.parse::<EntityKey>().unwrap(), key);
    }

    #[test]
    fn parse_negative_id() {
        let key: EntityKey = "Product(-3)".parse().unwrap();
        assert_eq!(key.id(), &KeyId::Id(-3));
    }

    #[test]
    fn parse_rejects_malformed_input() {
        for input in [
            "",
            "Product",
            "Product()",
            "Product(1",
            "Product(1)/",
            "Product(1)Image(2)",
            "(1)",
            r#"Product("open)"#,
            r#"Product("bad\escape")"#,
            "Product(12x)",
        ] {
            let err = input.parse::<EntityKey>().unwrap_err();
            assert!(
                matches!(err, TypeError::MalformedKey { .. }),
                "{input:?} gave {err:?}"
            );
        }
    }

    #[test]
    fn validate_kind_rules() {
        assert!(validate_kind("ChunkFile").is_ok());
        assert!(validate_kind("").is_err());
        assert!(validate_kind("a b").is_err());
        assert!(validate_kind("a/b").is_err());
    }

    #[test]
    fn serde_roundtrip() {
        let key = product(9).child("Image", "side");
        let json = serde_json::to_string(&key).unwrap();
        let parsed: EntityKey = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, key);
    }

    fn arb_segment() -> impl Strategy<Value = (String, KeyId)> {
        let id = prop_oneof![
            any::<i64>().prop_map(KeyId::Id),
            ".{0,12}".prop_map(KeyId::Name),
        ];
        ("[A-Za-z][A-Za-z0-9_]{0,10}", id)
    }

    proptest! {
        #[test]
        fn text_form_parses_back(segments in prop::collection::vec(arb_segment(), 1..5)) {
            let mut iter = segments.into_iter();
            let (kind, id) = iter.next().unwrap();
            let mut key = EntityKey::new(kind, id);
            for (kind, id) in iter {
                key = key.child(kind, id);
            }
            let parsed: EntityKey = key.to_string().parse().unwrap();
            prop_assert_eq!(parsed, key);
        }
    }
}
