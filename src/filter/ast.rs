//! Filter AST and key resolution.

/// Parsed filter node. Exactly five variants; `And`/`Or` carry at least one
/// child (the parser rejects empty lists).
#[derive(Debug, Clone, PartialEq)]
pub enum FilterAst {
    And(Vec<FilterAst>),
    Or(Vec<FilterAst>),
    Not(Box<FilterAst>),
    /// Equality on a key. `value_pos` is the byte offset of the value in the
    /// original filter string, kept so value-shape errors (e.g. a
    /// non-integer `rev`) can point into the source.
    Eq {
        key: String,
        value: String,
        value_pos: usize,
    },
    /// Presence of a key, written `(key=*)`.
    Present { key: String },
}

/// The six first-class entry fields addressable in filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopField {
    Id,
    Type,
    Name,
    Namespace,
    Version,
    Rev,
}

impl TopField {
    pub fn as_str(self) -> &'static str {
        match self {
            TopField::Id => "id",
            TopField::Type => "type",
            TopField::Name => "name",
            TopField::Namespace => "namespace",
            TopField::Version => "version",
            TopField::Rev => "rev",
        }
    }

    fn from_name(name: &str) -> Option<Self> {
        match name {
            "id" => Some(TopField::Id),
            "type" => Some(TopField::Type),
            "name" => Some(TopField::Name),
            "namespace" => Some(TopField::Namespace),
            "version" => Some(TopField::Version),
            "rev" => Some(TopField::Rev),
            _ => None,
        }
    }
}

/// A filter key classified as either a top-level field or an attribute key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolvedKey<'a> {
    Top(TopField),
    Attr(&'a str),
}

/// Classify a raw filter key.
///
/// An `attrs.` prefix forces attribute scope; the six field names resolve to
/// top-level scope; anything else is attribute shorthand (`tag` means
/// `attrs.tag`).
pub fn resolve_key(raw: &str) -> ResolvedKey<'_> {
    if let Some(rest) = raw.strip_prefix("attrs.") {
        if !rest.is_empty() {
            return ResolvedKey::Attr(rest);
        }
    }
    if let Some(field) = TopField::from_name(raw) {
        return ResolvedKey::Top(field);
    }
    ResolvedKey::Attr(raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_top_level_fields_resolve_top() {
        for name in ["id", "type", "name", "namespace", "version", "rev"] {
            assert!(matches!(resolve_key(name), ResolvedKey::Top(_)), "{name}");
        }
        assert_eq!(resolve_key("rev"), ResolvedKey::Top(TopField::Rev));
    }

    #[test]
    fn test_attrs_prefix_is_stripped() {
        assert_eq!(resolve_key("attrs.tag"), ResolvedKey::Attr("tag"));
        // Even when the remainder collides with a field name, the prefix
        // forces attribute scope.
        assert_eq!(resolve_key("attrs.name"), ResolvedKey::Attr("name"));
    }

    #[test]
    fn test_shorthand_resolves_attr() {
        assert_eq!(resolve_key("tag"), ResolvedKey::Attr("tag"));
        assert_eq!(resolve_key("capability"), ResolvedKey::Attr("capability"));
    }

    #[test]
    fn test_bare_attrs_prefix_falls_through() {
        // "attrs." with an empty remainder is not a valid strip target.
        assert_eq!(resolve_key("attrs."), ResolvedKey::Attr("attrs."));
    }
}
