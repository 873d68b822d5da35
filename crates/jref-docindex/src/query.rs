use crate::error::Result;
use crate::segment::compile_anchored;

/// Query tree evaluated against a segment's postings.
///
/// All term matching is exact and case-sensitive; case-insensitive lookups
/// are expressed by querying lower-cased fields or with an `(?i)` regex.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Query {
    /// Every live document.
    All,
    Term { field: String, value: String },
    Prefix { field: String, prefix: String },
    /// `?` matches exactly one character, `*` any run of characters.
    Wildcard { field: String, pattern: String },
    /// Anchored: the whole term must match.
    Regex { field: String, pattern: String },
    Boolean(BooleanQuery),
    /// `query` restricted to documents accepted by `filter`.
    Filtered { query: Box<Query>, filter: Filter },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Occur {
    Must,
    Should,
    MustNot,
}

/// Lucene-style boolean combination.
///
/// With at least one `Must` clause the `Should` clauses do not restrict the
/// result. Without `Must` clauses at least one `Should` clause must match. A
/// query made only of `MustNot` clauses matches nothing.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BooleanQuery {
    pub clauses: Vec<(Query, Occur)>,
}

impl BooleanQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(mut self, query: Query, occur: Occur) -> Self {
        self.clauses.push((query, occur));
        self
    }

    pub fn must(self, query: Query) -> Self {
        self.add(query, Occur::Must)
    }

    pub fn should(self, query: Query) -> Self {
        self.add(query, Occur::Should)
    }

    pub fn must_not(self, query: Query) -> Self {
        self.add(query, Occur::MustNot)
    }

    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    pub fn build(self) -> Query {
        Query::Boolean(self)
    }
}

/// Document-level filter evaluated once into a [`crate::DocSet`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Filter {
    /// Union of the postings of every `(field, value)` term.
    TermSet { field: String, values: Vec<String> },
}

impl Query {
    pub fn term(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self::Term {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn prefix(field: impl Into<String>, prefix: impl Into<String>) -> Self {
        Self::Prefix {
            field: field.into(),
            prefix: prefix.into(),
        }
    }

    pub fn wildcard(field: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self::Wildcard {
            field: field.into(),
            pattern: pattern.into(),
        }
    }

    pub fn regex(field: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self::Regex {
            field: field.into(),
            pattern: pattern.into(),
        }
    }

    pub fn filtered(self, filter: Filter) -> Self {
        Self::Filtered {
            query: Box::new(self),
            filter,
        }
    }

    /// Fails on regex patterns that do not compile.
    pub fn validate(&self) -> Result<()> {
        match self {
            Query::Regex { pattern, .. } => compile_anchored(pattern).map(drop),
            Query::Boolean(boolean) => boolean
                .clauses
                .iter()
                .try_for_each(|(clause, _)| clause.validate()),
            Query::Filtered { query, .. } => query.validate(),
            Query::All | Query::Term { .. } | Query::Prefix { .. } | Query::Wildcard { .. } => Ok(()),
        }
    }
}

/// Literal run before the first wildcard metacharacter.
pub(crate) fn wildcard_literal_prefix(pattern: &str) -> &str {
    let end = pattern.find(['*', '?']).unwrap_or(pattern.len());
    &pattern[..end]
}

pub(crate) fn wildcard_matches(pattern: &str, text: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let text: Vec<char> = text.chars().collect();

    let (mut p, mut t) = (0usize, 0usize);
    let mut backtrack: Option<(usize, usize)> = None;
    while t < text.len() {
        match pattern.get(p) {
            Some('*') => {
                backtrack = Some((p, t));
                p += 1;
            }
            Some(&c) if c == '?' || c == text[t] => {
                p += 1;
                t += 1;
            }
            _ => match backtrack {
                Some((star_p, star_t)) => {
                    p = star_p + 1;
                    t = star_t + 1;
                    backtrack = Some((star_p, star_t + 1));
                }
                None => return false,
            },
        }
    }
    pattern[p..].iter().all(|c| *c == '*')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wildcard_semantics() {
        assert!(wildcard_matches("java.util.List??????", "java.util.List+-----"));
        assert!(!wildcard_matches("java.util.List??????", "java.util.List+----"));
        assert!(wildcard_matches("java.util.List+?+???", "java.util.List+-+---"));
        assert!(!wildcard_matches("java.util.List+?+???", "java.util.List+--+--"));
        assert!(wildcard_matches("a*c", "abbbc"));
        assert!(wildcard_matches("a*", "a"));
        assert!(!wildcard_matches("a*d", "abc"));
    }

    #[test]
    fn literal_prefix_stops_at_metacharacters() {
        assert_eq!(wildcard_literal_prefix("java.util.List??????"), "java.util.List");
        assert_eq!(wildcard_literal_prefix("*x"), "");
        assert_eq!(wildcard_literal_prefix("abc"), "abc");
    }
}
