//! Query builders over the document layout in [`crate::codec`].

use jref_docindex::{BooleanQuery, Filter, Query};

use crate::codec::{
    FIELD_CASE_INSENSITIVE_NAME, FIELD_PACKAGE_NAME, FIELD_REFERENCES, FIELD_SIMPLE_NAME,
    USAGE_SUFFIX_LEN,
};
use crate::usage::{UsageSet, UsageType};

/// How the kinds of a usage query combine.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Operator {
    /// The reference must carry every requested kind.
    And,
    /// Any requested kind is enough.
    #[default]
    Or,
}

/// Simple-name matching used by declared type lookups.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NameKind {
    Exact,
    Prefix,
    CaseInsensitivePrefix,
    /// `NPE` matches `NullPointerException`.
    CamelCase,
    /// Camel case, or a case-insensitive prefix.
    CaseInsensitiveCamelCase,
    Regex,
    CaseInsensitiveRegex,
}

/// Types that use `name` with the requested kinds. An empty kind set matches
/// any usage.
pub fn usages_query(name: &str, kinds: UsageSet, operator: Operator) -> Query {
    if kinds.is_empty() {
        return Query::wildcard(FIELD_REFERENCES, usage_pattern(name, |_| '?'));
    }
    match operator {
        Operator::And => Query::wildcard(
            FIELD_REFERENCES,
            usage_pattern(name, |kind| if kinds.contains(kind) { '+' } else { '?' }),
        ),
        Operator::Or => kinds
            .iter()
            .fold(BooleanQuery::new(), |query, wanted| {
                query.should(Query::wildcard(
                    FIELD_REFERENCES,
                    usage_pattern(name, |kind| if kind == wanted { '+' } else { '?' }),
                ))
            })
            .build(),
    }
}

fn usage_pattern(name: &str, mut mark: impl FnMut(UsageType) -> char) -> String {
    let mut pattern = String::with_capacity(name.len() + USAGE_SUFFIX_LEN);
    pattern.push_str(name);
    pattern.extend(UsageType::ALL.iter().map(|kind| mark(*kind)));
    pattern
}

pub fn declared_types_query(name: &str, kind: NameKind) -> Query {
    match kind {
        NameKind::Exact => Query::term(FIELD_SIMPLE_NAME, name),
        NameKind::Prefix => {
            if name.is_empty() {
                Query::All
            } else {
                Query::prefix(FIELD_SIMPLE_NAME, name)
            }
        }
        NameKind::CaseInsensitivePrefix => {
            if name.is_empty() {
                Query::All
            } else {
                Query::prefix(FIELD_CASE_INSENSITIVE_NAME, name.to_lowercase())
            }
        }
        NameKind::CamelCase => Query::regex(FIELD_SIMPLE_NAME, camel_case_regex(name)),
        NameKind::CaseInsensitiveCamelCase => BooleanQuery::new()
            .should(Query::regex(FIELD_SIMPLE_NAME, camel_case_regex(name)))
            .should(Query::prefix(FIELD_CASE_INSENSITIVE_NAME, name.to_lowercase()))
            .build(),
        NameKind::Regex => Query::regex(FIELD_SIMPLE_NAME, name),
        NameKind::CaseInsensitiveRegex => Query::regex(FIELD_SIMPLE_NAME, format!("(?i){name}")),
    }
}

/// Each upper-case letter starts a hump; a hump may be followed by any run of
/// lower-case letters, digits, `_` or `$`.
pub fn camel_case_regex(name: &str) -> String {
    const HUMP_TAIL: &str = r"[\p{Ll}\p{Nd}_$]*";

    let mut out = String::new();
    let mut hump = String::new();
    for c in name.chars() {
        if c.is_uppercase() && !hump.is_empty() {
            out.push_str(&regex::escape(&hump));
            out.push_str(HUMP_TAIL);
            hump.clear();
        }
        hump.push(c);
    }
    out.push_str(&regex::escape(&hump));
    out.push_str(".*");
    out
}

/// Restricts a query to a set of packages.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PackageFilter {
    packages: Vec<String>,
}

impl PackageFilter {
    /// `None` when the scope is unrestricted.
    pub fn for_scope<I, S>(packages: I) -> Option<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut packages: Vec<String> = packages.into_iter().map(Into::into).collect();
        packages.sort();
        packages.dedup();
        (!packages.is_empty()).then_some(Self { packages })
    }

    pub fn packages(&self) -> &[String] {
        &self.packages
    }

    /// A single package becomes a required term clause; several become a
    /// postings filter.
    pub fn apply(&self, query: Query) -> Query {
        match self.packages.as_slice() {
            [package] => BooleanQuery::new()
                .must(query)
                .must(Query::term(FIELD_PACKAGE_NAME, package.as_str()))
                .build(),
            packages => query.filtered(Filter::TermSet {
                field: FIELD_PACKAGE_NAME.to_string(),
                values: packages.to_vec(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn and_packs_kinds_into_one_wildcard() {
        let kinds = UsageSet::of(&[UsageType::SuperClass, UsageType::MethodReference]);
        assert_eq!(
            usages_query("a.B", kinds, Operator::And),
            Query::wildcard(FIELD_REFERENCES, "a.B+??+??")
        );
    }

    #[test]
    fn or_unions_one_clause_per_kind() {
        let kinds = UsageSet::of(&[UsageType::SuperClass, UsageType::TypeReference]);
        assert_eq!(
            usages_query("a.B", kinds, Operator::Or),
            BooleanQuery::new()
                .should(Query::wildcard(FIELD_REFERENCES, "a.B+?????"))
                .should(Query::wildcard(FIELD_REFERENCES, "a.B????+?"))
                .build()
        );
        assert_eq!(
            usages_query("a.B", UsageSet::empty(), Operator::Or),
            Query::wildcard(FIELD_REFERENCES, "a.B??????")
        );
    }

    #[test]
    fn camel_case_humps() {
        let re = regex::Regex::new(&format!("^(?:{})$", camel_case_regex("NPE"))).unwrap();
        assert!(re.is_match("NullPointerException"));
        assert!(!re.is_match("NoSuchFieldError"));
        let re = regex::Regex::new(&format!("^(?:{})$", camel_case_regex("ArrL"))).unwrap();
        assert!(re.is_match("ArrayList"));
    }

    #[test]
    fn scope_with_one_package_is_a_term_clause() {
        let single = PackageFilter::for_scope(["a"]).unwrap();
        assert_eq!(
            single.apply(Query::All),
            BooleanQuery::new()
                .must(Query::All)
                .must(Query::term(FIELD_PACKAGE_NAME, "a"))
                .build()
        );

        let multi = PackageFilter::for_scope(["b", "a", "b"]).unwrap();
        assert_eq!(multi.packages().to_vec(), vec!["a".to_string(), "b".to_string()]);
        assert!(matches!(multi.apply(Query::All), Query::Filtered { .. }));
        assert_eq!(PackageFilter::for_scope(Vec::<String>::new()), None);
    }
}
