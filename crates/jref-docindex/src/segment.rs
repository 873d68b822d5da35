use std::collections::BTreeMap;
use std::ops::Bound;

use crate::docset::DocSet;
use crate::document::Document;
use crate::error::{DocIndexError, Result};
use crate::query::{wildcard_literal_prefix, wildcard_matches, BooleanQuery, Filter, Occur, Query};

type Postings = BTreeMap<String, BTreeMap<String, Vec<u32>>>;

/// In-memory inverted segment. Deleted documents leave a tombstone until the
/// next [`Segment::compact`].
#[derive(Clone, Debug, Default)]
pub(crate) struct Segment {
    docs: Vec<Option<Document>>,
    postings: Postings,
    live: usize,
}

impl Segment {
    pub(crate) fn from_documents(docs: Vec<Document>) -> Self {
        let mut segment = Self::default();
        for doc in docs {
            segment.add(doc);
        }
        segment
    }

    pub(crate) fn len(&self) -> usize {
        self.live
    }

    pub(crate) fn add(&mut self, doc: Document) {
        let id = self.docs.len() as u32;
        for field in doc.fields() {
            let ids = self
                .postings
                .entry(field.name.clone())
                .or_default()
                .entry(field.value.clone())
                .or_default();
            if ids.last() != Some(&id) {
                ids.push(id);
            }
        }
        self.docs.push(Some(doc));
        self.live += 1;
    }

    /// Removes every document matched by `query`, returning how many were removed.
    pub(crate) fn delete(&mut self, query: &Query) -> Result<usize> {
        let matched = self.search(query)?;
        let mut removed = 0;
        for id in matched.iter() {
            let Some(doc) = self.docs.get_mut(id as usize).and_then(Option::take) else {
                continue;
            };
            for field in doc.fields() {
                let Some(terms) = self.postings.get_mut(&field.name) else {
                    continue;
                };
                if let Some(ids) = terms.get_mut(&field.value) {
                    if let Ok(pos) = ids.binary_search(&id) {
                        ids.remove(pos);
                    }
                    if ids.is_empty() {
                        terms.remove(&field.value);
                    }
                }
                if terms.is_empty() {
                    self.postings.remove(&field.name);
                }
            }
            self.live -= 1;
            removed += 1;
        }
        Ok(removed)
    }

    pub(crate) fn search(&self, query: &Query) -> Result<DocSet> {
        match query {
            Query::All => Ok(self.live_set()),
            Query::Term { field, value } => Ok(self
                .postings
                .get(field)
                .and_then(|terms| terms.get(value))
                .map(|ids| ids.iter().copied().collect())
                .unwrap_or_default()),
            Query::Prefix { field, prefix } => {
                Ok(self.collect_terms(field, prefix, |term| term.starts_with(prefix.as_str())))
            }
            Query::Wildcard { field, pattern } => {
                let prefix = wildcard_literal_prefix(pattern);
                Ok(self.collect_terms(field, prefix, |term| wildcard_matches(pattern, term)))
            }
            Query::Regex { field, pattern } => {
                let regex = compile_anchored(pattern)?;
                Ok(self.collect_terms(field, "", |term| regex.is_match(term)))
            }
            Query::Boolean(boolean) => self.search_boolean(boolean),
            Query::Filtered { query, filter } => {
                let mut set = self.search(query)?;
                set.intersect_with(&self.filter(filter));
                Ok(set)
            }
        }
    }

    fn search_boolean(&self, boolean: &BooleanQuery) -> Result<DocSet> {
        let mut must: Option<DocSet> = None;
        let mut should: Option<DocSet> = None;
        let mut must_not = DocSet::default();

        for (clause, occur) in &boolean.clauses {
            let set = self.search(clause)?;
            match occur {
                Occur::Must => match &mut must {
                    Some(acc) => acc.intersect_with(&set),
                    None => must = Some(set),
                },
                Occur::Should => match &mut should {
                    Some(acc) => acc.union_with(&set),
                    None => should = Some(set),
                },
                Occur::MustNot => must_not.union_with(&set),
            }
        }

        let mut result = match (must, should) {
            (Some(must), _) => must,
            (None, Some(should)) => should,
            (None, None) => return Ok(DocSet::default()),
        };
        result.difference_with(&must_not);
        Ok(result)
    }

    fn filter(&self, filter: &Filter) -> DocSet {
        match filter {
            Filter::TermSet { field, values } => {
                let mut set = DocSet::with_capacity(self.docs.len());
                if let Some(terms) = self.postings.get(field) {
                    for value in values {
                        for id in terms.get(value).into_iter().flatten() {
                            set.insert(*id);
                        }
                    }
                }
                set
            }
        }
    }

    fn collect_terms(&self, field: &str, prefix: &str, accept: impl Fn(&str) -> bool) -> DocSet {
        let mut set = DocSet::default();
        for (term, ids) in self.terms_from(field, prefix) {
            if !term.starts_with(prefix) {
                break;
            }
            if accept(term) {
                for id in ids {
                    set.insert(*id);
                }
            }
        }
        set
    }

    fn terms_from<'a>(
        &'a self,
        field: &str,
        start: &'a str,
    ) -> impl Iterator<Item = (&'a str, &'a Vec<u32>)> + 'a {
        self.postings
            .get(field)
            .into_iter()
            .flat_map(move |terms| {
                terms.range::<str, _>((Bound::Included(start), Bound::Unbounded))
            })
            .map(|(term, ids)| (term.as_str(), ids))
    }

    /// Terms of `field` with the given prefix, in order, with their document frequency.
    pub(crate) fn terms<'a>(
        &'a self,
        field: &str,
        prefix: &'a str,
    ) -> impl Iterator<Item = (&'a str, usize)> + 'a {
        self.terms_from(field, prefix)
            .take_while(move |(term, _)| term.starts_with(prefix))
            .map(|(term, ids)| (term, ids.len()))
    }

    pub(crate) fn documents(&self, set: &DocSet) -> Vec<Document> {
        set.iter()
            .filter_map(|id| self.docs.get(id as usize).and_then(Option::as_ref))
            .cloned()
            .collect()
    }

    pub(crate) fn live_documents(&self) -> impl Iterator<Item = &Document> {
        self.docs.iter().flatten()
    }

    pub(crate) fn compact(&self) -> Self {
        Self::from_documents(self.live_documents().cloned().collect())
    }

    fn live_set(&self) -> DocSet {
        self.docs
            .iter()
            .enumerate()
            .filter(|(_, doc)| doc.is_some())
            .map(|(id, _)| id as u32)
            .collect()
    }
}

pub(crate) fn compile_anchored(pattern: &str) -> Result<regex::Regex> {
    regex::Regex::new(&format!("^(?:{pattern})$")).map_err(|err| DocIndexError::InvalidRegex {
        pattern: pattern.to_string(),
        message: err.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn doc(name: &str, pkg: &str, refs: &[&str]) -> Document {
        let mut doc = Document::new()
            .with("binaryName", name)
            .with("packageName", pkg);
        for r in refs {
            doc.add("references", *r);
        }
        doc
    }

    fn names(segment: &Segment, query: &Query) -> Vec<String> {
        segment
            .documents(&segment.search(query).unwrap())
            .iter()
            .filter_map(|d| d.get("binaryName").map(str::to_string))
            .collect()
    }

    fn sample() -> Segment {
        Segment::from_documents(vec![
            doc("a.AC", "a", &["java.util.List----+-"]),
            doc("a.BC", "a", &["java.util.List+-----", "a.AC+-----"]),
            doc("b.CC", "b", &["a.AC----+-"]),
        ])
    }

    #[test]
    fn term_prefix_wildcard_and_regex() {
        let segment = sample();
        assert_eq!(names(&segment, &Query::term("packageName", "b")), vec!["b.CC"]);
        assert_eq!(
            names(&segment, &Query::prefix("binaryName", "a.")),
            vec!["a.AC", "a.BC"]
        );
        assert_eq!(
            names(&segment, &Query::wildcard("references", "a.AC??????")),
            vec!["a.BC", "b.CC"]
        );
        assert_eq!(
            names(&segment, &Query::regex("binaryName", "(?i)A\\..C")),
            vec!["a.AC", "a.BC"]
        );
        assert!(segment.search(&Query::regex("binaryName", "(")).is_err());
    }

    #[test]
    fn boolean_and_filter() {
        let segment = sample();
        let q = BooleanQuery::new()
            .should(Query::wildcard("references", "java.util.List??????"))
            .should(Query::wildcard("references", "a.AC??????"))
            .must_not(Query::term("packageName", "b"))
            .build();
        assert_eq!(names(&segment, &q), vec!["a.AC", "a.BC"]);

        let only_not = BooleanQuery::new().must_not(Query::All).build();
        assert!(segment.search(&only_not).unwrap().is_empty());

        let filtered = Query::All.filtered(Filter::TermSet {
            field: "packageName".into(),
            values: vec!["b".into(), "zzz".into()],
        });
        assert_eq!(names(&segment, &filtered), vec!["b.CC"]);
    }

    #[test]
    fn delete_updates_postings_and_term_frequencies() {
        let mut segment = sample();
        assert_eq!(
            segment.terms("references", "").collect::<Vec<_>>(),
            vec![
                ("a.AC+-----", 1),
                ("a.AC----+-", 1),
                ("java.util.List+-----", 1),
                ("java.util.List----+-", 1)
            ]
        );

        let removed = segment.delete(&Query::term("binaryName", "a.BC")).unwrap();
        assert_eq!(removed, 1);
        assert_eq!(segment.len(), 2);
        assert_eq!(
            segment.terms("references", "java").collect::<Vec<_>>(),
            vec![("java.util.List----+-", 1)]
        );
        assert_eq!(names(&segment.compact(), &Query::All), vec!["a.AC", "b.CC"]);
    }
}
