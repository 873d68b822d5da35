use crate::timestamps::FileState;

/// Outcome of analysing one root.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Changes {
    /// `false` when the scan was cancelled or failed; nothing was written.
    pub done: bool,
    pub added: Vec<String>,
    pub removed: Vec<String>,
    pub changed: Vec<String>,
    /// Both `java.lang.Object` and `javax.swing.JComponent` live in this root.
    pub pre_build_args: bool,
}

impl Changes {
    pub const UP_TO_DATE: Changes = Changes {
        done: true,
        added: Vec::new(),
        removed: Vec::new(),
        changed: Vec::new(),
        pre_build_args: false,
    };

    pub const FAILURE: Changes = Changes {
        done: false,
        added: Vec::new(),
        removed: Vec::new(),
        changed: Vec::new(),
        pre_build_args: false,
    };

    pub fn is_up_to_date(&self) -> bool {
        self.done && self.added.is_empty() && self.removed.is_empty() && self.changed.is_empty()
    }
}

/// Lock-step merge of two sorted root states.
///
/// A name only in `old` is removed, only in `new` is added. A name in both is
/// changed when its fingerprint differs or the old fingerprint is `0`.
pub fn diff(old: &[FileState], new: &[FileState], pre_build_args: bool) -> Changes {
    let mut changes = Changes {
        done: true,
        pre_build_args,
        ..Changes::default()
    };

    let mut old_it = old.iter().peekable();
    let mut new_it = new.iter().peekable();
    loop {
        match (old_it.peek(), new_it.peek()) {
            (Some(o), Some(n)) => match o.name.cmp(&n.name) {
                std::cmp::Ordering::Equal => {
                    if o.fingerprint == 0 || o.fingerprint != n.fingerprint {
                        changes.changed.push(o.name.clone());
                    }
                    old_it.next();
                    new_it.next();
                }
                std::cmp::Ordering::Less => {
                    changes.removed.push(o.name.clone());
                    old_it.next();
                }
                std::cmp::Ordering::Greater => {
                    changes.added.push(n.name.clone());
                    new_it.next();
                }
            },
            (Some(o), None) => {
                changes.removed.push(o.name.clone());
                old_it.next();
            }
            (None, Some(n)) => {
                changes.added.push(n.name.clone());
                new_it.next();
            }
            (None, None) => break,
        }
    }
    changes
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn state(entries: &[(&str, i64)]) -> Vec<FileState> {
        entries.iter().map(|(n, f)| FileState::new(*n, *f)).collect()
    }

    #[test]
    fn partitions_names() {
        let old = state(&[("a.A", 1), ("a.B", 2), ("a.C", 0), ("a.D", 4)]);
        let new = state(&[("a.B", 3), ("a.C", 0), ("a.D", 4), ("a.E", 5)]);
        let changes = diff(&old, &new, false);
        assert_eq!(changes.added, vec!["a.E"]);
        assert_eq!(changes.removed, vec!["a.A"]);
        assert_eq!(changes.changed, vec!["a.B", "a.C"]);
        assert!(changes.done);
    }

    #[test]
    fn trailing_old_entry_still_matches_later_new_entry() {
        let old = state(&[("b", 1)]);
        let new = state(&[("a", 1), ("b", 1)]);
        let changes = diff(&old, &new, true);
        assert_eq!(changes.added, vec!["a"]);
        assert!(changes.removed.is_empty());
        assert!(changes.changed.is_empty());
        assert!(changes.pre_build_args);
    }

    #[test]
    fn constants() {
        assert!(Changes::UP_TO_DATE.is_up_to_date());
        assert!(!Changes::FAILURE.done);
        assert!(!Changes::FAILURE.is_up_to_date());
    }
}
