/// Dense bitset over document ids.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DocSet {
    words: Vec<u64>,
}

impl DocSet {
    pub fn with_capacity(docs: usize) -> Self {
        Self {
            words: vec![0; docs.div_ceil(64)],
        }
    }

    pub fn full(docs: usize) -> Self {
        let mut set = Self::with_capacity(docs);
        for id in 0..docs {
            set.insert(id as u32);
        }
        set
    }

    pub fn insert(&mut self, id: u32) {
        let (word, bit) = (id as usize / 64, id % 64);
        if word >= self.words.len() {
            self.words.resize(word + 1, 0);
        }
        self.words[word] |= 1 << bit;
    }

    pub fn contains(&self, id: u32) -> bool {
        let (word, bit) = (id as usize / 64, id % 64);
        self.words.get(word).is_some_and(|w| w & (1 << bit) != 0)
    }

    pub fn union_with(&mut self, other: &DocSet) {
        if other.words.len() > self.words.len() {
            self.words.resize(other.words.len(), 0);
        }
        for (a, b) in self.words.iter_mut().zip(&other.words) {
            *a |= b;
        }
    }

    pub fn intersect_with(&mut self, other: &DocSet) {
        for (idx, a) in self.words.iter_mut().enumerate() {
            *a &= other.words.get(idx).copied().unwrap_or(0);
        }
    }

    pub fn difference_with(&mut self, other: &DocSet) {
        for (a, b) in self.words.iter_mut().zip(&other.words) {
            *a &= !b;
        }
    }

    pub fn len(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.words.iter().all(|w| *w == 0)
    }

    pub fn iter(&self) -> impl Iterator<Item = u32> + '_ {
        self.words.iter().enumerate().flat_map(|(idx, &word)| {
            let mut word = word;
            std::iter::from_fn(move || {
                if word == 0 {
                    return None;
                }
                let bit = word.trailing_zeros();
                word &= word - 1;
                Some(idx as u32 * 64 + bit)
            })
        })
    }
}

impl FromIterator<u32> for DocSet {
    fn from_iter<I: IntoIterator<Item = u32>>(iter: I) -> Self {
        let mut set = DocSet::default();
        for id in iter {
            set.insert(id);
        }
        set
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_algebra() {
        let mut a: DocSet = [1, 3, 64, 130].into_iter().collect();
        let b: DocSet = [3, 64, 200].into_iter().collect();

        let mut both = a.clone();
        both.intersect_with(&b);
        assert_eq!(both.iter().collect::<Vec<_>>(), vec![3, 64]);

        let mut either = a.clone();
        either.union_with(&b);
        assert_eq!(either.len(), 5);
        assert!(either.contains(200));

        a.difference_with(&b);
        assert_eq!(a.iter().collect::<Vec<_>>(), vec![1, 130]);
        assert!(DocSet::with_capacity(10).is_empty());
        assert_eq!(DocSet::full(3).iter().collect::<Vec<_>>(), vec![0, 1, 2]);
    }
}
