//! Sort-and-split grouping of flat sample indices by key.
//!
//! [`Groups::build`] sorts `(key, sample)` pairs once and records the
//! boundaries of every run of equal keys in a compressed layout
//! (`offsets` into one `members` vector). Lookups cost one binary search;
//! no per-key rescans of the whole grid happen. Sorting by the full pair
//! makes the member order independent of the input order, which keeps
//! repeated reductions bit-identical.

/// Sample indices grouped by key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Groups<K> {
    keys: Vec<K>,
    offsets: Vec<usize>,
    members: Vec<usize>,
}

impl<K: Ord + Copy> Groups<K> {
    /// Group sample indices by key; keys without samples are absent.
    pub fn build(mut pairs: Vec<(K, usize)>) -> Self {
        pairs.sort_unstable();
        let mut keys = Vec::new();
        let mut offsets = vec![0];
        let mut members = Vec::with_capacity(pairs.len());
        for (i, &(key, sample)) in pairs.iter().enumerate() {
            if i > 0 && pairs[i - 1].0 != key {
                offsets.push(i);
            }
            if keys.last() != Some(&key) {
                keys.push(key);
            }
            members.push(sample);
        }
        offsets.push(members.len());
        if keys.is_empty() {
            offsets.truncate(1);
        }
        Self { keys, offsets, members }
    }

    /// Members of `key`, or an empty slice.
    pub fn get(&self, key: K) -> &[usize] {
        match self.keys.binary_search(&key) {
            Ok(g) => &self.members[self.offsets[g]..self.offsets[g + 1]],
            Err(_) => &[],
        }
    }

    /// Keys with at least one member, ascending.
    pub fn keys(&self) -> &[K] {
        &self.keys
    }

    pub fn iter(&self) -> impl Iterator<Item = (K, &[usize])> {
        self.keys
            .iter()
            .enumerate()
            .map(|(g, &key)| (key, &self.members[self.offsets[g]..self.offsets[g + 1]]))
    }

    /// Total number of grouped samples.
    pub fn nmb_members(&self) -> usize {
        self.members.len()
    }
}
