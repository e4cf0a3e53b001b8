//! Title similarity metrics and a disjoint-set forest.
//!
//! Two independent signals feed the dedup graph:
//! - [`sequence_ratio`]: `2 * LCS / (len_a + len_b)`, i.e. one minus the
//!   normalized insert/delete edit distance. Catches near-identical phrasing.
//! - [`bigram_jaccard`]: Jaccard similarity of character-bigram sets.
//!   Robust for Chinese, where shared character pairs carry the signal
//!   and word order shifts freely.

use std::collections::HashSet;

/// Similarity in `[0, 1]` from the longest common subsequence of chars.
pub fn sequence_ratio(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let total = a.len() + b.len();
    if total == 0 {
        return 1.0;
    }

    let mut prev = vec![0usize; b.len() + 1];
    let mut curr = vec![0usize; b.len() + 1];
    for ca in &a {
        for (j, cb) in b.iter().enumerate() {
            curr[j + 1] = if ca == cb {
                prev[j] + 1
            } else {
                prev[j + 1].max(curr[j])
            };
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    let lcs = prev[b.len()];

    (2 * lcs) as f64 / total as f64
}

fn bigrams(s: &str) -> HashSet<(char, Option<char>)> {
    let chars: Vec<char> = s.chars().collect();
    match chars.len() {
        0 => HashSet::new(),
        1 => HashSet::from([(chars[0], None)]),
        _ => chars.windows(2).map(|w| (w[0], Some(w[1]))).collect(),
    }
}

/// Jaccard similarity of character-bigram sets. Single characters count
/// as their own unigram; two empty strings score 0.
pub fn bigram_jaccard(a: &str, b: &str) -> f64 {
    let sa = bigrams(a);
    let sb = bigrams(b);
    let union = sa.union(&sb).count();
    if union == 0 {
        return 0.0;
    }
    let inter = sa.intersection(&sb).count();
    inter as f64 / union as f64
}

/// Thresholds for the dual-metric similarity edge.
#[derive(Debug, Clone, Copy)]
pub struct SimilarityThresholds {
    pub ratio: f64,
    pub jaccard: f64,
}

impl Default for SimilarityThresholds {
    fn default() -> Self {
        Self {
            ratio: 0.4,
            jaccard: 0.25,
        }
    }
}

impl SimilarityThresholds {
    /// An edge exists if either metric strictly exceeds its threshold.
    pub fn similar(&self, a: &str, b: &str) -> bool {
        sequence_ratio(a, b) > self.ratio || bigram_jaccard(a, b) > self.jaccard
    }
}

/// Disjoint-set forest over `0..n` with path compression and union by rank.
#[derive(Debug, Clone)]
pub struct UnionFind {
    parent: Vec<usize>,
    rank: Vec<u8>,
}

impl UnionFind {
    pub fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
            rank: vec![0; n],
        }
    }

    pub fn find(&mut self, x: usize) -> usize {
        let mut root = x;
        while self.parent[root] != root {
            root = self.parent[root];
        }
        let mut node = x;
        while self.parent[node] != root {
            let next = self.parent[node];
            self.parent[node] = root;
            node = next;
        }
        root
    }

    pub fn union(&mut self, a: usize, b: usize) {
        let ra = self.find(a);
        let rb = self.find(b);
        if ra == rb {
            return;
        }
        match self.rank[ra].cmp(&self.rank[rb]) {
            std::cmp::Ordering::Less => self.parent[ra] = rb,
            std::cmp::Ordering::Greater => self.parent[rb] = ra,
            std::cmp::Ordering::Equal => {
                self.parent[rb] = ra;
                self.rank[ra] += 1;
            }
        }
    }

    /// Components as sorted member lists, ordered by their smallest member.
    pub fn groups(&mut self) -> Vec<Vec<usize>> {
        let n = self.parent.len();
        let mut by_root: Vec<Option<usize>> = vec![None; n];
        let mut groups: Vec<Vec<usize>> = Vec::new();
        for i in 0..n {
            let root = self.find(i);
            match by_root[root] {
                Some(g) => groups[g].push(i),
                None => {
                    by_root[root] = Some(groups.len());
                    groups.push(vec![i]);
                }
            }
        }
        groups
    }
}
