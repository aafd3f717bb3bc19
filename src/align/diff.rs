//! Character-level diff.
//!
//! ## Algorithm
//!
//! ```text
//! source ─┐                ┌─ common prefix ──────────────── Equal
//!         ├─ trim ends ────┼─ middle ── Myers O(ND) ───────── Equal/Delete/Insert
//! dest  ──┘                └─ common suffix ──────────────── Equal
//! ```
//!
//! The middle is diffed with Myers' greedy shortest-edit-script search. Only
//! the live diagonals of each round are kept for backtracking, so the trace
//! grows with D², not with N·D. When the edit distance exceeds the configured
//! bound the middle is reported as one delete followed by one insert.
//!
//! Runs are merged so that each change group is a single `Delete` followed by
//! a single `Insert`.

use serde::{Deserialize, Serialize};

/// One run of a character diff.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DiffRun {
    /// Characters present in both texts.
    Equal(usize),
    /// Characters present only in the source.
    Delete(usize),
    /// Characters present only in the destination.
    Insert(usize),
}

impl DiffRun {
    /// Run length in characters.
    pub fn len(&self) -> usize {
        match *self {
            Self::Equal(n) | Self::Delete(n) | Self::Insert(n) => n,
        }
    }

    /// Whether the run is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Edit {
    Equal,
    Delete,
    Insert,
}

/// Result of a diff, with the outcome of the bounded search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CharDiff {
    /// Merged runs, left to right.
    pub runs: Vec<DiffRun>,
    /// False when the edit bound was hit and the middle was replaced wholesale.
    pub exact: bool,
}

/// Diff two character sequences, giving up after `max_edits` edits.
pub fn diff_chars(source: &[char], dest: &[char], max_edits: usize) -> CharDiff {
    let prefix = source
        .iter()
        .zip(dest.iter())
        .take_while(|(a, b)| a == b)
        .count();
    let suffix = source[prefix..]
        .iter()
        .rev()
        .zip(dest[prefix..].iter().rev())
        .take_while(|(a, b)| a == b)
        .count();

    let a = &source[prefix..source.len() - suffix];
    let b = &dest[prefix..dest.len() - suffix];

    let mut builder = RunBuilder::default();
    builder.push(Edit::Equal, prefix);

    let exact = match shortest_edit(a, b, max_edits) {
        Some(edits) => {
            for edit in edits {
                builder.push(edit, 1);
            }
            true
        }
        None => {
            builder.push(Edit::Delete, a.len());
            builder.push(Edit::Insert, b.len());
            false
        }
    };

    builder.push(Edit::Equal, suffix);

    CharDiff {
        runs: builder.finish(),
        exact,
    }
}

/// Myers forward search. Returns per-character edits, or `None` past the bound.
fn shortest_edit(a: &[char], b: &[char], max_edits: usize) -> Option<Vec<Edit>> {
    let n = a.len() as isize;
    let m = b.len() as isize;
    if n == 0 && m == 0 {
        return Some(Vec::new());
    }
    if n == 0 {
        return Some(vec![Edit::Insert; m as usize]);
    }
    if m == 0 {
        return Some(vec![Edit::Delete; n as usize]);
    }

    let max = (n + m) as usize;
    let limit = max.min(max_edits) as isize;
    let offset = max as isize;
    let mut v = vec![0isize; 2 * max + 2];
    // trace[d] holds v[-d..=d] as it was before round d.
    let mut trace: Vec<Vec<isize>> = Vec::new();

    for d in 0..=limit {
        let lo = (offset - d) as usize;
        let hi = (offset + d) as usize;
        trace.push(v[lo..=hi].to_vec());

        let mut k = -d;
        while k <= d {
            let idx = (offset + k) as usize;
            let mut x = if k == -d || (k != d && v[idx - 1] < v[idx + 1]) {
                v[idx + 1]
            } else {
                v[idx - 1] + 1
            };
            let mut y = x - k;
            while x < n && y < m && a[x as usize] == b[y as usize] {
                x += 1;
                y += 1;
            }
            v[idx] = x;
            if x >= n && y >= m {
                return Some(backtrack(&trace, n, m));
            }
            k += 2;
        }
    }

    None
}

fn backtrack(trace: &[Vec<isize>], n: isize, m: isize) -> Vec<Edit> {
    let mut edits = Vec::with_capacity((n + m) as usize);
    let (mut x, mut y) = (n, m);

    for (d, snapshot) in trace.iter().enumerate().rev() {
        let d = d as isize;
        let at = |k: isize| snapshot[(k + d) as usize];

        if d == 0 {
            while x > 0 && y > 0 {
                edits.push(Edit::Equal);
                x -= 1;
                y -= 1;
            }
            break;
        }

        let k = x - y;
        let prev_k = if k == -d || (k != d && at(k - 1) < at(k + 1)) {
            k + 1
        } else {
            k - 1
        };
        let prev_x = at(prev_k);
        let prev_y = prev_x - prev_k;

        while x > prev_x && y > prev_y {
            edits.push(Edit::Equal);
            x -= 1;
            y -= 1;
        }
        edits.push(if x == prev_x { Edit::Insert } else { Edit::Delete });
        x = prev_x;
        y = prev_y;
    }

    edits.reverse();
    edits
}

/// Merges per-character edits into runs, deletes before inserts per group.
#[derive(Default)]
struct RunBuilder {
    runs: Vec<DiffRun>,
    deleted: usize,
    inserted: usize,
}

impl RunBuilder {
    fn push(&mut self, edit: Edit, count: usize) {
        if count == 0 {
            return;
        }
        match edit {
            Edit::Delete => self.deleted += count,
            Edit::Insert => self.inserted += count,
            Edit::Equal => {
                self.flush_changes();
                match self.runs.last_mut() {
                    Some(DiffRun::Equal(n)) => *n += count,
                    _ => self.runs.push(DiffRun::Equal(count)),
                }
            }
        }
    }

    fn flush_changes(&mut self) {
        if self.deleted > 0 {
            self.runs.push(DiffRun::Delete(self.deleted));
        }
        if self.inserted > 0 {
            self.runs.push(DiffRun::Insert(self.inserted));
        }
        self.deleted = 0;
        self.inserted = 0;
    }

    fn finish(mut self) -> Vec<DiffRun> {
        self.flush_changes();
        self.runs
    }
}
