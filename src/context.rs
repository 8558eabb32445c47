//! Extracts the words that newly appeared on a page relative to the most
//! similar page seen before it.

use std::collections::{HashMap, VecDeque};

use crate::types::TEXT_HISTORY_LENGTH;

/// Above this many DP cells the word diff degrades to a multiset difference.
const MAX_DIFF_CELLS: usize = 4_000_000;

/// Index of the example closest to `input` by Levenshtein distance.
/// Ties go to the earliest example.
pub fn closest_match<'a, I>(input: &str, examples: I) -> Option<usize>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut best: Option<(usize, usize)> = None;
    for (index, example) in examples.into_iter().enumerate() {
        let distance = strsim::levenshtein(input, example);
        match best {
            Some((_, closest)) if distance >= closest => {}
            _ => best = Some((index, distance)),
        }
    }
    best.map(|(index, _)| index)
}

/// Words of `new` that are not aligned with a word of `old`, in order.
pub fn added_words<'a>(old: &str, new: &'a str) -> Vec<&'a str> {
    let old: Vec<&str> = old.split_whitespace().collect();
    let new: Vec<&'a str> = new.split_whitespace().collect();

    let prefix = old.iter().zip(&new).take_while(|(a, b)| a == b).count();
    let suffix = old[prefix..]
        .iter()
        .rev()
        .zip(new[prefix..].iter().rev())
        .take_while(|(a, b)| a == b)
        .count();
    let old_mid = &old[prefix..old.len() - suffix];
    let new_mid = &new[prefix..new.len() - suffix];

    if old_mid.is_empty() {
        return new_mid.to_vec();
    }
    if (old_mid.len() + 1).saturating_mul(new_mid.len() + 1) > MAX_DIFF_CELLS {
        return multiset_difference(old_mid, new_mid);
    }
    lcs_additions(old_mid, new_mid)
}

fn lcs_additions<'a>(old: &[&str], new: &[&'a str]) -> Vec<&'a str> {
    let (n, m) = (old.len(), new.len());
    let width = m + 1;
    // table[i][j] = LCS length of old[i..] and new[j..]
    let mut table = vec![0u32; (n + 1) * width];
    for i in (0..n).rev() {
        for j in (0..m).rev() {
            table[i * width + j] = if old[i] == new[j] {
                table[(i + 1) * width + j + 1] + 1
            } else {
                table[(i + 1) * width + j].max(table[i * width + j + 1])
            };
        }
    }

    let mut added = Vec::new();
    let (mut i, mut j) = (0, 0);
    while i < n && j < m {
        if old[i] == new[j] {
            i += 1;
            j += 1;
        } else if table[(i + 1) * width + j] >= table[i * width + j + 1] {
            i += 1;
        } else {
            added.push(new[j]);
            j += 1;
        }
    }
    added.extend_from_slice(&new[j..]);
    added
}

fn multiset_difference<'a>(old: &[&str], new: &[&'a str]) -> Vec<&'a str> {
    let mut available: HashMap<&str, usize> = HashMap::new();
    for word in old {
        *available.entry(word).or_default() += 1;
    }
    new.iter()
        .filter(|word| match available.get_mut(**word) {
            Some(count) if *count > 0 => {
                *count -= 1;
                false
            }
            _ => true,
        })
        .copied()
        .collect()
}

/// Same as [`ContextDiffer::relevant_context`] over a copied window.
pub fn relevant_words(snapshots: &[String], text: &str) -> Option<String> {
    let index = closest_match(text, snapshots.iter().map(String::as_str))?;
    Some(added_words(&snapshots[index], text).join(" "))
}

/// Bounded window of previously seen page texts.
#[derive(Debug)]
pub struct ContextDiffer {
    window: VecDeque<String>,
    capacity: usize,
}

impl Default for ContextDiffer {
    fn default() -> Self {
        Self::with_capacity(TEXT_HISTORY_LENGTH)
    }
}

impl ContextDiffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            window: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Words newly present in `text` relative to the closest snapshot, joined
    /// by spaces. `None` while the window is empty.
    pub fn relevant_context(&self, text: &str) -> Option<String> {
        let index = closest_match(text, self.window.iter().map(String::as_str))?;
        let closest = &self.window[index];
        Some(added_words(closest, text).join(" "))
    }

    /// Copy of the window, so the diff can run without holding a lock.
    pub fn snapshots(&self) -> Vec<String> {
        self.window.iter().cloned().collect()
    }

    /// Push `text`, evicting the oldest snapshot past capacity.
    pub fn push(&mut self, text: impl Into<String>) {
        self.window.push_back(text.into());
        while self.window.len() > self.capacity {
            self.window.pop_front();
        }
    }

    /// Compute the relevant context for `text`, then remember it.
    pub fn observe(&mut self, text: &str) -> Option<String> {
        let context = self.relevant_context(text);
        self.push(text);
        context
    }

    pub fn len(&self) -> usize {
        self.window.len()
    }

    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }
}
