//! Shape-only diff patterns for field values.
//!
//! Two strings are aligned by repeatedly taking the longest common block and
//! recursing on both sides of it. Each aligned segment is then rendered by
//! length only, so the pattern says *how* a value changed without carrying
//! the value itself:
//!
//! | segment  | rendering            |
//! |----------|----------------------|
//! | equal    | `.` per character    |
//! | delete   | `-` per character    |
//! | insert   | `+` per character    |
//! | replace  | `[xxx → xx]`         |

use std::collections::HashMap;

/// Second strings at least this long ignore "popular" characters when
/// seeding matches.
const AUTOJUNK_MIN_LEN: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpTag {
    Equal,
    Replace,
    Delete,
    Insert,
}

/// One aligned segment: `old[old_start..old_end]` against
/// `new[new_start..new_end]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Opcode {
    pub tag: OpTag,
    pub old_start: usize,
    pub old_end: usize,
    pub new_start: usize,
    pub new_end: usize,
}

impl Opcode {
    fn old_len(&self) -> usize {
        self.old_end - self.old_start
    }

    fn new_len(&self) -> usize {
        self.new_end - self.new_start
    }
}

/// A common block: `old[old_start..old_start + len] == new[new_start..new_start + len]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct Block {
    old_start: usize,
    new_start: usize,
    len: usize,
}

/// Longest-block sequence alignment over characters.
pub struct SequenceMatcher {
    old: Vec<char>,
    new: Vec<char>,
    /// Positions of each character in `new`, ascending.
    positions: HashMap<char, Vec<usize>>,
}

impl SequenceMatcher {
    pub fn new(old: &str, new: &str) -> Self {
        let old: Vec<char> = old.chars().collect();
        let new: Vec<char> = new.chars().collect();

        let mut positions: HashMap<char, Vec<usize>> = HashMap::new();
        for (j, &c) in new.iter().enumerate() {
            positions.entry(c).or_default().push(j);
        }

        if new.len() >= AUTOJUNK_MIN_LEN {
            let limit = new.len() / 100 + 1;
            positions.retain(|_, js| js.len() <= limit);
        }

        Self {
            old,
            new,
            positions,
        }
    }

    /// Longest block inside `old[alo..ahi]` × `new[blo..bhi]`; earliest in
    /// `old` (then `new`) on ties.
    fn longest_match(&self, alo: usize, ahi: usize, blo: usize, bhi: usize) -> Block {
        let (mut besti, mut bestj, mut bestsize) = (alo, blo, 0);
        let mut run_len: HashMap<usize, usize> = HashMap::new();

        for i in alo..ahi {
            let mut next_run_len = HashMap::new();
            if let Some(js) = self.positions.get(&self.old[i]) {
                for &j in js {
                    if j < blo {
                        continue;
                    }
                    if j >= bhi {
                        break;
                    }
                    let k = run_len.get(&j.wrapping_sub(1)).copied().unwrap_or(0) + 1;
                    next_run_len.insert(j, k);
                    if k > bestsize {
                        besti = i + 1 - k;
                        bestj = j + 1 - k;
                        bestsize = k;
                    }
                }
            }
            run_len = next_run_len;
        }

        // Popular characters never seed a match; let them extend one.
        while besti > alo && bestj > blo && self.old[besti - 1] == self.new[bestj - 1] {
            besti -= 1;
            bestj -= 1;
            bestsize += 1;
        }
        while besti + bestsize < ahi
            && bestj + bestsize < bhi
            && self.old[besti + bestsize] == self.new[bestj + bestsize]
        {
            bestsize += 1;
        }

        Block {
            old_start: besti,
            new_start: bestj,
            len: bestsize,
        }
    }

    fn matching_blocks(&self) -> Vec<Block> {
        let mut pending = vec![(0, self.old.len(), 0, self.new.len())];
        let mut blocks = Vec::new();

        while let Some((alo, ahi, blo, bhi)) = pending.pop() {
            let block = self.longest_match(alo, ahi, blo, bhi);
            if block.len == 0 {
                continue;
            }
            let (i, j, k) = (block.old_start, block.new_start, block.len);
            blocks.push(block);
            if alo < i && blo < j {
                pending.push((alo, i, blo, j));
            }
            if i + k < ahi && j + k < bhi {
                pending.push((i + k, ahi, j + k, bhi));
            }
        }
        blocks.sort();

        // Merge blocks that touch on both sides
        let mut merged: Vec<Block> = Vec::with_capacity(blocks.len() + 1);
        for block in blocks {
            match merged.last_mut() {
                Some(last)
                    if last.old_start + last.len == block.old_start
                        && last.new_start + last.len == block.new_start =>
                {
                    last.len += block.len;
                }
                _ => merged.push(block),
            }
        }
        merged.push(Block {
            old_start: self.old.len(),
            new_start: self.new.len(),
            len: 0,
        });
        merged
    }

    /// Edit script turning `old` into `new`.
    pub fn opcodes(&self) -> Vec<Opcode> {
        let mut opcodes = Vec::new();
        let (mut i, mut j) = (0, 0);

        for block in self.matching_blocks() {
            let (ai, bj, size) = (block.old_start, block.new_start, block.len);
            let tag = match (i < ai, j < bj) {
                (true, true) => Some(OpTag::Replace),
                (true, false) => Some(OpTag::Delete),
                (false, true) => Some(OpTag::Insert),
                (false, false) => None,
            };
            if let Some(tag) = tag {
                opcodes.push(Opcode {
                    tag,
                    old_start: i,
                    old_end: ai,
                    new_start: j,
                    new_end: bj,
                });
            }
            i = ai + size;
            j = bj + size;
            if size > 0 {
                opcodes.push(Opcode {
                    tag: OpTag::Equal,
                    old_start: ai,
                    old_end: i,
                    new_start: bj,
                    new_end: j,
                });
            }
        }

        opcodes
    }
}

/// Render the shape of the change from `old` to `new`.
pub fn deep_diff(old: &str, new: &str) -> String {
    let mut pattern = String::new();
    for op in SequenceMatcher::new(old, new).opcodes() {
        match op.tag {
            OpTag::Equal => pattern.push_str(&".".repeat(op.old_len())),
            OpTag::Delete => pattern.push_str(&"-".repeat(op.old_len())),
            OpTag::Insert => pattern.push_str(&"+".repeat(op.new_len())),
            OpTag::Replace => {
                pattern.push('[');
                pattern.push_str(&"x".repeat(op.old_len()));
                pattern.push_str(" → ");
                pattern.push_str(&"x".repeat(op.new_len()));
                pattern.push(']');
            }
        }
    }
    pattern
}
