//! In-memory R-tree over 2D minimum bounding rectangles.
//!
//! Guttman's classic shape: fan-out 16, minimum fill 8, quadratic-cost
//! node splits, and deletion that disconnects underfull nodes and
//! reinserts their branches at the height they were removed from. Split
//! heuristics compare bounding-sphere volumes rather than plain areas.
//! Entries carry opaque 64-bit handles the tree never dereferences.

use crate::geo::types::Rect;

const MAX_ENTRIES: usize = 16;
const MIN_ENTRIES: usize = MAX_ENTRIES / 2;
const UNIT_SPHERE_VOLUME: f64 = std::f64::consts::PI;

#[derive(Debug, Clone)]
enum Entry {
    Leaf { rect: Rect, handle: u64 },
    Branch { rect: Rect, child: Box<Node> },
}

impl Entry {
    fn rect(&self) -> &Rect {
        match self {
            Entry::Leaf { rect, .. } => rect,
            Entry::Branch { rect, .. } => rect,
        }
    }
}

#[derive(Debug, Clone)]
struct Node {
    /// Leaves live at level 0.
    level: usize,
    entries: Vec<Entry>,
}

impl Node {
    fn new(level: usize) -> Self {
        Node {
            level,
            entries: Vec::with_capacity(MAX_ENTRIES + 1),
        }
    }

    fn cover(&self) -> Rect {
        let mut it = self.entries.iter();
        let mut r = match it.next() {
            Some(e) => *e.rect(),
            None => return Rect::default(),
        };
        for e in it {
            r = r.union(e.rect());
        }
        r
    }
}

/// Bounding-sphere volume of a rectangle, the merge heuristic of choice
/// here: it penalises long skinny covers that plain area rewards.
fn volume(r: &Rect) -> f64 {
    let hx = (r.max.x - r.min.x) / 2.0;
    let hy = (r.max.y - r.min.y) / 2.0;
    let radius_sq = hx * hx + hy * hy;
    radius_sq * UNIT_SPHERE_VOLUME
}

fn choose_subtree(node: &Node, rect: &Rect) -> usize {
    let mut best = 0;
    let mut best_growth = f64::INFINITY;
    let mut best_vol = f64::INFINITY;
    for (i, e) in node.entries.iter().enumerate() {
        let vol = volume(e.rect());
        let growth = volume(&e.rect().union(rect)) - vol;
        if growth < best_growth || (growth == best_growth && vol < best_vol) {
            best = i;
            best_growth = growth;
            best_vol = vol;
        }
    }
    best
}

/// Quadratic split: seed with the pair wasting the most volume, then
/// hand each remaining entry to the group it grows less, keeping both
/// groups above the minimum fill.
fn split_node(node: &mut Node) -> Entry {
    let mut rest = std::mem::take(&mut node.entries);
    let (mut s1, mut s2) = (0, 1);
    let mut worst = f64::NEG_INFINITY;
    for i in 0..rest.len() {
        for j in (i + 1)..rest.len() {
            let waste = volume(&rest[i].rect().union(rest[j].rect()))
                - volume(rest[i].rect())
                - volume(rest[j].rect());
            if waste > worst {
                worst = waste;
                s1 = i;
                s2 = j;
            }
        }
    }
    let seed2 = rest.remove(s2);
    let seed1 = rest.remove(s1);
    let mut rect1 = *seed1.rect();
    let mut rect2 = *seed2.rect();
    let mut group1 = vec![seed1];
    let mut group2 = vec![seed2];
    let total = rest.len();
    for (k, e) in rest.into_iter().enumerate() {
        let remaining = total - k;
        if group1.len() + remaining <= MIN_ENTRIES {
            rect1 = rect1.union(e.rect());
            group1.push(e);
            continue;
        }
        if group2.len() + remaining <= MIN_ENTRIES {
            rect2 = rect2.union(e.rect());
            group2.push(e);
            continue;
        }
        let g1 = volume(&rect1.union(e.rect())) - volume(&rect1);
        let g2 = volume(&rect2.union(e.rect())) - volume(&rect2);
        if g1 < g2 || (g1 == g2 && group1.len() <= group2.len()) {
            rect1 = rect1.union(e.rect());
            group1.push(e);
        } else {
            rect2 = rect2.union(e.rect());
            group2.push(e);
        }
    }
    node.entries = group1;
    let sibling = Node {
        level: node.level,
        entries: group2,
    };
    Entry::Branch {
        rect: rect2,
        child: Box::new(sibling),
    }
}

fn insert_rec(node: &mut Node, entry: Entry, level: usize) -> Option<Entry> {
    if node.level == level {
        node.entries.push(entry);
        if node.entries.len() > MAX_ENTRIES {
            return Some(split_node(node));
        }
        return None;
    }
    let i = choose_subtree(node, entry.rect());
    let split = {
        let Entry::Branch { rect, child } = &mut node.entries[i] else {
            return None;
        };
        let split = insert_rec(child, entry, level);
        *rect = child.cover();
        split
    };
    if let Some(split) = split {
        node.entries.push(split);
        if node.entries.len() > MAX_ENTRIES {
            return Some(split_node(node));
        }
    }
    None
}

fn remove_rec(node: &mut Node, rect: &Rect, handle: u64, orphans: &mut Vec<Node>) -> bool {
    if node.level == 0 {
        if let Some(i) = node.entries.iter().position(
            |e| matches!(e, Entry::Leaf { rect: r, handle: h } if *h == handle && r.intersects(rect)),
        ) {
            node.entries.remove(i);
            return true;
        }
        return false;
    }
    for i in 0..node.entries.len() {
        let found = {
            let Entry::Branch { rect: brect, child } = &mut node.entries[i] else {
                continue;
            };
            if !brect.intersects(rect) {
                continue;
            }
            remove_rec(child, rect, handle, orphans)
        };
        if found {
            let underfull = matches!(
                &node.entries[i],
                Entry::Branch { child, .. } if child.entries.len() < MIN_ENTRIES
            );
            if underfull {
                if let Entry::Branch { child, .. } = node.entries.remove(i) {
                    orphans.push(*child);
                }
            } else if let Entry::Branch { rect: brect, child } = &mut node.entries[i] {
                *brect = child.cover();
            }
            return true;
        }
    }
    false
}

fn search_rec<F>(node: &Node, rect: &Rect, visitor: &mut F) -> bool
where
    F: FnMut(&Rect, u64) -> bool,
{
    for e in &node.entries {
        match e {
            Entry::Leaf { rect: r, handle } => {
                if r.intersects(rect) && !visitor(r, *handle) {
                    return false;
                }
            }
            Entry::Branch { rect: r, child } => {
                if r.intersects(rect) && !search_rec(child, rect, visitor) {
                    return false;
                }
            }
        }
    }
    true
}

fn count_rec(node: &Node) -> usize {
    if node.level == 0 {
        return node.entries.len();
    }
    node.entries
        .iter()
        .map(|e| match e {
            Entry::Branch { child, .. } => count_rec(child),
            Entry::Leaf { .. } => 1,
        })
        .sum()
}

fn collect_leaves(node: Node, out: &mut Vec<(Rect, u64)>) {
    for e in node.entries {
        match e {
            Entry::Leaf { rect, handle } => out.push((rect, handle)),
            Entry::Branch { child, .. } => collect_leaves(*child, out),
        }
    }
}

#[derive(Debug, Default)]
pub struct RTree {
    root: Option<Box<Node>>,
}

impl RTree {
    pub fn new() -> Self {
        RTree { root: None }
    }

    pub fn insert(&mut self, rect: Rect, handle: u64) {
        self.insert_entry(Entry::Leaf { rect, handle }, 0);
    }

    fn insert_entry(&mut self, entry: Entry, level: usize) {
        let root = self
            .root
            .get_or_insert_with(|| Box::new(Node::new(level)));
        if let Some(split) = insert_rec(root, entry, level) {
            let old = match self.root.take() {
                Some(n) => n,
                None => return,
            };
            let mut new_root = Node::new(old.level + 1);
            new_root.entries.push(Entry::Branch {
                rect: old.cover(),
                child: old,
            });
            new_root.entries.push(split);
            self.root = Some(Box::new(new_root));
        }
    }

    /// Remove the entry matching both the rectangle and the handle.
    /// Underfull nodes left behind are disconnected and their branches
    /// reinserted at the height they came from.
    pub fn remove(&mut self, rect: &Rect, handle: u64) -> bool {
        let Some(root) = self.root.as_deref_mut() else {
            return false;
        };
        let mut orphans: Vec<Node> = Vec::new();
        let found = remove_rec(root, rect, handle, &mut orphans);
        if !found {
            return false;
        }
        for node in orphans {
            self.reinsert_node(node);
        }
        loop {
            match self.root.take() {
                None => break,
                Some(mut root) => {
                    if root.entries.is_empty() {
                        break;
                    }
                    if root.level > 0 && root.entries.len() == 1 {
                        if let Some(Entry::Branch { child, .. }) = root.entries.pop() {
                            self.root = Some(child);
                            continue;
                        }
                        break;
                    }
                    self.root = Some(root);
                    break;
                }
            }
        }
        true
    }

    fn reinsert_node(&mut self, node: Node) {
        let level = node.level;
        let can_host = self.root.as_ref().map_or(false, |r| r.level >= level && !r.entries.is_empty());
        if can_host {
            for e in node.entries {
                self.insert_entry(e, level);
            }
        } else {
            // tree degenerated under us; fall back to plain leaf inserts
            let mut leaves = Vec::new();
            collect_leaves(node, &mut leaves);
            for (rect, handle) in leaves {
                self.insert(rect, handle);
            }
        }
    }

    /// Visit every leaf entry overlapping `rect`. The visitor returns
    /// `false` to stop the walk; `search` reports whether it ran to
    /// completion.
    pub fn search<F>(&self, rect: &Rect, visitor: &mut F) -> bool
    where
        F: FnMut(&Rect, u64) -> bool,
    {
        match &self.root {
            None => true,
            Some(root) => search_rec(root, rect, visitor),
        }
    }

    pub fn count(&self) -> usize {
        match &self.root {
            None => 0,
            Some(root) => count_rec(root),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }
}
