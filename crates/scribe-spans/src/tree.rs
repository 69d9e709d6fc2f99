//! Arena-backed implicit treap over annotated runs.
//!
//! Runs carry no keys: the in-order position of a node *is* its order. Each
//! node caches the number of runs and the total run length of its subtree,
//! which makes "run covering offset `x`" and "split after the `k`-th run"
//! O(log n) expected.
//!
//! As in the position trees of the RGA, all "pointers" are `Option<u32>`
//! indices into a `Vec` arena owned by the tree. Released slots are recycled.

#[derive(Debug, Clone)]
pub(crate) struct Node<A, O> {
    pub length: usize,
    pub annotation: A,
    pub attached: Option<O>,
    priority: u32,
    l: Option<u32>,
    r: Option<u32>,
    count: usize,
    sum: usize,
}

#[derive(Debug, Clone)]
pub(crate) struct RunTree<A, O> {
    arena: Vec<Node<A, O>>,
    free: Vec<u32>,
    pub root: Option<u32>,
    seed: u32,
}

impl<A, O> RunTree<A, O> {
    pub fn new() -> Self {
        Self {
            arena: Vec::new(),
            free: Vec::new(),
            root: None,
            seed: 0x9E37_79B9,
        }
    }

    // xorshift32
    fn next_priority(&mut self) -> u32 {
        let mut x = self.seed;
        x ^= x << 13;
        x ^= x >> 17;
        x ^= x << 5;
        self.seed = x;
        x
    }

    #[inline]
    pub fn node(&self, id: u32) -> &Node<A, O> {
        &self.arena[id as usize]
    }

    #[inline]
    pub fn node_mut(&mut self, id: u32) -> &mut Node<A, O> {
        &mut self.arena[id as usize]
    }

    /// Allocates a detached single-node tree.
    pub fn alloc(&mut self, length: usize, annotation: A) -> u32 {
        let node = Node {
            length,
            annotation,
            attached: None,
            priority: self.next_priority(),
            l: None,
            r: None,
            count: 1,
            sum: length,
        };
        match self.free.pop() {
            Some(id) => {
                self.arena[id as usize] = node;
                id
            }
            None => {
                self.arena.push(node);
                (self.arena.len() - 1) as u32
            }
        }
    }

    /// Returns a detached node's slot to the free list, handing back the
    /// object attached to it.
    pub fn release(&mut self, id: u32) -> Option<O> {
        self.free.push(id);
        let node = &mut self.arena[id as usize];
        node.l = None;
        node.r = None;
        node.attached.take()
    }

    #[inline]
    fn count_of(&self, t: Option<u32>) -> usize {
        t.map_or(0, |id| self.arena[id as usize].count)
    }

    #[inline]
    fn sum_of(&self, t: Option<u32>) -> usize {
        t.map_or(0, |id| self.arena[id as usize].sum)
    }

    fn pull(&mut self, id: u32) {
        let (l, r, length) = {
            let n = &self.arena[id as usize];
            (n.l, n.r, n.length)
        };
        let count = 1 + self.count_of(l) + self.count_of(r);
        let sum = length + self.sum_of(l) + self.sum_of(r);
        let n = &mut self.arena[id as usize];
        n.count = count;
        n.sum = sum;
    }

    /// Total length of all runs.
    pub fn len(&self) -> usize {
        self.sum_of(self.root)
    }

    /// Number of runs.
    pub fn count(&self) -> usize {
        self.count_of(self.root)
    }

    /// Total length of the runs in subtree `t`.
    pub fn sum(&self, t: Option<u32>) -> usize {
        self.sum_of(t)
    }

    /// Splits `t` into its first `k` runs and the remainder.
    pub fn split(&mut self, t: Option<u32>, k: usize) -> (Option<u32>, Option<u32>) {
        let Some(id) = t else {
            return (None, None);
        };
        let l = self.arena[id as usize].l;
        let left_count = self.count_of(l);
        if k <= left_count {
            let (a, b) = self.split(l, k);
            self.arena[id as usize].l = b;
            self.pull(id);
            (a, Some(id))
        } else {
            let r = self.arena[id as usize].r;
            let (a, b) = self.split(r, k - left_count - 1);
            self.arena[id as usize].r = a;
            self.pull(id);
            (Some(id), b)
        }
    }

    /// Concatenates two trees; every run of `a` precedes every run of `b`.
    pub fn merge(&mut self, a: Option<u32>, b: Option<u32>) -> Option<u32> {
        match (a, b) {
            (None, t) | (t, None) => t,
            (Some(x), Some(y)) => {
                if self.arena[x as usize].priority >= self.arena[y as usize].priority {
                    let r = self.arena[x as usize].r;
                    let merged = self.merge(r, Some(y));
                    self.arena[x as usize].r = merged;
                    self.pull(x);
                    Some(x)
                } else {
                    let l = self.arena[y as usize].l;
                    let merged = self.merge(Some(x), l);
                    self.arena[y as usize].l = merged;
                    self.pull(y);
                    Some(y)
                }
            }
        }
    }

    /// Finds the run covering offset `pos`.
    ///
    /// Returns `(index, start_offset, node)`, or `None` when `pos` is at or
    /// past the end of the list.
    pub fn locate(&self, pos: usize) -> Option<(usize, usize, u32)> {
        let mut curr = self.root;
        let mut rem = pos;
        let mut index = 0;
        let mut start = 0;
        while let Some(id) = curr {
            let n = &self.arena[id as usize];
            let left_sum = self.sum_of(n.l);
            if rem < left_sum {
                curr = n.l;
                continue;
            }
            rem -= left_sum;
            let left_count = self.count_of(n.l);
            if rem < n.length {
                return Some((index + left_count, start + left_sum, id));
            }
            rem -= n.length;
            index += left_count + 1;
            start += left_sum + n.length;
            curr = n.r;
        }
        None
    }

    /// The run at `index` and its start offset.
    pub fn nth(&self, index: usize) -> Option<(u32, usize)> {
        let mut curr = self.root;
        let mut k = index;
        let mut start = 0;
        while let Some(id) = curr {
            let n = &self.arena[id as usize];
            let left_count = self.count_of(n.l);
            if k < left_count {
                curr = n.l;
            } else if k == left_count {
                return Some((id, start + self.sum_of(n.l)));
            } else {
                k -= left_count + 1;
                start += self.sum_of(n.l) + n.length;
                curr = n.r;
            }
        }
        None
    }

    /// Node ids of subtree `t` in document order.
    pub fn in_order(&self, t: Option<u32>) -> Vec<u32> {
        let mut out = Vec::with_capacity(self.count_of(t));
        let mut stack = Vec::new();
        let mut curr = t;
        loop {
            while let Some(id) = curr {
                stack.push(id);
                curr = self.arena[id as usize].l;
            }
            match stack.pop() {
                Some(id) => {
                    out.push(id);
                    curr = self.arena[id as usize].r;
                }
                None => break,
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build(tree: &mut RunTree<char, ()>, runs: &[(usize, char)]) -> Option<u32> {
        let mut root = None;
        for &(len, a) in runs {
            let id = tree.alloc(len, a);
            root = tree.merge(root, Some(id));
        }
        root
    }

    fn annotations(tree: &RunTree<char, ()>, t: Option<u32>) -> String {
        tree.in_order(t).into_iter().map(|id| tree.node(id).annotation).collect()
    }

    #[test]
    fn merge_keeps_order_and_aggregates() {
        let mut tree = RunTree::new();
        let runs: Vec<(usize, char)> = (0..40u8).map(|i| (1 + i as usize % 3, (b'a' + i % 26) as char)).collect();
        tree.root = build(&mut tree, &runs);
        assert_eq!(tree.count(), 40);
        assert_eq!(tree.len(), runs.iter().map(|r| r.0).sum::<usize>());
        let expected: String = runs.iter().map(|r| r.1).collect();
        assert_eq!(annotations(&tree, tree.root), expected);
    }

    #[test]
    fn split_by_run_index() {
        let mut tree = RunTree::new();
        let root = build(&mut tree, &[(2, 'a'), (3, 'b'), (1, 'c'), (4, 'd')]);
        let (left, right) = tree.split(root, 2);
        assert_eq!(annotations(&tree, left), "ab");
        assert_eq!(annotations(&tree, right), "cd");
        assert_eq!(tree.sum(left), 5);
        assert_eq!(tree.sum(right), 5);
        let joined = tree.merge(left, right);
        assert_eq!(annotations(&tree, joined), "abcd");
    }

    #[test]
    fn locate_and_nth() {
        let mut tree = RunTree::new();
        tree.root = build(&mut tree, &[(2, 'a'), (3, 'b'), (1, 'c')]);
        assert_eq!(tree.locate(0).map(|(i, s, _)| (i, s)), Some((0, 0)));
        assert_eq!(tree.locate(1).map(|(i, s, _)| (i, s)), Some((0, 0)));
        assert_eq!(tree.locate(2).map(|(i, s, _)| (i, s)), Some((1, 2)));
        assert_eq!(tree.locate(5).map(|(i, s, _)| (i, s)), Some((2, 5)));
        assert_eq!(tree.locate(6), None);
        assert_eq!(tree.nth(1).map(|(_, s)| s), Some(2));
        assert_eq!(tree.nth(3), None);
    }

    #[test]
    fn released_slots_are_reused() {
        let mut tree: RunTree<char, ()> = RunTree::new();
        let a = tree.alloc(1, 'a');
        tree.release(a);
        let b = tree.alloc(2, 'b');
        assert_eq!(a, b);
        assert_eq!(tree.node(b).annotation, 'b');
    }
}
