use crate::capacity::Capacity;
use crate::error::{Error, Result};
use log::debug;
use std::collections::VecDeque;
use std::time::Instant;

/// No arc / free node.
const NONE: u32 = u32::MAX;
/// Parent of a node directly connected to its terminal.
const TERMINAL: u32 = u32::MAX - 1;
/// Parent of a node cut from its tree during augmentation.
const ORPHAN: u32 = u32::MAX - 2;
const INFINITE_D: u32 = u32::MAX;

/// Side of the minimum cut a node ends on.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Segment {
    Source,
    Sink,
}

#[derive(Debug, Clone)]
struct Node<T> {
    first: u32,
    parent: u32,
    /// Node is in the active queue (or is the node currently being grown).
    is_active: bool,
    is_sink: bool,
    /// Timestamp when `dist` was computed.
    ts: u64,
    /// Distance to the terminal along the tree.
    dist: u32,
    tr_cap: T,
}

#[derive(Debug, Clone)]
struct ResidualArc<T> {
    head: u32,
    next: u32,
    r_cap: T,
}

/// Two-terminal graph solved with the Boykov-Kolmogorov max-flow algorithm.
///
/// Arcs are allocated in pairs, the sister of arc `a` is `a ^ 1`. The terminals are not nodes,
/// every node keeps the signed residual of its terminal links (`tr_cap > 0` towards the source).
/// Search trees are kept between augmentations and orphans are re-adopted afterwards.
pub struct Graph<T: Capacity> {
    nodes: Vec<Node<T>>,
    arcs: Vec<ResidualArc<T>>,
    flow: T::Flow,
    active: VecDeque<u32>,
    orphans: VecDeque<u32>,
    time: u64,
}

impl<T: Capacity> Graph<T> {
    /// Creates a graph with `node_count` nodes and room for `edge_count_hint` edges.
    pub fn new(node_count: usize, edge_count_hint: usize) -> Self {
        let mut graph = Self {
            nodes: Vec::with_capacity(node_count),
            arcs: Vec::with_capacity(2 * edge_count_hint),
            flow: T::FLOW_ZERO,
            active: VecDeque::new(),
            orphans: VecDeque::new(),
            time: 0,
        };
        graph.add_node(node_count);
        graph
    }

    /// Adds `count` nodes and returns the index of the first one.
    pub fn add_node(&mut self, count: usize) -> usize {
        let first = self.nodes.len();
        self.nodes.extend((0..count).map(|_| Node {
            first: NONE,
            parent: NONE,
            is_active: false,
            is_sink: false,
            ts: 0,
            dist: 0,
            tr_cap: T::ZERO,
        }));
        first
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.arcs.len() / 2
    }

    /// Flow pushed so far. After `maxflow()` it's the value of the maximum flow.
    pub fn flow(&self) -> T::Flow {
        self.flow
    }

    fn check_node(&self, i: usize) -> Result<()> {
        if i >= self.nodes.len() {
            return Err(Error::graph(format!(
                "node {i} out of range ({} nodes)",
                self.nodes.len()
            )));
        }
        if self.nodes.len() >= ORPHAN as usize {
            return Err(Error::graph("too many nodes"));
        }
        Ok(())
    }

    fn check_capacity(cap: T) -> Result<()> {
        if !cap.is_valid() {
            return Err(Error::graph(format!(
                "capacity {cap} is negative or not finite"
            )));
        }
        Ok(())
    }

    /// Adds arc `i -> j` with capacity `cap` and arc `j -> i` with capacity `rev_cap`.
    pub fn add_edge(&mut self, i: usize, j: usize, cap: T, rev_cap: T) -> Result<()> {
        self.check_node(i)?;
        self.check_node(j)?;
        if i == j {
            return Err(Error::graph(format!("self-loop on node {i}")));
        }
        Self::check_capacity(cap)?;
        Self::check_capacity(rev_cap)?;
        if self.arcs.len() + 2 >= ORPHAN as usize {
            return Err(Error::graph("too many edges"));
        }
        let a = self.arcs.len() as u32;
        self.arcs.push(ResidualArc {
            head: j as u32,
            next: self.nodes[i].first,
            r_cap: cap,
        });
        self.arcs.push(ResidualArc {
            head: i as u32,
            next: self.nodes[j].first,
            r_cap: rev_cap,
        });
        self.nodes[i].first = a;
        self.nodes[j].first = a + 1;
        Ok(())
    }

    /// Adds terminal links: `cap_source` is paid when node `i` ends on the sink side, `cap_sink`
    /// when it ends on the source side.
    ///
    /// Can be called several times for the same node, the capacities accumulate. The part both
    /// terminal links share is a constant of every cut and is counted as flow right away.
    pub fn add_tweights(&mut self, i: usize, cap_source: T, cap_sink: T) -> Result<()> {
        self.check_node(i)?;
        Self::check_capacity(cap_source)?;
        Self::check_capacity(cap_sink)?;
        let delta = self.nodes[i].tr_cap;
        let (cap_source, cap_sink) = if delta > T::ZERO {
            (cap_source.checked_add(delta), Some(cap_sink))
        } else {
            (Some(cap_source), cap_sink.checked_add(-delta))
        };
        let (cap_source, cap_sink) = match (cap_source, cap_sink) {
            (Some(s), Some(t)) => (s, t),
            _ => {
                return Err(Error::overflow(format!(
                    "terminal capacity of node {i} overflows"
                )))
            }
        };
        let shared = if cap_source < cap_sink {
            cap_source
        } else {
            cap_sink
        };
        self.flow = T::checked_add_flow(self.flow, shared.widen())
            .ok_or_else(|| Error::overflow("constant flow of terminal links overflows"))?;
        self.nodes[i].tr_cap = cap_source - cap_sink;
        Ok(())
    }

    /// Fail-fast pass run before solving.
    fn validate(&self) -> Result<()> {
        if self.nodes.is_empty() {
            return Err(Error::graph("graph has no nodes"));
        }
        for (k, pair) in self.arcs.chunks_exact(2).enumerate() {
            if pair[0].r_cap.checked_add(pair[1].r_cap).is_none() {
                return Err(Error::overflow(format!(
                    "capacities of edge {k} ({} -> {}) overflow when combined",
                    pair[1].head, pair[0].head
                )));
            }
        }
        let mut total = self.flow;
        for node in self.nodes.iter().filter(|n| n.tr_cap > T::ZERO) {
            total = T::checked_add_flow(total, node.tr_cap.widen())
                .ok_or_else(|| Error::overflow("sum of source capacities overflows"))?;
        }
        Ok(())
    }

    #[inline(always)]
    fn set_active(&mut self, i: u32) {
        let node = &mut self.nodes[i as usize];
        if !node.is_active {
            node.is_active = true;
            self.active.push_back(i);
        }
    }

    /// Next node of the active queue, skipping nodes which became free while queued.
    fn next_active(&mut self) -> Option<u32> {
        while let Some(i) = self.active.pop_front() {
            let node = &mut self.nodes[i as usize];
            node.is_active = false;
            if node.parent != NONE {
                return Some(i);
            }
        }
        None
    }

    #[inline(always)]
    fn set_orphan_front(&mut self, i: u32) {
        self.nodes[i as usize].parent = ORPHAN;
        self.orphans.push_front(i);
    }

    #[inline(always)]
    fn set_orphan_rear(&mut self, i: u32) {
        self.nodes[i as usize].parent = ORPHAN;
        self.orphans.push_back(i);
    }

    fn maxflow_init(&mut self) {
        self.active.clear();
        self.orphans.clear();
        self.time = 0;
        for i in 0..self.nodes.len() as u32 {
            let node = &mut self.nodes[i as usize];
            node.is_active = false;
            node.ts = 0;
            if node.tr_cap > T::ZERO {
                node.is_sink = false;
                node.parent = TERMINAL;
                node.dist = 1;
                self.set_active(i);
            } else if node.tr_cap < T::ZERO {
                node.is_sink = true;
                node.parent = TERMINAL;
                node.dist = 1;
                self.set_active(i);
            } else {
                node.parent = NONE;
            }
        }
    }

    /// Grows the tree of node `i` by one layer. Returns the arc (oriented from the source tree
    /// to the sink tree) where the trees touch, or `NONE`.
    fn grow(&mut self, i: u32) -> u32 {
        let (is_sink, ts, dist) = {
            let node = &self.nodes[i as usize];
            (node.is_sink, node.ts, node.dist)
        };
        let mut a = self.nodes[i as usize].first;
        while a != NONE {
            let ResidualArc { head, next, .. } = self.arcs[a as usize];
            let r_cap = if is_sink {
                self.arcs[(a ^ 1) as usize].r_cap
            } else {
                self.arcs[a as usize].r_cap
            };
            if r_cap > T::ZERO {
                let j = &mut self.nodes[head as usize];
                if j.parent == NONE {
                    j.is_sink = is_sink;
                    j.parent = a ^ 1;
                    j.ts = ts;
                    j.dist = dist + 1;
                    self.set_active(head);
                } else if j.is_sink != is_sink {
                    return if is_sink { a ^ 1 } else { a };
                } else if j.ts <= ts && j.dist > dist {
                    // shorter path through `i`
                    j.parent = a ^ 1;
                    j.ts = ts;
                    j.dist = dist + 1;
                }
            }
            a = next;
        }
        NONE
    }

    fn augment(&mut self, middle: u32) {
        let mut bottleneck = self.arcs[middle as usize].r_cap;

        // find the bottleneck capacity
        let mut i = self.arcs[(middle ^ 1) as usize].head;
        loop {
            let a = self.nodes[i as usize].parent;
            if a == TERMINAL {
                break;
            }
            let cap = self.arcs[(a ^ 1) as usize].r_cap;
            if bottleneck > cap {
                bottleneck = cap;
            }
            i = self.arcs[a as usize].head;
        }
        let cap = self.nodes[i as usize].tr_cap;
        if bottleneck > cap {
            bottleneck = cap;
        }
        let mut i = self.arcs[middle as usize].head;
        loop {
            let a = self.nodes[i as usize].parent;
            if a == TERMINAL {
                break;
            }
            let cap = self.arcs[a as usize].r_cap;
            if bottleneck > cap {
                bottleneck = cap;
            }
            i = self.arcs[a as usize].head;
        }
        let cap = -self.nodes[i as usize].tr_cap;
        if bottleneck > cap {
            bottleneck = cap;
        }

        // augment the source tree
        self.arcs[(middle ^ 1) as usize].r_cap += bottleneck;
        self.arcs[middle as usize].r_cap -= bottleneck;
        let mut i = self.arcs[(middle ^ 1) as usize].head;
        loop {
            let a = self.nodes[i as usize].parent;
            if a == TERMINAL {
                break;
            }
            self.arcs[a as usize].r_cap += bottleneck;
            self.arcs[(a ^ 1) as usize].r_cap -= bottleneck;
            if self.arcs[(a ^ 1) as usize].r_cap == T::ZERO {
                self.set_orphan_front(i);
            }
            i = self.arcs[a as usize].head;
        }
        self.nodes[i as usize].tr_cap -= bottleneck;
        if self.nodes[i as usize].tr_cap == T::ZERO {
            self.set_orphan_front(i);
        }

        // augment the sink tree
        let mut i = self.arcs[middle as usize].head;
        loop {
            let a = self.nodes[i as usize].parent;
            if a == TERMINAL {
                break;
            }
            self.arcs[(a ^ 1) as usize].r_cap += bottleneck;
            self.arcs[a as usize].r_cap -= bottleneck;
            if self.arcs[a as usize].r_cap == T::ZERO {
                self.set_orphan_front(i);
            }
            i = self.arcs[a as usize].head;
        }
        self.nodes[i as usize].tr_cap += bottleneck;
        if self.nodes[i as usize].tr_cap == T::ZERO {
            self.set_orphan_front(i);
        }

        self.flow += bottleneck.widen();
    }

    /// Distance from `j` to its terminal through valid parents, or `INFINITE_D` when the walk
    /// ends in an orphan. Marks every node with a known distance with the current timestamp.
    fn origin_distance(&mut self, mut j: u32) -> u32 {
        let mut d: u32 = 0;
        loop {
            let node = &self.nodes[j as usize];
            if node.ts == self.time {
                return d + node.dist;
            }
            let a = node.parent;
            d += 1;
            if a == TERMINAL {
                let node = &mut self.nodes[j as usize];
                node.ts = self.time;
                node.dist = 1;
                return d;
            }
            if a == ORPHAN {
                return INFINITE_D;
            }
            j = self.arcs[a as usize].head;
        }
    }

    fn process_orphan(&mut self, i: u32) {
        let is_sink = self.nodes[i as usize].is_sink;
        let mut a0_min = NONE;
        let mut d_min = INFINITE_D;

        // try to find a new valid parent
        let mut a0 = self.nodes[i as usize].first;
        while a0 != NONE {
            let ResidualArc { head, next, .. } = self.arcs[a0 as usize];
            let r_cap = if is_sink {
                self.arcs[a0 as usize].r_cap
            } else {
                self.arcs[(a0 ^ 1) as usize].r_cap
            };
            let j = &self.nodes[head as usize];
            if r_cap > T::ZERO && j.is_sink == is_sink && j.parent != NONE {
                let mut d = self.origin_distance(head);
                if d < INFINITE_D {
                    if d < d_min {
                        a0_min = a0;
                        d_min = d;
                    }
                    // set marks along the path
                    let mut j = head;
                    while self.nodes[j as usize].ts != self.time {
                        let node = &mut self.nodes[j as usize];
                        node.ts = self.time;
                        node.dist = d;
                        d -= 1;
                        j = self.arcs[node.parent as usize].head;
                    }
                }
            }
            a0 = next;
        }

        if a0_min != NONE {
            let node = &mut self.nodes[i as usize];
            node.parent = a0_min;
            node.ts = self.time;
            node.dist = d_min + 1;
            return;
        }

        // no parent is found, `i` becomes free and its children orphans
        self.nodes[i as usize].parent = NONE;
        let mut a0 = self.nodes[i as usize].first;
        while a0 != NONE {
            let ResidualArc { head, next, .. } = self.arcs[a0 as usize];
            let j = &self.nodes[head as usize];
            let a = j.parent;
            if j.is_sink == is_sink && a != NONE {
                let r_cap = if is_sink {
                    self.arcs[a0 as usize].r_cap
                } else {
                    self.arcs[(a0 ^ 1) as usize].r_cap
                };
                if r_cap > T::ZERO {
                    self.set_active(head);
                }
                if a != TERMINAL && a != ORPHAN && self.arcs[a as usize].head == i {
                    self.set_orphan_rear(head);
                }
            }
            a0 = next;
        }
    }

    fn adopt_orphans(&mut self) {
        while let Some(i) = self.orphans.pop_front() {
            self.process_orphan(i);
        }
    }

    /// Computes the maximum flow (= minimum cut value).
    ///
    /// Fails only in the validation pass, once it starts the algorithm always terminates since
    /// the flow is bounded by the total source capacity.
    pub fn maxflow(&mut self) -> Result<T::Flow> {
        self.validate()?;
        let t0 = Instant::now();
        self.maxflow_init();
        let mut current = NONE;
        let mut augmentations: usize = 0;
        loop {
            let mut i = NONE;
            if current != NONE {
                let node = &mut self.nodes[current as usize];
                node.is_active = false;
                if node.parent != NONE {
                    i = current;
                }
            }
            if i == NONE {
                match self.next_active() {
                    Some(n) => i = n,
                    None => break,
                }
            }

            let middle = self.grow(i);
            self.time += 1;

            if middle != NONE {
                // keep `i` as the current node, it may still have arcs to the other tree
                self.nodes[i as usize].is_active = true;
                current = i;
                self.augment(middle);
                augmentations += 1;
                self.adopt_orphans();
            } else {
                current = NONE;
            }
        }
        debug!(
            "maxflow: {} nodes, {} edges, flow {}, {augmentations} augmentations, took {:?}",
            self.nodes.len(),
            self.arcs.len() / 2,
            self.flow,
            t0.elapsed()
        );
        Ok(self.flow)
    }

    /// Side of the cut node `i` belongs to. Nodes reachable from the source in the residual
    /// graph are on the source side, everything else on the sink side.
    pub fn what_segment(&self, i: usize) -> Segment {
        let node = &self.nodes[i];
        if node.parent != NONE && !node.is_sink {
            Segment::Source
        } else {
            Segment::Sink
        }
    }

    /// Binary labeling, `1` for the source side and `0` for the sink side.
    pub fn labels(&self) -> Vec<u8> {
        (0..self.nodes.len())
            .map(|i| (self.what_segment(i) == Segment::Source) as u8)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::{Graph, Segment, NONE};
    use crate::error::Error;
    use proptest::prelude::*;
    use std::collections::VecDeque;

    type Terminals = Vec<(i32, i32)>;
    type Edges = Vec<(usize, usize, i32, i32)>;

    fn build(terminals: &Terminals, edges: &Edges) -> Graph<i32> {
        let mut g = Graph::new(terminals.len(), edges.len());
        for (i, (s, t)) in terminals.iter().enumerate() {
            g.add_tweights(i, *s, *t).unwrap();
        }
        for (i, j, cap, rev) in edges {
            if i != j {
                g.add_edge(*i, *j, *cap, *rev).unwrap();
            }
        }
        g
    }

    fn cut_value(terminals: &Terminals, edges: &Edges, labels: &[u8]) -> i64 {
        let mut value = 0i64;
        for ((s, t), l) in terminals.iter().zip(labels) {
            value += if *l == 1 { *t as i64 } else { *s as i64 };
        }
        for (i, j, cap, rev) in edges.iter().filter(|(i, j, _, _)| i != j) {
            if labels[*i] == 1 && labels[*j] == 0 {
                value += *cap as i64;
            }
            if labels[*j] == 1 && labels[*i] == 0 {
                value += *rev as i64;
            }
        }
        value
    }

    fn brute_force_min_cut(terminals: &Terminals, edges: &Edges) -> i64 {
        let n = terminals.len();
        (0u32..(1 << n))
            .map(|mask| {
                let labels: Vec<u8> = (0..n).map(|i| ((mask >> i) & 1) as u8).collect();
                cut_value(terminals, edges, &labels)
            })
            .min()
            .unwrap()
    }

    /// Breadth-first search from the source in the residual graph.
    fn has_augmenting_path(g: &Graph<i32>) -> bool {
        let mut seen = vec![false; g.nodes.len()];
        let mut queue: VecDeque<usize> = (0..g.nodes.len())
            .filter(|i| g.nodes[*i].tr_cap > 0)
            .collect();
        queue.iter().for_each(|i| seen[*i] = true);
        while let Some(i) = queue.pop_front() {
            if g.nodes[i].tr_cap < 0 {
                return true;
            }
            let mut a = g.nodes[i].first;
            while a != NONE {
                let arc = &g.arcs[a as usize];
                if arc.r_cap > 0 && !seen[arc.head as usize] {
                    seen[arc.head as usize] = true;
                    queue.push_back(arc.head as usize);
                }
                a = arc.next;
            }
        }
        false
    }

    fn graph_strategy() -> impl Strategy<Value = (Terminals, Edges)> {
        (2usize..8).prop_flat_map(|n| {
            (
                proptest::collection::vec((0i32..20, 0i32..20), n),
                proptest::collection::vec((0..n, 0..n, 0i32..20, 0i32..20), 0..20),
            )
        })
    }

    #[test]
    fn simple_graph_test() {
        // s -> 0 (6), s -> 1 (4), 0 -> 2 (3), 1 -> 2 (6), 0 -> 1 (2), 2 -> t (100)
        let mut g: Graph<i32> = Graph::new(3, 3);
        g.add_tweights(0, 6, 0).unwrap();
        g.add_tweights(1, 4, 0).unwrap();
        g.add_tweights(2, 0, 100).unwrap();
        g.add_edge(0, 2, 3, 0).unwrap();
        g.add_edge(1, 2, 6, 0).unwrap();
        g.add_edge(0, 1, 2, 0).unwrap();
        assert_eq!(g.maxflow().unwrap(), 9);
        assert_eq!(g.what_segment(0), Segment::Source);
        assert_eq!(g.what_segment(1), Segment::Sink);
        assert_eq!(g.what_segment(2), Segment::Sink);
    }

    #[test]
    fn smoothing_wins_over_weak_unary_test() {
        // 2x2 grid: top row (A) weakly prefers the source, bottom row (B) weakly prefers the sink
        let terminals: Terminals = vec![(3, 1), (3, 1), (1, 2), (1, 2)];
        let strong: Edges = vec![(0, 1, 10, 10), (2, 3, 10, 10), (0, 2, 10, 10), (1, 3, 10, 10)];
        let mut g = build(&terminals, &strong);
        assert_eq!(g.maxflow().unwrap(), 6);
        assert_eq!(g.labels(), vec![1, 1, 1, 1]);

        let weak: Edges = vec![(0, 1, 1, 1), (2, 3, 1, 1), (0, 2, 0, 0), (1, 3, 0, 0)];
        let mut g = build(&terminals, &weak);
        assert_eq!(g.maxflow().unwrap(), 4);
        assert_eq!(g.labels(), vec![1, 1, 0, 0]);
    }

    #[test]
    fn float_capacities_test() {
        let mut g: Graph<f32> = Graph::new(2, 1);
        g.add_tweights(0, 2.5, 0.0).unwrap();
        g.add_tweights(1, 0.0, 1.25).unwrap();
        g.add_edge(0, 1, 0.75, 0.0).unwrap();
        assert_eq!(g.maxflow().unwrap(), 0.75);
        assert_eq!(g.labels(), vec![1, 0]);
    }

    #[test]
    fn cumulative_tweights_test() {
        let mut g: Graph<i64> = Graph::new(1, 0);
        g.add_tweights(0, 4, 1).unwrap();
        g.add_tweights(0, 0, 5).unwrap();
        // source 4, sink 6
        assert_eq!(g.maxflow().unwrap(), 4);
        assert_eq!(g.what_segment(0), Segment::Sink);
    }

    #[test]
    fn invalid_graph_test() {
        let mut g: Graph<f32> = Graph::new(2, 1);
        assert!(matches!(
            g.add_edge(0, 1, -1.0, 0.0),
            Err(Error::InvalidGraph(_))
        ));
        assert!(matches!(
            g.add_tweights(0, f32::NAN, 0.0),
            Err(Error::InvalidGraph(_))
        ));
        assert!(matches!(
            g.add_edge(0, 2, 1.0, 1.0),
            Err(Error::InvalidGraph(_))
        ));
        assert!(matches!(
            g.add_edge(1, 1, 1.0, 1.0),
            Err(Error::InvalidGraph(_))
        ));
        let mut empty: Graph<f32> = Graph::new(0, 0);
        assert!(matches!(empty.maxflow(), Err(Error::InvalidGraph(_))));
    }

    #[test]
    fn numeric_overflow_test() {
        let mut g: Graph<i32> = Graph::new(2, 1);
        g.add_edge(0, 1, i32::MAX, 1).unwrap();
        assert!(matches!(g.maxflow(), Err(Error::NumericOverflow(_))));

        let mut g: Graph<i32> = Graph::new(1, 0);
        g.add_tweights(0, i32::MAX, 0).unwrap();
        assert!(matches!(
            g.add_tweights(0, 1, 0),
            Err(Error::NumericOverflow(_))
        ));

        // i32 capacities accumulate into i64 flow
        let mut g: Graph<i32> = Graph::new(3, 0);
        for i in 0..3 {
            g.add_tweights(i, i32::MAX, i32::MAX).unwrap();
        }
        assert_eq!(g.maxflow().unwrap(), 3 * i32::MAX as i64);
    }

    proptest! {
        #[test]
        fn flow_equals_min_cut((terminals, edges) in graph_strategy()) {
            let mut g = build(&terminals, &edges);
            let flow = g.maxflow().unwrap();
            let labels = g.labels();
            prop_assert_eq!(flow, cut_value(&terminals, &edges, &labels));
            prop_assert_eq!(flow, brute_force_min_cut(&terminals, &edges));
            prop_assert!(!has_augmenting_path(&g));
        }

        #[test]
        fn flow_monotone_in_capacity(
            (terminals, edges) in graph_strategy(),
            pick in 0usize..64,
            extra in 1i32..30,
        ) {
            let mut g = build(&terminals, &edges);
            let base = g.maxflow().unwrap();
            let mut edges_inc = edges.clone();
            let mut terminals_inc = terminals.clone();
            if edges_inc.is_empty() {
                terminals_inc[pick % terminals.len()].0 += extra;
            } else {
                let k = pick % edges_inc.len();
                edges_inc[k].2 += extra;
            }
            let mut g_inc = build(&terminals_inc, &edges_inc);
            prop_assert!(g_inc.maxflow().unwrap() >= base);
        }

        #[test]
        fn rerun_is_identical((terminals, edges) in graph_strategy()) {
            let mut g1 = build(&terminals, &edges);
            let mut g2 = build(&terminals, &edges);
            prop_assert_eq!(g1.maxflow().unwrap(), g2.maxflow().unwrap());
            prop_assert_eq!(g1.labels(), g2.labels());
        }
    }
}
