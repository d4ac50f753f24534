//! Dinic max-flow over a pixel graph with two terminals
//!
//! Arcs are stored in pairs so that `arc ^ 1` is always the reverse arc.
//! The augmenting search is iterative, so path length is bounded by memory
//! rather than by the call stack.

use std::collections::VecDeque;

const NONE: u32 = u32::MAX;
const EPSILON: f64 = 1e-9;

#[derive(Debug)]
pub struct FlowGraph {
    first: Vec<u32>,
    next: Vec<u32>,
    to: Vec<u32>,
    capacity: Vec<f64>,
    source: usize,
    sink: usize,
    /// Flow pushed directly through a node when both terminal links are set
    cancelled: f64,
}

impl FlowGraph {
    /// Graph with `nodes` inner nodes plus a source and a sink
    #[must_use]
    pub fn new(nodes: usize, arc_hint: usize) -> Self {
        Self {
            first: vec![NONE; nodes + 2],
            next: Vec::with_capacity(arc_hint),
            to: Vec::with_capacity(arc_hint),
            capacity: Vec::with_capacity(arc_hint),
            source: nodes,
            sink: nodes + 1,
            cancelled: 0.0,
        }
    }

    fn push_arc(&mut self, from: usize, to: usize, capacity: f64) {
        let index = self.to.len() as u32;
        self.to.push(to as u32);
        self.capacity.push(capacity);
        self.next.push(self.first[from]);
        self.first[from] = index;
    }

    /// Add an edge with independent capacities in each direction
    pub fn add_edge(&mut self, a: usize, b: usize, forward: f64, backward: f64) {
        self.push_arc(a, b, forward);
        self.push_arc(b, a, backward);
    }

    /// Connect a node to both terminals
    ///
    /// The common part of the two capacities can never be part of the cut, so
    /// it is counted as flow immediately and only the remainder is stored.
    pub fn add_terminal_weights(&mut self, node: usize, from_source: f64, to_sink: f64) {
        let common = from_source.min(to_sink);
        self.cancelled += common;
        let (from_source, to_sink) = (from_source - common, to_sink - common);
        if from_source > EPSILON {
            self.add_edge(self.source, node, from_source, 0.0);
        }
        if to_sink > EPSILON {
            self.add_edge(node, self.sink, to_sink, 0.0);
        }
    }

    fn levels(&self) -> Option<Vec<i32>> {
        let mut level = vec![-1i32; self.first.len()];
        let mut queue = VecDeque::new();
        level[self.source] = 0;
        queue.push_back(self.source);
        while let Some(u) = queue.pop_front() {
            let mut arc = self.first[u];
            while arc != NONE {
                let a = arc as usize;
                let v = self.to[a] as usize;
                if level[v] < 0 && self.capacity[a] > EPSILON {
                    level[v] = level[u] + 1;
                    queue.push_back(v);
                }
                arc = self.next[a];
            }
        }
        (level[self.sink] >= 0).then_some(level)
    }

    fn tail_of(&self, path: &[u32]) -> usize {
        path.last().map_or(self.source, |&a| self.to[a as usize] as usize)
    }

    /// Push a blocking flow along the level graph
    fn blocking_flow(&mut self, level: &mut [i32]) -> f64 {
        let mut current = self.first.clone();
        let mut path: Vec<u32> = Vec::new();
        let mut pushed = 0.0;
        let mut u = self.source;

        loop {
            if u == self.sink {
                let bottleneck = path
                    .iter()
                    .map(|&a| self.capacity[a as usize])
                    .fold(f64::INFINITY, f64::min);
                for &a in &path {
                    self.capacity[a as usize] -= bottleneck;
                    self.capacity[(a ^ 1) as usize] += bottleneck;
                }
                pushed += bottleneck;
                let saturated = path
                    .iter()
                    .position(|&a| self.capacity[a as usize] <= EPSILON)
                    .unwrap_or(0);
                path.truncate(saturated);
                u = self.tail_of(&path);
                continue;
            }

            let mut advanced = false;
            while current[u] != NONE {
                let a = current[u] as usize;
                let v = self.to[a] as usize;
                if self.capacity[a] > EPSILON && level[v] == level[u] + 1 {
                    path.push(a as u32);
                    u = v;
                    advanced = true;
                    break;
                }
                current[u] = self.next[a];
            }

            if !advanced {
                if u == self.source {
                    break;
                }
                // Dead end: drop the node from this phase
                level[u] = -1;
                path.pop();
                u = self.tail_of(&path);
            }
        }

        pushed
    }

    /// Run max-flow; returns the total flow including cancelled terminal flow
    pub fn max_flow(&mut self) -> f64 {
        let mut flow = self.cancelled;
        while let Some(mut level) = self.levels() {
            let pushed = self.blocking_flow(&mut level);
            if pushed <= EPSILON {
                break;
            }
            flow += pushed;
        }
        flow
    }

    /// Inner nodes still reachable from the source in the residual graph
    #[must_use]
    pub fn source_side(&self) -> Vec<bool> {
        let mut seen = vec![false; self.first.len()];
        let mut queue = VecDeque::from([self.source]);
        seen[self.source] = true;
        while let Some(u) = queue.pop_front() {
            let mut arc = self.first[u];
            while arc != NONE {
                let a = arc as usize;
                let v = self.to[a] as usize;
                if !seen[v] && self.capacity[a] > EPSILON {
                    seen[v] = true;
                    queue.push_back(v);
                }
                arc = self.next[a];
            }
        }
        seen.truncate(self.source);
        seen
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chain_bottleneck() {
        let mut graph = FlowGraph::new(3, 16);
        graph.add_terminal_weights(0, 10.0, 0.0);
        graph.add_edge(0, 1, 4.0, 0.0);
        graph.add_edge(1, 2, 7.0, 0.0);
        graph.add_terminal_weights(2, 0.0, 10.0);
        assert!((graph.max_flow() - 4.0).abs() < 1e-9);
        assert_eq!(graph.source_side(), vec![true, false, false]);
    }

    #[test]
    fn test_cancelled_terminal_flow_counts() {
        let mut graph = FlowGraph::new(1, 4);
        graph.add_terminal_weights(0, 3.0, 5.0);
        assert!((graph.max_flow() - 3.0).abs() < 1e-9);
        assert_eq!(graph.source_side(), vec![false]);
    }

    #[test]
    fn test_classic_network() {
        // Two parallel routes with a cross link
        let mut graph = FlowGraph::new(4, 32);
        graph.add_terminal_weights(0, 10.0, 0.0);
        graph.add_terminal_weights(1, 10.0, 0.0);
        graph.add_edge(0, 2, 4.0, 0.0);
        graph.add_edge(0, 1, 2.0, 0.0);
        graph.add_edge(1, 3, 9.0, 0.0);
        graph.add_edge(2, 3, 6.0, 0.0);
        graph.add_terminal_weights(2, 0.0, 10.0);
        graph.add_terminal_weights(3, 0.0, 10.0);
        // Source arcs 10 + 10, but 0 only leaves through 4 + 2 and 1 through 9
        assert!((graph.max_flow() - 13.0).abs() < 1e-9);
    }

    #[test]
    fn test_undirected_grid_cut() {
        // 1×4 strip: strong links inside halves, weak link in the middle
        let mut graph = FlowGraph::new(4, 32);
        graph.add_terminal_weights(0, 100.0, 0.0);
        graph.add_terminal_weights(3, 0.0, 100.0);
        graph.add_edge(0, 1, 50.0, 50.0);
        graph.add_edge(1, 2, 1.0, 1.0);
        graph.add_edge(2, 3, 50.0, 50.0);
        assert!((graph.max_flow() - 1.0).abs() < 1e-9);
        assert_eq!(graph.source_side(), vec![true, true, false, false]);
    }
}
