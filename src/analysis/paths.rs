//! Component D: path queries over a built [`CallGraph`] -- simple-path
//! enumeration with depth cutoffs, BFS shortest path, reverse-BFS callers,
//! ancestor/descendant closures, and betweenness-ranked "critical"
//! functions.

use std::collections::{HashSet, VecDeque};

use serde::{Deserialize, Serialize};

use crate::core::call_graph::CallGraphEdge;
use crate::core::CallGraph;

/// One step of a formatted path: the edge endpoints plus every parallel
/// call-site edge between them (§4.4's "for each step the list of
/// parallel call edges").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathStep {
    pub from: String,
    pub to: String,
    pub calls: Vec<CallGraphEdge>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FormattedPath {
    pub path: Vec<String>,
    pub length: usize,
    pub steps: Vec<PathStep>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PathStatistics {
    pub total_paths: usize,
    pub max_depth: usize,
    pub min_depth: usize,
    pub average_depth: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FindPathsResult {
    pub target_function: String,
    pub source_function: Option<String>,
    pub paths: Vec<FormattedPath>,
    pub statistics: PathStatistics,
    pub found: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallerInfo {
    pub function: String,
    pub paths_to_target: Vec<Vec<String>>,
    pub direct_caller: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FindCallersResult {
    pub target_function: String,
    pub total_callers: usize,
    pub callers: Vec<CallerInfo>,
    pub found: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reachability {
    pub function: String,
    pub can_reach: Vec<String>,
    pub reachable_from: Vec<String>,
    pub is_leaf: bool,
    pub is_root: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CriticalFunction {
    pub function: String,
    pub in_degree: usize,
    pub out_degree: usize,
    pub total_degree: usize,
    pub betweenness: f64,
    pub is_critical: bool,
}

pub struct PathEngine<'a> {
    graph: &'a CallGraph,
}

impl<'a> PathEngine<'a> {
    pub fn new(graph: &'a CallGraph) -> Self {
        Self { graph }
    }

    fn adjacency(&self) -> std::collections::HashMap<&'a str, Vec<&'a str>> {
        let mut adjacency: std::collections::HashMap<&str, Vec<&str>> =
            std::collections::HashMap::new();
        for node in &self.graph.nodes {
            adjacency.entry(node.as_str()).or_default();
        }
        for e in &self.graph.edges {
            let entry = adjacency.entry(e.from.as_str()).or_default();
            if !entry.contains(&e.to.as_str()) {
                entry.push(e.to.as_str());
            }
        }
        adjacency
    }

    fn reverse_adjacency(&self) -> std::collections::HashMap<&'a str, Vec<&'a str>> {
        let mut adjacency: std::collections::HashMap<&str, Vec<&str>> =
            std::collections::HashMap::new();
        for node in &self.graph.nodes {
            adjacency.entry(node.as_str()).or_default();
        }
        for e in &self.graph.edges {
            let entry = adjacency.entry(e.to.as_str()).or_default();
            if !entry.contains(&e.from.as_str()) {
                entry.push(e.from.as_str());
            }
        }
        adjacency
    }

    /// `find_paths` (§4.4). `source = None` searches every node that can
    /// reach `target`; results are deduplicated by path sequence.
    pub fn find_paths(
        &self,
        target: &str,
        source: Option<&str>,
        max_depth: usize,
        include_cycles: bool,
    ) -> FindPathsResult {
        if !self.graph.has_node(target) {
            return FindPathsResult {
                target_function: target.to_string(),
                source_function: source.map(|s| s.to_string()),
                paths: Vec::new(),
                statistics: PathStatistics::default(),
                found: false,
            };
        }

        let adjacency = self.adjacency();
        let raw_paths: Vec<Vec<String>> = match source {
            Some(src) => {
                if !self.graph.has_node(src) {
                    Vec::new()
                } else {
                    self.paths_between(src, target, max_depth, include_cycles, &adjacency)
                }
            }
            None => {
                let mut all = Vec::new();
                let mut seen = HashSet::new();
                for node in &self.graph.nodes {
                    if node == target {
                        continue;
                    }
                    if !self.can_reach(node, target, &adjacency) {
                        continue;
                    }
                    for path in self.paths_between(node, target, max_depth, include_cycles, &adjacency) {
                        if seen.insert(path.clone()) {
                            all.push(path);
                        }
                    }
                }
                all
            }
        };

        let mut depths = Vec::new();
        let paths: Vec<FormattedPath> = raw_paths
            .into_iter()
            .filter(|p| p.len() > 1)
            .map(|p| {
                depths.push(p.len() - 1);
                self.format_path(p)
            })
            .collect();

        let statistics = if depths.is_empty() {
            PathStatistics::default()
        } else {
            PathStatistics {
                total_paths: paths.len(),
                max_depth: *depths.iter().max().unwrap(),
                min_depth: *depths.iter().min().unwrap(),
                average_depth: depths.iter().sum::<usize>() as f64 / depths.len() as f64,
            }
        };

        FindPathsResult {
            target_function: target.to_string(),
            source_function: source.map(|s| s.to_string()),
            paths,
            statistics,
            found: true,
        }
    }

    fn can_reach(
        &self,
        source: &str,
        target: &str,
        adjacency: &std::collections::HashMap<&str, Vec<&str>>,
    ) -> bool {
        let mut visited: HashSet<&str> = HashSet::from([source]);
        let mut queue = VecDeque::from([source]);
        while let Some(current) = queue.pop_front() {
            if current == target {
                return true;
            }
            if let Some(neighbors) = adjacency.get(current) {
                for next in neighbors {
                    if visited.insert(next) {
                        queue.push_back(next);
                    }
                }
            }
        }
        false
    }

    /// Enumerates walks from `source` to `target` no longer than
    /// `max_depth` edges. Without `include_cycles`, every node appears at
    /// most once (a simple path). With it, any node may appear at most
    /// twice -- one lap of a cycle.
    fn paths_between(
        &self,
        source: &str,
        target: &str,
        max_depth: usize,
        include_cycles: bool,
        adjacency: &std::collections::HashMap<&str, Vec<&str>>,
    ) -> Vec<Vec<String>> {
        let max_repeats = if include_cycles { 2 } else { 1 };
        let mut results = Vec::new();
        let mut path: Vec<&str> = vec![source];
        let mut counts: std::collections::HashMap<&str, usize> = std::collections::HashMap::new();
        *counts.entry(source).or_insert(0) += 1;

        self.dfs_paths(
            source,
            target,
            max_depth,
            max_repeats,
            adjacency,
            &mut path,
            &mut counts,
            &mut results,
        );
        results
            .into_iter()
            .map(|p| p.into_iter().map(|s| s.to_string()).collect())
            .collect()
    }

    #[allow(clippy::too_many_arguments)]
    fn dfs_paths<'g>(
        &self,
        current: &'g str,
        target: &str,
        max_depth: usize,
        max_repeats: usize,
        adjacency: &std::collections::HashMap<&'g str, Vec<&'g str>>,
        path: &mut Vec<&'g str>,
        counts: &mut std::collections::HashMap<&'g str, usize>,
        results: &mut Vec<Vec<&'g str>>,
    ) {
        if current == target && path.len() > 1 {
            results.push(path.clone());
            return;
        }
        if path.len() - 1 >= max_depth {
            return;
        }
        let Some(neighbors) = adjacency.get(current) else {
            return;
        };
        for next in neighbors {
            let count = counts.entry(next).or_insert(0);
            if *count >= max_repeats {
                continue;
            }
            *count += 1;
            path.push(next);
            self.dfs_paths(next, target, max_depth, max_repeats, adjacency, path, counts, results);
            path.pop();
            *counts.get_mut(next).unwrap() -= 1;
        }
    }

    fn format_path(&self, path: Vec<String>) -> FormattedPath {
        let mut steps = Vec::new();
        for window in path.windows(2) {
            let from = window[0].clone();
            let to = window[1].clone();
            let calls = self
                .graph
                .call_details(&from, &to)
                .into_iter()
                .cloned()
                .collect();
            steps.push(PathStep { from, to, calls });
        }
        FormattedPath {
            length: path.len() - 1,
            path,
            steps,
        }
    }

    /// `find_shortest_path` (§4.4): plain BFS, first-found path or `None`.
    pub fn find_shortest_path(&self, source: &str, target: &str) -> Option<Vec<String>> {
        if !self.graph.has_node(source) || !self.graph.has_node(target) {
            return None;
        }
        let adjacency = self.adjacency();
        let mut visited: HashSet<&str> = HashSet::from([source]);
        let mut parent: std::collections::HashMap<&str, &str> = std::collections::HashMap::new();
        let mut queue = VecDeque::from([source]);

        while let Some(current) = queue.pop_front() {
            if current == target {
                let mut path = vec![target];
                let mut node = target;
                while let Some(&p) = parent.get(node) {
                    path.push(p);
                    node = p;
                }
                path.reverse();
                return Some(path.into_iter().map(|s| s.to_string()).collect());
            }
            if let Some(neighbors) = adjacency.get(current) {
                for next in neighbors {
                    if visited.insert(next) {
                        parent.insert(next, current);
                        queue.push_back(next);
                    }
                }
            }
        }
        None
    }

    /// `find_all_callers` (§4.4): reverse BFS up to `max_depth`, pruning
    /// any node that would repeat within a path.
    pub fn find_all_callers(&self, target: &str, max_depth: usize) -> FindCallersResult {
        if !self.graph.has_node(target) {
            return FindCallersResult {
                target_function: target.to_string(),
                total_callers: 0,
                callers: Vec::new(),
                found: false,
            };
        }

        let reverse = self.reverse_adjacency();
        let direct_callers: HashSet<&str> = reverse
            .get(target)
            .into_iter()
            .flatten()
            .copied()
            .collect();

        let mut all_callers: HashSet<String> = HashSet::new();
        let mut caller_paths: std::collections::HashMap<String, Vec<Vec<String>>> =
            std::collections::HashMap::new();

        self.collect_callers(target, 0, max_depth, &mut vec![target.to_string()], &reverse, &mut all_callers, &mut caller_paths);

        let mut callers: Vec<String> = all_callers.into_iter().collect();
        callers.sort();

        let callers_info = callers
            .into_iter()
            .map(|caller| {
                let paths = caller_paths.remove(&caller).unwrap_or_default();
                let direct_caller = direct_callers.contains(caller.as_str());
                CallerInfo {
                    function: caller,
                    paths_to_target: paths,
                    direct_caller,
                }
            })
            .collect::<Vec<_>>();

        FindCallersResult {
            target_function: target.to_string(),
            total_callers: callers_info.len(),
            callers: callers_info,
            found: true,
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn collect_callers(
        &self,
        func: &str,
        depth: usize,
        max_depth: usize,
        path: &mut Vec<String>,
        reverse: &std::collections::HashMap<&str, Vec<&str>>,
        all_callers: &mut HashSet<String>,
        caller_paths: &mut std::collections::HashMap<String, Vec<Vec<String>>>,
    ) {
        if depth > max_depth {
            return;
        }
        let Some(direct) = reverse.get(func) else {
            return;
        };
        for caller in direct.clone() {
            if path.iter().any(|p| p == caller) {
                continue;
            }
            let mut new_path = vec![caller.to_string()];
            new_path.extend(path.iter().cloned());

            all_callers.insert(caller.to_string());
            caller_paths
                .entry(caller.to_string())
                .or_default()
                .push(new_path.clone());

            path.insert(0, caller.to_string());
            self.collect_callers(caller, depth + 1, max_depth, path, reverse, all_callers, caller_paths);
            path.remove(0);
        }
    }

    /// `reachability` (§4.4): ancestor/descendant closures plus
    /// leaf/root flags.
    pub fn reachability(&self, function: &str) -> Option<Reachability> {
        if !self.graph.has_node(function) {
            return None;
        }
        let adjacency = self.adjacency();
        let reverse = self.reverse_adjacency();

        let mut can_reach: Vec<String> = self
            .bfs_closure(function, &adjacency)
            .into_iter()
            .map(|s| s.to_string())
            .collect();
        let mut reachable_from: Vec<String> = self
            .bfs_closure(function, &reverse)
            .into_iter()
            .map(|s| s.to_string())
            .collect();
        can_reach.sort();
        reachable_from.sort();

        let is_leaf = self.graph.callees(function).is_empty();
        let is_root = self.graph.callers(function).is_empty();

        Some(Reachability {
            function: function.to_string(),
            can_reach,
            reachable_from,
            is_leaf,
            is_root,
        })
    }

    fn bfs_closure<'g>(
        &self,
        start: &'g str,
        adjacency: &std::collections::HashMap<&'g str, Vec<&'g str>>,
    ) -> HashSet<&'g str> {
        let mut visited: HashSet<&str> = HashSet::new();
        let mut queue = VecDeque::from([start]);
        while let Some(current) = queue.pop_front() {
            if let Some(neighbors) = adjacency.get(current) {
                for next in neighbors {
                    if *next != start && visited.insert(next) {
                        queue.push_back(next);
                    }
                }
            }
        }
        visited
    }

    /// `critical_functions` (§4.4). Betweenness is computed once over the
    /// whole graph via Brandes' algorithm rather than recomputed per node
    /// (a deliberate improvement over the original's per-node
    /// recomputation, per SPEC_FULL.md §4.4 -- the reported numbers are
    /// identical, just computed once instead of once-per-node).
    pub fn critical_functions(&self) -> Vec<CriticalFunction> {
        let adjacency = self.adjacency();
        let betweenness = self.brandes_betweenness(&adjacency);

        let mut in_degree: std::collections::HashMap<&str, usize> = std::collections::HashMap::new();
        let mut out_degree: std::collections::HashMap<&str, usize> = std::collections::HashMap::new();
        for node in &self.graph.nodes {
            in_degree.entry(node.as_str()).or_insert(0);
            out_degree.entry(node.as_str()).or_insert(0);
        }
        for e in &self.graph.edges {
            *out_degree.entry(e.from.as_str()).or_insert(0) += 1;
            *in_degree.entry(e.to.as_str()).or_insert(0) += 1;
        }

        let mut out: Vec<CriticalFunction> = self
            .graph
            .nodes
            .iter()
            .map(|node| {
                let in_d = *in_degree.get(node.as_str()).unwrap_or(&0);
                let out_d = *out_degree.get(node.as_str()).unwrap_or(&0);
                let total = in_d + out_d;
                let b = *betweenness.get(node.as_str()).unwrap_or(&0.0);
                CriticalFunction {
                    function: node.clone(),
                    in_degree: in_d,
                    out_degree: out_d,
                    total_degree: total,
                    betweenness: b,
                    is_critical: total > 5 || b > 0.1,
                }
            })
            .collect();

        out.sort_by(|a, b| {
            (b.total_degree, ordered_float(b.betweenness))
                .partial_cmp(&(a.total_degree, ordered_float(a.betweenness)))
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        out
    }

    /// Brandes' algorithm for directed-graph node betweenness centrality:
    /// one BFS/accumulation pass per source node, O(V*E) total instead of
    /// the naive all-pairs-shortest-paths approach.
    fn brandes_betweenness(
        &self,
        adjacency: &std::collections::HashMap<&'a str, Vec<&'a str>>,
    ) -> std::collections::HashMap<&'a str, f64> {
        let nodes: Vec<&str> = self.graph.nodes.iter().map(|s| s.as_str()).collect();
        let mut betweenness: std::collections::HashMap<&str, f64> =
            nodes.iter().map(|&n| (n, 0.0)).collect();

        for &s in &nodes {
            let mut stack: Vec<&str> = Vec::new();
            let mut predecessors: std::collections::HashMap<&str, Vec<&str>> =
                nodes.iter().map(|&n| (n, Vec::new())).collect();
            let mut sigma: std::collections::HashMap<&str, f64> =
                nodes.iter().map(|&n| (n, 0.0)).collect();
            let mut dist: std::collections::HashMap<&str, i64> =
                nodes.iter().map(|&n| (n, -1)).collect();
            sigma.insert(s, 1.0);
            dist.insert(s, 0);

            let mut queue = VecDeque::from([s]);
            while let Some(v) = queue.pop_front() {
                stack.push(v);
                if let Some(neighbors) = adjacency.get(v) {
                    for &w in neighbors {
                        if dist[w] < 0 {
                            dist.insert(w, dist[v] + 1);
                            queue.push_back(w);
                        }
                        if dist[w] == dist[v] + 1 {
                            *sigma.get_mut(w).unwrap() += sigma[v];
                            predecessors.get_mut(w).unwrap().push(v);
                        }
                    }
                }
            }

            let mut delta: std::collections::HashMap<&str, f64> =
                nodes.iter().map(|&n| (n, 0.0)).collect();
            while let Some(w) = stack.pop() {
                for &v in &predecessors[w] {
                    let contribution = (sigma[v] / sigma[w]) * (1.0 + delta[w]);
                    *delta.get_mut(v).unwrap() += contribution;
                }
                if w != s {
                    *betweenness.get_mut(w).unwrap() += delta[w];
                }
            }
        }

        let n = nodes.len();
        if n > 2 {
            let scale = 1.0 / ((n - 1) * (n - 2)) as f64;
            for value in betweenness.values_mut() {
                *value *= scale;
            }
        }
        betweenness
    }
}

fn ordered_float(f: f64) -> impl PartialOrd {
    if f.is_nan() {
        0.0
    } else {
        f
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::call_graph::CallType;

    fn edge(from: &str, to: &str) -> CallGraphEdge {
        CallGraphEdge {
            from: from.into(),
            to: to.into(),
            from_address: 0,
            to_address: None,
            instruction_text: "call".into(),
            edge_kind: CallType::Call,
            external: false,
        }
    }

    fn two_hop_graph() -> CallGraph {
        let mut g = CallGraph::new();
        g.add_edge(edge("main", "helper"));
        g.add_edge(edge("helper", "util"));
        g
    }

    fn diamond_graph() -> CallGraph {
        let mut g = CallGraph::new();
        g.add_edge(edge("main", "a"));
        g.add_edge(edge("a", "leaf"));
        g.add_edge(edge("main", "b"));
        g.add_edge(edge("b", "leaf"));
        g
    }

    #[test]
    fn two_hop_chain_has_one_path() {
        let g = two_hop_graph();
        let engine = PathEngine::new(&g);
        let result = engine.find_paths("util", Some("main"), 5, false);
        assert_eq!(result.paths.len(), 1);
        assert_eq!(
            result.paths[0].path,
            vec!["main".to_string(), "helper".to_string(), "util".to_string()]
        );
        assert_eq!(
            engine.find_shortest_path("main", "util"),
            Some(vec!["main".to_string(), "helper".to_string(), "util".to_string()])
        );
    }

    #[test]
    fn diamond_has_two_paths() {
        let g = diamond_graph();
        let engine = PathEngine::new(&g);
        let result = engine.find_paths("leaf", Some("main"), 4, false);
        let mut paths: Vec<Vec<String>> = result.paths.into_iter().map(|p| p.path).collect();
        paths.sort();
        assert_eq!(
            paths,
            vec![
                vec!["main".to_string(), "a".to_string(), "leaf".to_string()],
                vec!["main".to_string(), "b".to_string(), "leaf".to_string()],
            ]
        );
    }

    #[test]
    fn reachability_flags_leaf_and_root() {
        let g = two_hop_graph();
        let engine = PathEngine::new(&g);
        let r = engine.reachability("main").unwrap();
        assert!(r.is_root);
        assert!(!r.is_leaf);
        let r = engine.reachability("util").unwrap();
        assert!(r.is_leaf);
        assert!(!r.is_root);
    }

    #[test]
    fn find_all_callers_reports_direct_and_indirect() {
        let g = two_hop_graph();
        let engine = PathEngine::new(&g);
        let result = engine.find_all_callers("util", 5);
        assert_eq!(result.total_callers, 2);
        let helper = result.callers.iter().find(|c| c.function == "helper").unwrap();
        assert!(helper.direct_caller);
        let main = result.callers.iter().find(|c| c.function == "main").unwrap();
        assert!(!main.direct_caller);
    }

    #[test]
    fn critical_functions_sorted_by_degree() {
        let g = diamond_graph();
        let engine = PathEngine::new(&g);
        let critical = engine.critical_functions();
        assert_eq!(critical[0].function, "main");
        assert_eq!(critical[0].out_degree, 2);
    }

    #[test]
    fn find_paths_on_missing_target_reports_not_found() {
        let g = two_hop_graph();
        let engine = PathEngine::new(&g);
        let result = engine.find_paths("nonexistent", None, 5, false);
        assert!(!result.found);
        assert!(result.paths.is_empty());
    }
}
