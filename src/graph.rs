//! Directed communication graph between network-layer endpoints.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::fs;
use std::io;
use std::path::Path;

use crate::format::short_hash;
use crate::packet::Packet;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edge {
    pub from: String,
    pub to: String,
    pub protocols: Vec<String>,
}

impl Edge {
    fn add_protocol(&mut self, protocol: String) {
        if !self.protocols.contains(&protocol) {
            self.protocols.push(protocol);
        }
    }
}

#[derive(Debug, Default)]
pub struct CommGraph {
    edges: Vec<Edge>,
    index: HashMap<(String, String), usize>,
}

impl CommGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the packet's source -> destination pair. Packets without a
    /// network layer are ignored.
    pub fn record(&mut self, packet: &Packet) {
        let Some(net) = &packet.network else {
            return;
        };
        self.add(net.source.to_string(), net.destination.to_string(), packet.protocol_label());
    }

    pub fn add(&mut self, from: String, to: String, protocol: String) {
        let key = (from, to);
        if let Some(&idx) = self.index.get(&key) {
            self.edges[idx].add_protocol(protocol);
            return;
        }

        let (from, to) = key.clone();
        self.index.insert(key, self.edges.len());
        self.edges.push(Edge {
            from,
            to,
            protocols: vec![protocol],
        });
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    /// Renders the graph in Graphviz dot syntax. `target` only appears in
    /// the compile hint at the top.
    pub fn to_dot(&self, target: &str) -> String {
        let mut dot = format!("# Compile with `neato -Tpng {0} > {0}.png`\n", target);
        dot.push_str("digraph wirebrief {\n\toverlap = false;\n");

        let mut nodes: Vec<&str> = Vec::new();
        for edge in &self.edges {
            for endpoint in [edge.from.as_str(), edge.to.as_str()] {
                if !nodes.contains(&endpoint) {
                    nodes.push(endpoint);
                }
            }
        }

        // Graphviz node names allow a small charset only, so nodes are named by hash.
        for node in nodes {
            let _ = writeln!(dot, "\tn{}[label=\"{}\"]", node_id(node), node);
        }

        for edge in &self.edges {
            let _ = writeln!(
                dot,
                "\tn{}->n{}[label=\"{}\"]",
                node_id(&edge.from),
                node_id(&edge.to),
                edge.protocols.join(", ")
            );
        }

        dot.push_str("}\n");
        dot
    }

    /// Writes the dot file if a target is configured.
    pub fn export(&self, target: Option<&Path>) -> io::Result<()> {
        let Some(path) = target else {
            return Ok(());
        };
        fs::write(path, self.to_dot(&path.display().to_string()))
    }
}

fn node_id(endpoint: &str) -> String {
    short_hash(endpoint.as_bytes())
}
