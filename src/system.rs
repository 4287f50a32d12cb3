use crate::error::Error;
use crate::geo::{self, Coordinates};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// The generation technologies a node may host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum GenerationType {
    Coal,
    NaturalGas,
    Nuclear,
    Hydro,
    Wind,
    Solar,
}

impl GenerationType {
    pub const ALL: [GenerationType; 6] = [
        GenerationType::Coal,
        GenerationType::NaturalGas,
        GenerationType::Nuclear,
        GenerationType::Hydro,
        GenerationType::Wind,
        GenerationType::Solar,
    ];

    /// Position of the type in [`GenerationType::ALL`]
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            GenerationType::Coal => "Coal",
            GenerationType::NaturalGas => "Natural Gas",
            GenerationType::Nuclear => "Nuclear",
            GenerationType::Hydro => "Hydro",
            GenerationType::Wind => "Wind",
            GenerationType::Solar => "Solar",
        }
    }

    /// Fossil sources are the only ones priced in the dispatch objective
    pub fn is_fossil(self) -> bool {
        matches!(self, GenerationType::Coal | GenerationType::NaturalGas)
    }
}

impl fmt::Display for GenerationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for GenerationType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        GenerationType::ALL
            .iter()
            .copied()
            .find(|kind| kind.name() == s.trim())
            .ok_or_else(|| {
                Error::configuration(format!("unknown generation type '{s}'"))
            })
    }
}

#[derive(Debug, Clone)]
pub struct Node {
    pub id: usize,
    pub kind: Option<GenerationType>,
    pub limit: f64,
    pub coordinates: Coordinates,
    pub source_link_ids: Vec<usize>,
    pub target_link_ids: Vec<usize>,
}

impl Node {
    pub fn new(
        id: usize,
        kind: Option<GenerationType>,
        limit: f64,
        coordinates: Coordinates,
    ) -> Self {
        Self {
            id,
            kind,
            limit,
            coordinates,
            source_link_ids: vec![],
            target_link_ids: vec![],
        }
    }

    /// Returns the technology when the node can inject power
    pub fn generation_type(&self) -> Option<GenerationType> {
        match self.kind {
            Some(kind) if self.limit > 0.0 => Some(kind),
            _ => None,
        }
    }

    pub fn add_source_link(&mut self, link_id: usize) {
        self.source_link_ids.push(link_id);
    }

    pub fn add_target_link(&mut self, link_id: usize) {
        self.target_link_ids.push(link_id);
    }
}

/// A transmission record as it appears in the input, before duplicate
/// node pairs are merged
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawLink {
    pub node1: usize,
    pub node2: usize,
    pub limit: f64,
}

/// An aggregated transmission corridor between two nodes. `source` and
/// `target` are node positions in [`Network::nodes`], kept in the
/// orientation of the first record seen for the pair.
#[derive(Debug, Clone)]
pub struct Link {
    pub id: usize,
    pub source: usize,
    pub target: usize,
    pub capacity: f64,
    pub distance: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetworkMetadata {
    pub nodes_count: usize,
    pub links_count: usize,
    pub generators_count: usize,
}

/// Read-only topology shared by every dispatch solve
#[derive(Debug, Clone)]
pub struct Network {
    nodes: Vec<Node>,
    links: Vec<Link>,
    index_by_id: HashMap<usize, usize>,
    pub meta: NetworkMetadata,
}

impl Network {
    pub fn new(mut nodes: Vec<Node>, raw_links: &[RawLink]) -> Result<Self, Error> {
        let mut index_by_id = HashMap::with_capacity(nodes.len());
        for (index, node) in nodes.iter().enumerate() {
            if index_by_id.insert(node.id, index).is_some() {
                return Err(Error::configuration(format!(
                    "node {} is declared more than once",
                    node.id
                )));
            }
            if node.limit.is_nan() || node.limit < 0.0 {
                return Err(Error::configuration(format!(
                    "node {} has invalid generation limit {}",
                    node.id, node.limit
                )));
            }
            if node.kind.is_none() && node.limit > 0.0 {
                return Err(Error::configuration(format!(
                    "node {} has a generation limit but no generation type",
                    node.id
                )));
            }
        }

        // merges duplicated records of the same unordered pair
        let mut links: Vec<Link> = vec![];
        let mut link_by_pair: HashMap<(usize, usize), usize> = HashMap::new();
        for raw in raw_links.iter() {
            let source = lookup(&index_by_id, raw.node1, raw)?;
            let target = lookup(&index_by_id, raw.node2, raw)?;
            if raw.limit.is_nan() || raw.limit < 0.0 {
                return Err(Error::configuration(format!(
                    "link {} - {} has invalid capacity {}",
                    raw.node1, raw.node2, raw.limit
                )));
            }
            let pair = (raw.node1.min(raw.node2), raw.node1.max(raw.node2));
            match link_by_pair.get(&pair) {
                Some(&id) => links[id].capacity += raw.limit,
                None => {
                    let id = links.len();
                    let distance = geo::haversine_distance(
                        nodes[source].coordinates,
                        nodes[target].coordinates,
                    );
                    links.push(Link {
                        id,
                        source,
                        target,
                        capacity: raw.limit,
                        distance,
                    });
                    link_by_pair.insert(pair, id);
                }
            }
        }

        for l in links.iter() {
            nodes[l.source].add_source_link(l.id);
            nodes[l.target].add_target_link(l.id);
        }

        let meta = NetworkMetadata {
            nodes_count: nodes.len(),
            links_count: links.len(),
            generators_count: nodes
                .iter()
                .filter(|n| n.generation_type().is_some())
                .count(),
        };

        Ok(Self {
            nodes,
            links,
            index_by_id,
            meta,
        })
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn links(&self) -> &[Link] {
        &self.links
    }

    /// Position of the node with identifier `id`
    pub fn index_of(&self, id: usize) -> Option<usize> {
        self.index_by_id.get(&id).copied()
    }

    pub fn node(&self, id: usize) -> Option<&Node> {
        self.index_of(id).map(|index| &self.nodes[index])
    }

    /// Iterates over the nodes that can inject power, with their position
    pub fn generators(
        &self,
    ) -> impl Iterator<Item = (usize, &Node, GenerationType)> + '_ {
        self.nodes.iter().enumerate().filter_map(|(index, node)| {
            node.generation_type().map(|kind| (index, node, kind))
        })
    }
}

fn lookup(
    index_by_id: &HashMap<usize, usize>,
    id: usize,
    raw: &RawLink,
) -> Result<usize, Error> {
    index_by_id.get(&id).copied().ok_or_else(|| {
        Error::configuration(format!(
            "link {} - {} references unknown node {}",
            raw.node1, raw.node2, id
        ))
    })
}
