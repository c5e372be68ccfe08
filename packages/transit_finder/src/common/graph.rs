//! The routable graph which every search runs against. This wraps the
//! petgraph graph along with the turn restrictions which apply to it, and a
//! spatial index of the street edges which can be used to snap free
//! coordinates onto the network. Once built, a RoutingGraph is never
//! modified, and can be shared between concurrent searches.

use crate::common::bbox::BBox;
use crate::common::graph_data::{EdgeData, TraverseMode, VertexData};
use crate::routing::turns::{TurnRestriction, turn_permitted};
use petgraph::graph::{EdgeIndex, NodeIndex};
use petgraph::{Directed, Direction, Graph};
use rstar::{AABB, RTree, RTreeObject};
use rustc_hash::FxHashMap;

/// The petgraph graph type used throughout this package
pub type TransitGraph = Graph<VertexData, EdgeData, Directed, u32>;

/// A pedestrian street edge, as stored in the spatial index
#[derive(Debug, Clone, PartialEq)]
pub struct IndexedEdge {
    pub edge: EdgeIndex,
    envelope: AABB<[f64; 2]>,
}

impl RTreeObject for IndexedEdge {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.envelope
    }
}

#[derive(Debug)]
pub struct RoutingGraph {
    graph: TransitGraph,
    restrictions: FxHashMap<EdgeIndex, Vec<TurnRestriction>>,
    edge_index: RTree<IndexedEdge>,
}

impl RoutingGraph {
    /// Wrap a completed graph. Restrictions are grouped by the edge they
    /// start from, and every pedestrian street edge with a geometry is
    /// added to the spatial index
    pub fn new(
        graph: TransitGraph,
        restrictions: Vec<TurnRestriction>,
    ) -> Self {
        let mut restrictions_by_edge =
            FxHashMap::<EdgeIndex, Vec<TurnRestriction>>::default();
        for restriction in restrictions {
            restrictions_by_edge
                .entry(restriction.from)
                .or_default()
                .push(restriction);
        }

        let indexed: Vec<IndexedEdge> = graph
            .edge_indices()
            .filter_map(|edge| {
                let data = graph.edge_weight(edge)?;
                if !data.is_pedestrian_traversable() {
                    return None;
                }
                let bbox = BBox::from_line(&data.geometry)?;
                Some(IndexedEdge {
                    edge,
                    envelope: bbox.to_envelope(),
                })
            })
            .collect();

        RoutingGraph {
            graph,
            restrictions: restrictions_by_edge,
            edge_index: RTree::bulk_load(indexed),
        }
    }

    pub fn graph(&self) -> &TransitGraph {
        &self.graph
    }

    pub fn vertex(&self, vertex: NodeIndex) -> Option<&VertexData> {
        self.graph.node_weight(vertex)
    }

    pub fn edge(&self, edge: EdgeIndex) -> Option<&EdgeData> {
        self.graph.edge_weight(edge)
    }

    /// Fetch the source and target of an edge
    pub fn endpoints(
        &self,
        edge: EdgeIndex,
    ) -> Option<(NodeIndex, NodeIndex)> {
        self.graph.edge_endpoints(edge)
    }

    /// Edges which can be followed away from the provided vertex
    pub fn outgoing(&self, vertex: NodeIndex) -> Vec<EdgeIndex> {
        self.edges_directed(vertex, Direction::Outgoing)
    }

    /// Edges which lead into the provided vertex
    pub fn incoming(&self, vertex: NodeIndex) -> Vec<EdgeIndex> {
        self.edges_directed(vertex, Direction::Incoming)
    }

    /// Edges which a search can follow away from the provided vertex. These
    /// are the outgoing edges, or the incoming ones in arrive-by searches
    pub fn edges_away(
        &self,
        vertex: NodeIndex,
        arrive_by: bool,
    ) -> Vec<EdgeIndex> {
        if arrive_by {
            self.incoming(vertex)
        } else {
            self.outgoing(vertex)
        }
    }

    fn edges_directed(
        &self,
        vertex: NodeIndex,
        direction: Direction,
    ) -> Vec<EdgeIndex> {
        let mut edges = Vec::new();
        let mut walker =
            self.graph.neighbors_directed(vertex, direction).detach();
        while let Some((edge, _)) = walker.next(&self.graph) {
            edges.push(edge);
        }
        // petgraph walks adjacency lists newest first
        edges.reverse();
        edges
    }

    pub fn restrictions_from(&self, edge: EdgeIndex) -> &[TurnRestriction] {
        self.restrictions
            .get(&edge)
            .map(|restrictions| restrictions.as_slice())
            .unwrap_or_default()
    }

    pub fn num_restrictions(&self) -> usize {
        self.restrictions.values().map(|items| items.len()).sum()
    }

    /// Check whether a traveller arriving along `from` may continue along
    /// `to` in the provided mode, at the provided instant
    pub fn can_turn(
        &self,
        from: EdgeIndex,
        to: EdgeIndex,
        mode: TraverseMode,
        instant: i64,
    ) -> bool {
        turn_permitted(self.restrictions_from(from), to, mode, instant)
    }

    /// Fetch every pedestrian street edge whose bounding box intersects the
    /// provided bounding box. Results are in index iteration order
    pub fn edges_near(&self, bbox: &BBox) -> Vec<EdgeIndex> {
        self.edge_index
            .locate_in_envelope_intersecting(&bbox.to_envelope())
            .map(|indexed| indexed.edge)
            .collect()
    }
}
