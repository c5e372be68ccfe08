//! Generates the petgraph graph which is used for routing. Street data is
//! collected from a decoded OSM file by StreetGraphBuilder, which hands back a
//! RoutingGraphBuilder so that transit patterns can be added on top before
//! the final graph is built.

use crate::common::graph::{RoutingGraph, TransitGraph};
use crate::common::graph_data::{
    BoardAlightEdge, EdgeData, EdgeKind, HopEdge, InterlineDwellEdge,
    TraverseMode, TraverseModeSet, TripPattern, TripTimes, VertexData,
    VertexKind,
};
use crate::loading::structs::{
    MapHandler, MapNode, MapRelation, MapWay, MemberKind,
};
use crate::routing::turns::{
    RepeatingTimePeriod, TurnRestriction, TurnRestrictionKind,
};
use geo::{Coord, Distance, Haversine, LineString};
use log::{debug, warn};
use petgraph::graph::{EdgeIndex, NodeIndex};
use rustc_hash::{FxHashMap, FxHashSet};
use std::sync::Arc;

// Routing graph --------------------------------------------------------------

/// The edges and vertices created for a single trip pattern, indexed by the
/// position of the stop in the pattern
#[derive(Debug, Clone, PartialEq)]
pub struct PatternEdges {
    pub onboard: Vec<NodeIndex>,
    pub boards: Vec<EdgeIndex>,
    pub alights: Vec<EdgeIndex>,
    pub hops: Vec<EdgeIndex>,
}

/// Accumulates vertices, edges and turn restrictions until the graph is
/// complete. Nothing can be added once `build` has been called
#[derive(Debug, Default)]
pub struct RoutingGraphBuilder {
    graph: TransitGraph,
    restrictions: Vec<TurnRestriction>,
    last_synthetic_id: i64,
}

impl RoutingGraphBuilder {
    pub fn new() -> Self {
        RoutingGraphBuilder::default()
    }

    pub fn num_vertices(&self) -> usize {
        self.graph.node_count()
    }

    pub fn num_edges(&self) -> usize {
        self.graph.edge_count()
    }

    /// Vertices which don't come from OSM are given negative ids
    fn next_synthetic_id(&mut self) -> i64 {
        self.last_synthetic_id -= 1;
        self.last_synthetic_id
    }

    pub fn add_vertex(&mut self, data: VertexData) -> NodeIndex {
        self.graph.add_node(data)
    }

    pub fn add_edge(
        &mut self,
        from: NodeIndex,
        to: NodeIndex,
        data: EdgeData,
    ) -> EdgeIndex {
        self.graph.add_edge(from, to, data)
    }

    /// A straight line between two vertices, in [lon, lat] order
    fn straight_line(&self, from: NodeIndex, to: NodeIndex) -> LineString {
        [from, to]
            .iter()
            .filter_map(|vertex| self.graph.node_weight(*vertex))
            .map(|data| Coord {
                x: data.lon,
                y: data.lat,
            })
            .collect()
    }

    /// Add a street which runs in a straight line between two vertices. Its
    /// length is the distance between them
    pub fn add_street(
        &mut self,
        from: NodeIndex,
        to: NodeIndex,
        permission: TraverseModeSet,
        name: Option<&str>,
    ) -> EdgeIndex {
        let geometry = self.straight_line(from, to);
        let length = geometry
            .lines()
            .map(|line| {
                Haversine::distance(line.start_point(), line.end_point())
            })
            .sum();

        let mut data = EdgeData::street(length, permission, geometry);
        if let Some(name) = name {
            data = data.with_name(name);
        }
        self.add_edge(from, to, data)
    }

    /// Wire a trip pattern into the graph. Each stop gets an onboard vertex,
    /// with board and alight edges linking the two. Hops join each onboard
    /// vertex to the next
    pub fn add_pattern(
        &mut self,
        pattern: Arc<TripPattern>,
        stops: &[NodeIndex],
    ) -> PatternEdges {
        if pattern.num_stops() != stops.len() {
            warn!(
                "Pattern {} serves {} stops, but {} were provided",
                pattern.id,
                pattern.num_stops(),
                stops.len()
            );
        }

        let mut edges = PatternEdges {
            onboard: Vec::with_capacity(stops.len()),
            boards: Vec::with_capacity(stops.len()),
            alights: Vec::with_capacity(stops.len()),
            hops: Vec::with_capacity(stops.len().saturating_sub(1)),
        };

        for (stop_index, stop) in stops.iter().enumerate() {
            let Some(stop_data) = self.graph.node_weight_mut(*stop) else {
                warn!("Stop {} is not in the graph", stop.index());
                continue;
            };
            stop_data.kind = VertexKind::TransitStop;
            let (lat, lon) = (stop_data.lat, stop_data.lon);

            let id = self.next_synthetic_id();
            let onboard = self.add_vertex(VertexData {
                id,
                lat,
                lon,
                kind: VertexKind::Onboard,
            });

            let board_alight = |boarding: bool| {
                EdgeData::new(
                    EdgeKind::BoardAlight(BoardAlightEdge {
                        pattern: Arc::clone(&pattern),
                        stop_index,
                        boarding,
                    }),
                    LineString::new(vec![]),
                )
            };
            let board = self.add_edge(*stop, onboard, board_alight(true));
            let alight = self.add_edge(onboard, *stop, board_alight(false));

            edges.onboard.push(onboard);
            edges.boards.push(board);
            edges.alights.push(alight);
        }

        for (stop_index, pair) in edges.onboard.windows(2).enumerate() {
            let geometry = self.straight_line(pair[0], pair[1]);
            let hop = EdgeData::new(
                EdgeKind::Hop(HopEdge {
                    pattern: Arc::clone(&pattern),
                    stop_index,
                }),
                geometry,
            );
            let hop = self.graph.add_edge(pair[0], pair[1], hop);
            edges.hops.push(hop);
        }

        edges
    }

    /// Allow travellers to stay on board where a vehicle finishes one trip
    /// and continues as another. `from` and `to` are onboard vertices
    pub fn add_interline(
        &mut self,
        from: NodeIndex,
        to: NodeIndex,
        from_trip: Arc<TripTimes>,
        to_trip: Arc<TripTimes>,
    ) -> EdgeIndex {
        let geometry = self.straight_line(from, to);
        let data = EdgeData::new(
            EdgeKind::InterlineDwell(InterlineDwellEdge { from_trip, to_trip }),
            geometry,
        );
        self.add_edge(from, to, data)
    }

    pub fn add_turn_restriction(&mut self, restriction: TurnRestriction) {
        self.restrictions.push(restriction);
    }

    pub fn build(self) -> RoutingGraph {
        debug!(
            "Building routing graph with {} vertices, {} edges and {} turn \
             restrictions",
            self.graph.node_count(),
            self.graph.edge_count(),
            self.restrictions.len()
        );
        RoutingGraph::new(self.graph, self.restrictions)
    }
}

// Street graph ---------------------------------------------------------------

/// One directed street edge created from a way, along with the OSM ids of
/// the nodes at either end
#[derive(Debug, Clone, Copy)]
struct WaySegment {
    edge: EdgeIndex,
    from: i64,
    to: i64,
}

/// Collects the streets from a decoded OSM file. Only ways with a highway
/// tag are kept, along with the nodes they use and any turn restrictions
#[derive(Debug, Default)]
pub struct StreetGraphBuilder {
    coords: FxHashMap<i64, (f64, f64)>,
    ways: Vec<MapWay>,
    relations: Vec<MapRelation>,
}

impl MapHandler for StreetGraphBuilder {
    fn add_node(&mut self, node: MapNode) {
        self.coords.insert(node.id, (node.lat, node.lon));
    }

    fn add_way(&mut self, way: MapWay) {
        if way.tag("highway").is_some() {
            self.ways.push(way);
        }
    }

    fn add_relation(&mut self, relation: MapRelation) {
        if relation.tag("type") == Some("restriction") {
            self.relations.push(relation);
        }
    }
}

/// Determine which modes may use a way in its own direction, and against
/// it. Ways which nobody can use are skipped entirely
fn get_way_permissions(
    way: &MapWay,
) -> Option<(TraverseModeSet, TraverseModeSet)> {
    let walk = TraverseModeSet::empty().with(TraverseMode::Walk);
    let mut permission = match way.tag("highway")? {
        "motorway" | "motorway_link" | "trunk" | "trunk_link" => {
            TraverseModeSet::empty().with(TraverseMode::Car)
        }
        "footway" | "pedestrian" | "steps" | "corridor" => walk,
        "path" | "bridleway" | "cycleway" => walk.with(TraverseMode::Bicycle),
        "construction" | "proposed" | "abandoned" | "platform"
        | "raceway" => return None,
        _ => TraverseModeSet::street(),
    };

    if matches!(way.tag("access"), Some("no") | Some("private")) {
        return None;
    }
    for (key, mode) in
        [("foot", TraverseMode::Walk), ("bicycle", TraverseMode::Bicycle)]
    {
        match way.tag(key) {
            Some("no") => permission = permission.without(mode),
            Some("yes") | Some("designated") => {
                permission = permission.with(mode)
            }
            _ => (),
        }
    }

    // Pedestrians can always walk against the flow of traffic
    let mut against = permission
        .without(TraverseMode::Car)
        .without(TraverseMode::Bicycle);
    if way.tag("oneway:bicycle") == Some("no") {
        against = against.with(TraverseMode::Bicycle);
    }
    let roundabout = way.tag("junction") == Some("roundabout");
    let (forward, backward) = match way.tag("oneway") {
        Some("yes") | Some("true") | Some("1") => (permission, against),
        Some("-1") | Some("reverse") => (against, permission),
        _ if roundabout => (permission, against),
        _ => (permission, permission),
    };

    if forward.is_empty() && backward.is_empty() {
        return None;
    }
    Some((forward, backward))
}

/// Parse a time of day such as "07:30" into seconds since midnight
fn parse_clock_time(value: &str) -> Option<i64> {
    let (hours, minutes) = value.trim().split_once(':')?;
    let hours: i64 = hours.parse().ok()?;
    let minutes: i64 = minutes.parse().ok()?;
    if !(0..=24).contains(&hours) || !(0..60).contains(&minutes) {
        return None;
    }
    Some(hours * 3600 + minutes * 60)
}

/// Convert a restriction relation into a turn restriction between two
/// street edges. The from edge is the one which leads into the via node, and
/// the to edge is the one which leads away from it
fn get_turn_restriction(
    relation: &MapRelation,
    way_edges: &FxHashMap<i64, Vec<WaySegment>>,
) -> Option<TurnRestriction> {
    let value = relation.tag("restriction")?;
    let kind = if value.starts_with("no_") {
        TurnRestrictionKind::NoTurn
    } else if value.starts_with("only_") {
        TurnRestrictionKind::OnlyTurn
    } else {
        return None;
    };

    let from = relation.member("from", MemberKind::Way)?;
    let via = relation.member("via", MemberKind::Node)?;
    let to = relation.member("to", MemberKind::Way)?;

    let from_edge = way_edges
        .get(&from.reference)?
        .iter()
        .find(|segment| segment.to == via.reference)?
        .edge;
    let to_edge = way_edges
        .get(&to.reference)?
        .iter()
        .find(|segment| segment.from == via.reference)?
        .edge;

    let mut modes = TraverseModeSet::empty()
        .with(TraverseMode::Car)
        .with(TraverseMode::Bicycle);
    if let Some(except) = relation.tag("except") {
        for item in except.split(';').map(str::trim) {
            match item {
                "bicycle" => modes = modes.without(TraverseMode::Bicycle),
                "motorcar" => modes = modes.without(TraverseMode::Car),
                _ => (),
            }
        }
    }

    let mut restriction = TurnRestriction::new(from_edge, to_edge, kind, modes);
    if let (Some(on), Some(off)) =
        (relation.tag("hour_on"), relation.tag("hour_off"))
    {
        let window = parse_clock_time(on)
            .zip(parse_clock_time(off))
            .and_then(|(start, end)| RepeatingTimePeriod::daily(start, end));
        match window {
            Some(window) => restriction = restriction.with_time(window),
            None => warn!(
                "Restriction {} has an invalid time window ({on} to {off}), \
                 applying it at all times",
                relation.id
            ),
        }
    }

    Some(restriction)
}

impl StreetGraphBuilder {
    pub fn new() -> Self {
        StreetGraphBuilder::default()
    }

    pub fn num_ways(&self) -> usize {
        self.ways.len()
    }

    /// Nodes in the graph need to have associated lat/lon data, so only
    /// nodes which are used by one of the ways and which have been seen in
    /// the source file are added
    fn add_vertices(
        &self,
        builder: &mut RoutingGraphBuilder,
    ) -> FxHashMap<i64, NodeIndex> {
        let mut used_nodes = FxHashSet::<i64>::default();
        let mut vertex_map = FxHashMap::<i64, NodeIndex>::default();

        for way in self.ways.iter() {
            for id in way.refs.iter() {
                if !used_nodes.insert(*id) {
                    continue;
                }
                match self.coords.get(id) {
                    Some((lat, lon)) => {
                        let data = VertexData::new(*id, *lat, *lon);
                        let vertex = builder.add_vertex(data);
                        vertex_map.insert(*id, vertex);
                    }
                    None => debug!("Way {} uses missing node {id}", way.id),
                }
            }
        }

        vertex_map
    }

    /// Turn the collected ways into street edges, and resolve any turn
    /// restrictions between them
    pub fn build(self) -> RoutingGraphBuilder {
        let mut builder = RoutingGraphBuilder::new();
        let vertex_map = self.add_vertices(&mut builder);

        let mut way_edges = FxHashMap::<i64, Vec<WaySegment>>::default();
        for way in self.ways.iter() {
            let Some((forward, backward)) = get_way_permissions(way) else {
                continue;
            };
            let name = way.tag("name");
            let segments = way_edges.entry(way.id).or_default();

            for pair in way.refs.windows(2) {
                let (Some(src), Some(dst)) =
                    (vertex_map.get(&pair[0]), vertex_map.get(&pair[1]))
                else {
                    continue;
                };
                if !forward.is_empty() {
                    let edge = builder.add_street(*src, *dst, forward, name);
                    segments.push(WaySegment {
                        edge,
                        from: pair[0],
                        to: pair[1],
                    });
                }
                if !backward.is_empty() {
                    let edge = builder.add_street(*dst, *src, backward, name);
                    segments.push(WaySegment {
                        edge,
                        from: pair[1],
                        to: pair[0],
                    });
                }
            }
        }

        for relation in self.relations.iter() {
            match get_turn_restriction(relation, &way_edges) {
                Some(restriction) => builder.add_turn_restriction(restriction),
                None => debug!("Skipping restriction {}", relation.id),
            }
        }

        builder
    }
}
