//! Small graphs which are shared between the tests of the routing modules.
//! Every street edge is 100m long unless stated otherwise, and the test
//! configuration walks at exactly 1m/s so that times are easy to follow.

use crate::common::config::RoutingConfig;
use crate::common::graph::RoutingGraph;
use crate::common::graph_data::{
    EdgeData, TraverseModeSet, TripPattern, TripTimes, VertexData,
};
use crate::loading::petgraph::RoutingGraphBuilder;
use geo::LineString;
use petgraph::graph::{EdgeIndex, NodeIndex};
use std::sync::Arc;

/// Roughly 100m of longitude at the equator
const STEP: f64 = 0.0009;

pub fn get_test_config() -> RoutingConfig {
    RoutingConfig {
        walk_speed: 1.0,
        ..RoutingConfig::default()
    }
}

fn get_test_street(length: f64, from: (f64, f64), to: (f64, f64)) -> EdgeData {
    EdgeData::street(
        length,
        TraverseModeSet::street(),
        LineString::from(vec![from, to]),
    )
}

/// A graph with two vertices, joined by the provided edge
pub fn get_test_graph_with(data: EdgeData) -> (RoutingGraph, EdgeIndex) {
    let mut builder = RoutingGraphBuilder::new();
    let from = builder.add_vertex(VertexData::new(1, 0.0, 0.0));
    let to = builder.add_vertex(VertexData::new(2, 0.0, STEP));
    let edge = builder.add_edge(from, to, data);
    (builder.build(), edge)
}

/// `num_vertices` vertices in a row from west to east, each joined to the
/// next by a street
pub fn get_test_street_line(
    num_vertices: usize,
    length: f64,
) -> (RoutingGraph, Vec<EdgeIndex>) {
    let mut builder = RoutingGraphBuilder::new();
    let vertices: Vec<NodeIndex> = (0..num_vertices)
        .map(|inx| {
            builder.add_vertex(VertexData::new(
                inx as i64,
                0.0,
                inx as f64 * STEP,
            ))
        })
        .collect();

    let edges = vertices
        .windows(2)
        .enumerate()
        .map(|(inx, pair)| {
            let from = (inx as f64 * STEP, 0.0);
            let to = ((inx + 1) as f64 * STEP, 0.0);
            let data = get_test_street(length, from, to);
            builder.add_edge(pair[0], pair[1], data)
        })
        .collect();

    (builder.build(), edges)
}

/// A single bus route between two stops, with a walk at either end
///
/// origin -> stop_a => onboard_a -> onboard_b => stop_b -> destination
pub struct TransitFixture {
    pub graph: RoutingGraph,
    pub pattern: Arc<TripPattern>,
    pub origin: NodeIndex,
    pub stop_a: NodeIndex,
    pub onboard_a: NodeIndex,
    pub onboard_b: NodeIndex,
    pub stop_b: NodeIndex,
    pub destination: NodeIndex,
    pub access: EdgeIndex,
    pub board: EdgeIndex,
    pub hop: EdgeIndex,
    pub alight: EdgeIndex,
    pub egress: EdgeIndex,
}

/// Build the transit fixture, with one trip for each (departure, arrival)
/// pair. Trips are named after their position in `trips`
pub fn get_test_transit(trips: Vec<(i64, i64)>) -> TransitFixture {
    let trips: Vec<TripTimes> = trips
        .into_iter()
        .enumerate()
        .map(|(inx, (departure, arrival))| {
            TripTimes::new(
                &format!("trip-{inx}"),
                "route-1",
                vec![departure, arrival],
                vec![departure, arrival],
            )
            .with_headsign("Town Centre")
        })
        .collect();
    let pattern = Arc::new(TripPattern::new("pattern-1", "route-1", trips));

    let mut builder = RoutingGraphBuilder::new();
    let origin = builder.add_vertex(VertexData::new(1, 0.0, 0.0));
    let stop_a = builder.add_vertex(VertexData::new(2, 0.0, STEP));
    let stop_b = builder.add_vertex(VertexData::new(3, 0.0, 10.0 * STEP));
    let destination = builder.add_vertex(VertexData::new(4, 0.0, 11.0 * STEP));

    let access = builder.add_edge(
        origin,
        stop_a,
        get_test_street(100.0, (0.0, 0.0), (STEP, 0.0)),
    );
    let route = builder.add_pattern(Arc::clone(&pattern), &[stop_a, stop_b]);
    let egress = builder.add_edge(
        stop_b,
        destination,
        get_test_street(100.0, (10.0 * STEP, 0.0), (11.0 * STEP, 0.0))
            .with_name("Station Road"),
    );

    TransitFixture {
        graph: builder.build(),
        pattern,
        origin,
        stop_a,
        onboard_a: route.onboard[0],
        onboard_b: route.onboard[1],
        stop_b,
        destination,
        access,
        board: route.boards[0],
        hop: route.hops[0],
        alight: route.alights[1],
        egress,
    }
}

/// A start vertex joined to a middle vertex, which is joined to an end
/// vertex
///
/// start -> middle -> end
pub struct ForkFixture {
    pub graph: RoutingGraph,
    pub start: NodeIndex,
    pub first: EdgeIndex,
}

/// Build the fork fixture. When `parallel` is set, a second street joins
/// start to middle
pub fn get_test_fork(parallel: bool) -> ForkFixture {
    let mut builder = RoutingGraphBuilder::new();
    let start = builder.add_vertex(VertexData::new(1, 0.0, 0.0));
    let middle = builder.add_vertex(VertexData::new(2, 0.0, STEP));
    let end = builder.add_vertex(VertexData::new(3, 0.0, 2.0 * STEP));

    let first = builder.add_edge(
        start,
        middle,
        get_test_street(100.0, (0.0, 0.0), (STEP, 0.0)),
    );
    if parallel {
        builder.add_edge(
            start,
            middle,
            get_test_street(120.0, (0.0, 0.0), (STEP, 0.0)),
        );
    }
    builder.add_edge(
        middle,
        end,
        get_test_street(100.0, (STEP, 0.0), (2.0 * STEP, 0.0)),
    );

    ForkFixture {
        graph: builder.build(),
        start,
        first,
    }
}
