//! Expansion of a single state, as used by a best-first search. Every edge
//! leading away from the state's vertex is tried, subject to the turn
//! restrictions of the graph, and any children which can never lead to an
//! acceptable path are dropped.

use crate::common::graph::RoutingGraph;
use crate::routing::state::{State, StateError};
use std::sync::Arc;

/// Generate every child of the provided state. In arrive-by searches the
/// edges leading into the state's vertex are used instead
pub fn expand(
    graph: &RoutingGraph,
    state: &Arc<State>,
) -> Result<Vec<Arc<State>>, StateError> {
    let config = state.config();
    let mut children = Vec::new();

    for edge in graph.edges_away(state.vertex(), config.arrive_by) {
        if let Some(back_edge) = state.back_edge() {
            // Turns are always checked in the direction of travel
            let (from, to) = if config.arrive_by {
                (edge, back_edge)
            } else {
                (back_edge, edge)
            };
            let mode = state.non_transit_mode();
            if !graph.can_turn(from, to, mode, state.time()) {
                continue;
            }
        }

        for child in graph.traverse(edge, state)? {
            if !child.parsers_live()
                || child.exceeds_weight_limit(config.max_weight)
            {
                continue;
            }
            children.push(Arc::new(child));
        }
    }

    Ok(children)
}

#[cfg(test)]
mod tests {

    use super::*;
    use crate::common::config::RoutingConfig;
    use crate::common::graph_data::{
        EdgeData, TraverseMode, TraverseModeSet, VertexData,
    };
    use crate::loading::petgraph::RoutingGraphBuilder;
    use crate::routing::parser::{PathParser, TableParser};
    use crate::routing::test_support::{get_test_config, get_test_transit};
    use crate::routing::turns::{TurnRestriction, TurnRestrictionKind};
    use geo::LineString;
    use petgraph::graph::{EdgeIndex, NodeIndex};
    use proptest::prelude::*;

    /// A crossroads, with a restriction banning cars from turning from the
    /// western arm into the northern one
    fn get_test_crossroads(
        arrive_by: bool,
    ) -> (RoutingGraph, Arc<State>, EdgeIndex, EdgeIndex) {
        let mut builder = RoutingGraphBuilder::new();
        let west = builder.add_vertex(VertexData::new(1, 0.0, -0.001));
        let centre = builder.add_vertex(VertexData::new(2, 0.0, 0.0));
        let north = builder.add_vertex(VertexData::new(3, 0.001, 0.0));
        let east = builder.add_vertex(VertexData::new(4, 0.0, 0.001));

        let street = TraverseModeSet::street();
        let into_centre = builder.add_street(west, centre, street, None);
        let to_north = builder.add_street(centre, north, street, None);
        builder.add_street(centre, east, street, None);
        builder.add_turn_restriction(TurnRestriction::new(
            into_centre,
            to_north,
            TurnRestrictionKind::NoTurn,
            TraverseModeSet::empty().with(TraverseMode::Car),
        ));
        let graph = builder.build();

        let config = RoutingConfig {
            modes: TraverseModeSet::from_list("car"),
            arrive_by,
            ..get_test_config()
        };
        let (start, first) = if arrive_by {
            (north, to_north)
        } else {
            (west, into_centre)
        };
        let root = Arc::new(State::initial(start, 0, Arc::new(config)));
        let state = match graph.traverse(first, &root) {
            Ok(mut results) if !results.is_empty() => {
                Arc::new(results.remove(0))
            }
            _ => panic!("Could not reach the centre"),
        };

        (graph, state, into_centre, to_north)
    }

    mod test_turns {

        use super::*;

        #[test]
        fn test_restricted_turn() {
            // Arrange
            let (graph, state, _, to_north) = get_test_crossroads(false);

            // Act
            let children = match expand(&graph, &state) {
                Ok(children) => children,
                Err(err) => panic!("Got an unexpected error: {err}"),
            };

            // Assert
            let edges: Vec<Option<EdgeIndex>> =
                children.iter().map(|child| child.back_edge()).collect();
            assert_eq!(children.len(), 1);
            assert!(!edges.contains(&Some(to_north)));
        }

        /// Arrive-by searches check the same turn, walking it backwards
        #[test]
        fn test_restricted_turn_arrive_by() {
            let (graph, state, into_centre, _) = get_test_crossroads(true);

            let children = match expand(&graph, &state) {
                Ok(children) => children,
                Err(err) => panic!("Got an unexpected error: {err}"),
            };

            let edges: Vec<Option<EdgeIndex>> =
                children.iter().map(|child| child.back_edge()).collect();
            assert!(!edges.contains(&Some(into_centre)));
        }
    }

    /// Children over the weight limit, or rejected by a parser, are dropped
    #[test]
    fn test_pruning() {
        // Arrange
        let fixture = get_test_transit(vec![(200, 300)]);
        let parser: Arc<dyn PathParser> =
            Arc::new(TableParser::max_boardings(0));
        let no_boarding = RoutingConfig {
            path_parsers: vec![parser],
            ..get_test_config()
        };
        let light = RoutingConfig {
            max_weight: 100.0,
            ..get_test_config()
        };

        // Act
        let mut results = Vec::new();
        for config in [no_boarding, light, get_test_config()] {
            let config = Arc::new(config);
            let root = Arc::new(State::initial(fixture.stop_a, 100, config));
            match expand(&fixture.graph, &root) {
                Ok(children) => results.push(children.len()),
                Err(err) => panic!("Got an unexpected error: {err}"),
            }
        }

        // Assert
        assert_eq!(results, vec![0, 0, 1]);
    }

    // Property tests ---------------------------------------------------------

    /// Build a graph with `num_vertices` vertices on a small grid, joined by
    /// the provided (from, to, length, walkable) streets
    fn get_random_graph(
        num_vertices: usize,
        streets: &[(usize, usize, f64, bool)],
    ) -> RoutingGraph {
        let mut builder = RoutingGraphBuilder::new();
        let vertices: Vec<NodeIndex> = (0..num_vertices)
            .map(|inx| {
                let (row, col) = ((inx / 4) as f64, (inx % 4) as f64);
                builder.add_vertex(VertexData::new(
                    inx as i64,
                    row * 0.001,
                    col * 0.001,
                ))
            })
            .collect();

        for (from, to, length, walkable) in streets {
            let permission = if *walkable {
                TraverseModeSet::street()
            } else {
                TraverseModeSet::empty().with(TraverseMode::Car)
            };
            let (from, to) = (vertices[*from], vertices[*to]);
            builder.add_edge(
                from,
                to,
                EdgeData::street(*length, permission, LineString::new(vec![])),
            );
        }
        builder.build()
    }

    proptest! {
        /// Weight never decreases along any chain, whichever direction the
        /// search runs in
        #[test]
        fn test_weight_monotonic(
            streets in prop::collection::vec(
                (0usize..8, 0usize..8, 0.0f64..500.0, any::<bool>()),
                1..24,
            ),
            arrive_by in any::<bool>(),
            start in 0usize..8,
        ) {
            let graph = get_random_graph(8, &streets);
            let config = RoutingConfig {
                arrive_by,
                ..get_test_config()
            };
            let root = Arc::new(State::initial(
                NodeIndex::new(start),
                10_000,
                Arc::new(config),
            ));

            let mut frontier = vec![root];
            for _ in 0..4 {
                let mut next = Vec::new();
                for state in frontier.iter() {
                    let children = expand(&graph, state);
                    prop_assert!(children.is_ok());
                    for child in children.unwrap_or_default() {
                        prop_assert!(child.weight() >= state.weight());
                        prop_assert!(child.check_negative_weight().is_ok());
                        prop_assert_eq!(
                            child.abs_time_delta() as f64,
                            child.weight_delta() / 2.0
                        );
                        next.push(child);
                    }
                }
                frontier = next;
                frontier.truncate(64);
            }
        }
    }
}
