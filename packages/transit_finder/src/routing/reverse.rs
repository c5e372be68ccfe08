//! Reversal of completed paths. A path found by a depart-at search has all of
//! its slack pushed to the start, waiting at the first stop for a vehicle
//! which could have been caught by leaving later. Walking the path again in
//! the opposite direction lets every time-dependent edge pick the best
//! option for the new direction, which moves that wait out of the
//! itinerary.

use crate::common::graph::RoutingGraph;
use crate::common::graph_data::EdgeKind;
use crate::routing::state::data::StateData;
use crate::routing::state::{State, StateError};
use log::warn;
use petgraph::graph::EdgeIndex;
use rayon::prelude::*;
use std::sync::Arc;
use thiserror::Error;

/// Something unexpected which was spotted after optimizing a path. None of
/// these invalidate the optimized path, and some are legitimate outcomes for
/// itineraries with several transfers on lines with mismatched headways
#[derive(Error, Debug, Clone, PartialEq)]
pub enum OptimizationWarning {
    #[error(
        "optimization did not decrease weight: before {before} after {after}"
    )]
    WeightNotDecreased { before: f64, after: f64 },
    #[error(
        "optimization changed elapsed time: before {before}s after {after}s"
    )]
    ElapsedTimeChanged { before: i64, after: i64 },
    #[error(
        "optimization did not decrease active time: before {before}s after \
         {after}s, boardings: {boardings}"
    )]
    ActiveTimeNotDecreased {
        before: i64,
        after: i64,
        boardings: u32,
    },
    #[error(
        "weight reduced enough to run backwards: now {weight}, previous \
         state {parent}, boardings: {boardings}"
    )]
    WeightBelowParent {
        weight: f64,
        parent: f64,
        boardings: u32,
    },
    #[error("end times do not match: before {before} after {after}")]
    EndTimeMismatch { before: i64, after: i64 },
    #[error(
        "weight changed (before {before}, after {after}) with initial wait \
         constant at {initial_wait}s"
    )]
    WeightChangedWithConstantWait {
        before: f64,
        after: f64,
        initial_wait: i64,
    },
    #[error(
        "initial wait not propagated: is {actual}s, should be {expected}s"
    )]
    InitialWaitNotPropagated { expected: i64, actual: i64 },
}

/// Compare an original path with its optimized counterpart
pub fn check_optimization(
    original: &State,
    optimized: &State,
    new_initial_wait: i64,
) -> Vec<OptimizationWarning> {
    let mut warnings = Vec::new();

    if original.weight() <= optimized.weight() {
        warnings.push(OptimizationWarning::WeightNotDecreased {
            before: original.weight(),
            after: optimized.weight(),
        });
    }
    if original.elapsed_time() != optimized.elapsed_time() {
        warnings.push(OptimizationWarning::ElapsedTimeChanged {
            before: original.elapsed_time(),
            after: optimized.elapsed_time(),
        });
    }
    if original.active_time() <= optimized.active_time() {
        warnings.push(OptimizationWarning::ActiveTimeNotDecreased {
            before: original.active_time(),
            after: optimized.active_time(),
            boardings: original.num_boardings(),
        });
    }
    if let Some(parent) = original.back_state() {
        if optimized.weight() < parent.weight() {
            warnings.push(OptimizationWarning::WeightBelowParent {
                weight: optimized.weight(),
                parent: parent.weight(),
                boardings: original.num_boardings(),
            });
        }
    }
    if original.time() != optimized.time() {
        warnings.push(OptimizationWarning::EndTimeMismatch {
            before: original.time(),
            after: optimized.time(),
        });
    }
    if (original.weight() - optimized.weight()).abs() > 1.0
        && new_initial_wait == original.initial_wait_time()
    {
        warnings.push(OptimizationWarning::WeightChangedWithConstantWait {
            before: original.weight(),
            after: optimized.weight(),
            initial_wait: new_initial_wait,
        });
    }
    if new_initial_wait != optimized.initial_wait_time() {
        warnings.push(OptimizationWarning::InitialWaitNotPropagated {
            expected: new_initial_wait,
            actual: optimized.initial_wait_time(),
        });
    }

    warnings
}

impl State {
    /// Re-traverse the path ending at this state in the opposite direction,
    /// so that transit edges pick the best trip for the new direction
    pub fn optimize(
        self: &Arc<Self>,
        graph: &RoutingGraph,
    ) -> Result<Arc<State>, StateError> {
        self.optimize_or_reverse(graph, true, false)
    }

    /// Replay the path ending at this state in the opposite direction. Every
    /// step keeps the time, weight and distance of the original
    pub fn reverse(
        self: &Arc<Self>,
        graph: &RoutingGraph,
    ) -> Result<Arc<State>, StateError> {
        self.optimize_or_reverse(graph, false, false)
    }

    /// Walk the path ending at this state back to its root, building a new
    /// path in the opposite direction.
    ///
    /// With `optimize` set every edge is traversed again, otherwise the
    /// original steps are replayed. With `forward` set the optimized path is
    /// reversed once more, so that the result runs in the original direction
    /// and can be handed back to the search which found it. If an edge can't
    /// be traversed again the optimization is abandoned and the original (or
    /// its plain reversal) is returned instead.
    pub fn optimize_or_reverse(
        self: &Arc<Self>,
        graph: &RoutingGraph,
        optimize: bool,
        forward: bool,
    ) -> Result<Arc<State>, StateError> {
        let arrive_by = self.config().arrive_by;
        let mut new_initial_wait = self.initial_wait_time();
        let mut ret = Arc::new(self.reversed_clone());
        let mut orig = self;

        while let (Some(parent), Some(edge)) =
            (orig.back_state(), orig.back_edge())
        {
            let child = if optimize {
                let boards_vehicle = match graph.edge(edge).map(|e| &e.kind) {
                    Some(EdgeKind::BoardAlight(board)) => {
                        board.boarding != arrive_by
                    }
                    _ => false,
                };

                // The first boarding of the itinerary keeps its wait, which
                // becomes the new initial wait
                let mut results = if !reversed_turn_permitted(graph, &ret, edge)
                {
                    Vec::new()
                } else if forward
                    && orig.num_boardings() == 1
                    && boards_vehicle
                {
                    let results = graph.traverse_board_alight_with_arrival(
                        edge,
                        &ret,
                        parent.time(),
                    )?;
                    if let Some(first) = results.first() {
                        new_initial_wait = first.initial_wait_time();
                    }
                    results
                } else {
                    graph.traverse(edge, &ret)?
                };

                // Keep the mode used on the original path
                let chosen = orig
                    .back_mode()
                    .and_then(|mode| {
                        results
                            .iter()
                            .position(|result| result.back_mode() == Some(mode))
                    })
                    .unwrap_or(0);
                (chosen < results.len()).then(|| results.swap_remove(chosen))
            } else {
                Some(self.replay_step(graph, &ret, orig, parent, edge)?)
            };

            let Some(child) = child else {
                warn!(
                    "Cannot reverse path at edge {}, returning the unoptimized \
                     path. This is expected for interline dwells, time \
                     dependent turn restrictions and kiss and ride paths \
                     without a transit leg",
                    edge.index()
                );
                return if forward {
                    Ok(Arc::clone(self))
                } else {
                    self.optimize_or_reverse(graph, false, false)
                };
            };

            ret = Arc::new(child);
            orig = parent;
        }

        if !forward {
            return Ok(ret);
        }

        let reversed = ret.reverse(graph)?;
        for warning in check_optimization(self, &reversed, new_initial_wait) {
            warn!("{warning}");
        }
        Ok(Arc::new(self.reseed(&reversed)))
    }

    /// Copy a single step of the original path onto the reversed one
    fn replay_step(
        &self,
        graph: &RoutingGraph,
        ret: &Arc<State>,
        orig: &State,
        parent: &State,
        edge: EdgeIndex,
    ) -> Result<State, StateError> {
        let mut builder = ret.edit(graph, edge);
        builder.set_from_state(orig);

        builder.increment_time(orig.abs_time_delta());
        builder.increment_weight(orig.weight_delta());
        builder.increment_walk_distance(orig.walk_distance_delta());
        builder.increment_pre_transit_time(orig.pre_transit_time_delta());

        if let Some(mode) = orig.back_mode() {
            builder.set_back_mode(mode);
        }
        builder.add_alerts(orig.back_alerts());

        if orig.is_bike_renting() != parent.is_bike_renting() {
            builder.set_bike_renting(!orig.is_bike_renting());
        }
        if orig.is_car_parked() != parent.is_car_parked() {
            builder.set_car_parked(!orig.is_car_parked());
        }

        builder.set_num_boardings(
            self.num_boardings().saturating_sub(orig.num_boardings()),
        );
        builder.build()
    }

    /// The doubly reversed path loses most of its StateData along the way,
    /// take it from this state instead while keeping the new initial wait.
    /// Parser states are copied so the path is still accepted
    fn reseed(&self, reversed: &State) -> State {
        let mut data: StateData = (*self.data).clone();
        data.initial_wait_time = reversed.initial_wait_time();
        data.last_next_arrival_delta = -1;

        State {
            time: reversed.time,
            weight: reversed.weight,
            vertex: reversed.vertex,
            back_state: reversed.back_state.clone(),
            back_edge: reversed.back_edge,
            data: Arc::new(data),
            walk_distance: reversed.walk_distance,
            pre_transit_time: reversed.pre_transit_time,
            parser_states: self.parser_states.clone(),
        }
    }
}

/// Check the turn between `edge` and the last edge of the reversed path,
/// as it would be made at the time the reversed path reaches it. Turns are
/// always checked in the direction of travel
fn reversed_turn_permitted(
    graph: &RoutingGraph,
    ret: &State,
    edge: EdgeIndex,
) -> bool {
    let Some(back_edge) = ret.back_edge() else {
        return true;
    };
    let (from, to) = if ret.config().arrive_by {
        (edge, back_edge)
    } else {
        (back_edge, edge)
    };
    graph.can_turn(from, to, ret.non_transit_mode(), ret.time())
}

/// Optimize a batch of completed paths in parallel. Results are in the same
/// order as `paths`. Paths found with `reverse_optimize` switched off are
/// returned untouched
pub fn optimize_paths(
    graph: &RoutingGraph,
    paths: &[Arc<State>],
) -> Vec<Result<Arc<State>, StateError>> {
    let mut results = Vec::with_capacity(paths.len());
    paths
        .par_iter()
        .map(|path| {
            if path.config().reverse_optimize {
                path.optimize(graph)
            } else {
                Ok(Arc::clone(path))
            }
        })
        .collect_into_vec(&mut results);
    results
}
