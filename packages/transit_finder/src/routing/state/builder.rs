//! The builder is the only way to create a child state. It starts out as a
//! copy of the parent which has been moved across an edge, and is adjusted by
//! the traversal code before being frozen with `build`. Every setter writes
//! through `Arc::make_mut`, so the StateData shared with the parent is only
//! copied the first time a field actually changes.

use crate::common::graph::RoutingGraph;
use crate::common::graph_data::{TraverseMode, TripPattern, TripTimes};
use crate::routing::parser::Terminal;
use crate::routing::state::data::StateData;
use crate::routing::state::{State, StateError};
use log::{error, warn};
use petgraph::graph::EdgeIndex;
use std::sync::Arc;

fn same_arc<T: ?Sized>(left: &Option<Arc<T>>, right: &Option<Arc<T>>) -> bool {
    match (left, right) {
        (None, None) => true,
        (Some(left), Some(right)) => Arc::ptr_eq(left, right),
        _ => false,
    }
}

pub struct StateBuilder<'g> {
    child: State,
    graph: &'g RoutingGraph,
    edge: EdgeIndex,
    traversing_backward: bool,
    defective: bool,
}

impl<'g> StateBuilder<'g> {
    /// Start building the state reached by traversing `edge` from `parent`.
    /// In arrive-by searches edges are walked from target to source
    pub(crate) fn new(
        parent: &Arc<State>,
        graph: &'g RoutingGraph,
        edge: EdgeIndex,
    ) -> Self {
        let traversing_backward = parent.config().arrive_by;

        let mut defective = false;
        let vertex = match graph.endpoints(edge) {
            Some((source, target)) => {
                let (expected, next) = if traversing_backward {
                    (target, source)
                } else {
                    (source, target)
                };
                if parent.vertex != expected {
                    error!(
                        "Edge {} does not lead away from vertex {}",
                        edge.index(),
                        parent.vertex.index()
                    );
                    defective = true;
                }
                next
            }
            None => {
                error!("Edge {} is not in the graph", edge.index());
                defective = true;
                parent.vertex
            }
        };

        let mut child = State {
            time: parent.time,
            weight: parent.weight,
            vertex,
            back_state: Some(Arc::clone(parent)),
            back_edge: Some(edge),
            data: Arc::clone(&parent.data),
            walk_distance: parent.walk_distance,
            pre_transit_time: parent.pre_transit_time,
            parser_states: parent.parser_states.clone(),
        };

        // Alerts only describe the edge which was just traversed
        if !child.data.alerts.is_empty() {
            Arc::make_mut(&mut child.data).alerts.clear();
        }

        StateBuilder {
            child,
            graph,
            edge,
            traversing_backward,
            defective,
        }
    }

    fn data_mut(&mut self) -> &mut StateData {
        Arc::make_mut(&mut self.child.data)
    }

    pub fn is_defective(&self) -> bool {
        self.defective
    }

    /// The state as it currently stands, before it is built
    pub fn peek(&self) -> &State {
        &self.child
    }

    // Accumulators -----------------------------------------------------------

    /// Advance the clock by `seconds`, which moves the clock backwards when
    /// traversing an edge in an arrive-by search
    pub fn increment_time(&mut self, seconds: i64) {
        if seconds < 0 {
            warn!(
                "A state's time can't be incremented by a negative amount \
                 ({seconds}s) on edge {}",
                self.edge.index()
            );
            self.defective = true;
            return;
        }
        if self.traversing_backward {
            self.child.time -= seconds;
        } else {
            self.child.time += seconds;
        }
    }

    /// Negative increments are applied as-is, and rejected by `build`
    pub fn increment_weight(&mut self, weight: f64) {
        self.child.weight += weight;
    }

    pub fn increment_walk_distance(&mut self, length: f64) {
        if length < 0.0 {
            warn!(
                "A state's walk distance can't be incremented by a negative \
                 amount ({length}m) on edge {}",
                self.edge.index()
            );
            self.defective = true;
            return;
        }
        self.child.walk_distance += length;
    }

    pub fn increment_pre_transit_time(&mut self, seconds: i64) {
        if seconds < 0 {
            warn!(
                "A state's pre-transit time can't be incremented by a \
                 negative amount ({seconds}s) on edge {}",
                self.edge.index()
            );
            self.defective = true;
            return;
        }
        self.child.pre_transit_time += seconds;
    }

    // StateData setters ------------------------------------------------------

    pub fn set_back_mode(&mut self, mode: TraverseMode) {
        if self.child.data.back_mode != Some(mode) {
            self.data_mut().back_mode = Some(mode);
        }
    }

    pub fn set_back_walking_bike(&mut self, walking_bike: bool) {
        if self.child.data.back_walking_bike != walking_bike {
            self.data_mut().back_walking_bike = walking_bike;
        }
    }

    pub fn set_trip_times(&mut self, trip_times: Option<Arc<TripTimes>>) {
        if !same_arc(&self.child.data.trip_times, &trip_times) {
            self.data_mut().trip_times = trip_times;
        }
    }

    pub fn set_route(&mut self, route: Option<Arc<str>>) {
        if self.child.data.route != route {
            self.data_mut().route = route;
        }
    }

    /// Record that a vehicle on `route` has been boarded
    pub fn push_route(&mut self, route: Arc<str>) {
        self.data_mut().route_sequence.push(route);
    }

    pub fn increment_num_boardings(&mut self) {
        self.data_mut().num_boardings += 1;
    }

    pub fn set_num_boardings(&mut self, num_boardings: u32) {
        if self.child.data.num_boardings != num_boardings {
            self.data_mut().num_boardings = num_boardings;
        }
    }

    pub fn set_ever_boarded(&mut self, ever_boarded: bool) {
        if self.child.data.ever_boarded != ever_boarded {
            self.data_mut().ever_boarded = ever_boarded;
        }
    }

    pub fn set_bike_renting(&mut self, renting: bool) {
        if self.child.data.using_rented_bike != renting {
            self.data_mut().using_rented_bike = renting;
        }
    }

    pub fn set_car_parked(&mut self, parked: bool) {
        if self.child.data.car_parked != parked {
            self.data_mut().car_parked = parked;
        }
    }

    pub fn set_non_transit_mode(&mut self, mode: TraverseMode) {
        if self.child.data.non_transit_mode != mode {
            self.data_mut().non_transit_mode = mode;
        }
    }

    pub fn add_alerts(&mut self, alerts: &[Arc<str>]) {
        if !alerts.is_empty() {
            self.data_mut().alerts.extend(alerts.iter().cloned());
        }
    }

    pub fn set_initial_wait_time(&mut self, seconds: i64) {
        if self.child.data.initial_wait_time != seconds {
            self.data_mut().initial_wait_time = seconds;
        }
    }

    pub fn set_last_alighted_time(&mut self, time: i64) {
        if self.child.data.last_alighted_time != time {
            self.data_mut().last_alighted_time = time;
        }
    }

    pub fn set_last_transit_walk(&mut self, walk_distance: f64) {
        if self.child.data.last_transit_walk != walk_distance {
            self.data_mut().last_transit_walk = walk_distance;
        }
    }

    pub fn set_last_pattern(&mut self, pattern: Option<Arc<TripPattern>>) {
        if !same_arc(&self.child.data.last_pattern, &pattern) {
            self.data_mut().last_pattern = pattern;
        }
    }

    /// Copy the transit context and travel flags of another state, used when
    /// replaying a path in the opposite direction
    pub fn set_from_state(&mut self, other: &State) {
        self.set_trip_times(other.data.trip_times.clone());
        self.set_route(other.data.route.clone());
        self.set_last_pattern(other.data.last_pattern.clone());
        if self.child.data.service_day != other.data.service_day {
            self.data_mut().service_day = other.data.service_day;
        }
        self.set_bike_renting(other.data.using_rented_bike);
        self.set_car_parked(other.data.car_parked);
    }

    // Build ------------------------------------------------------------------

    /// Freeze the child state. Every path parser is advanced using the kind
    /// of edge which was traversed, and the weight delta against the parent
    /// is checked before the child is handed back
    pub fn build(self) -> Result<State, StateError> {
        let StateBuilder {
            mut child,
            graph,
            edge,
            defective,
            ..
        } = self;

        if defective {
            return Err(StateError::DefectiveTraversal { edge: edge.index() });
        }

        let config = Arc::clone(&child.data.config);
        if let Some(edge_data) = graph.edge(edge) {
            let terminal = Terminal::for_edge(edge_data);
            for (position, parser) in child
                .parser_states
                .iter_mut()
                .zip(config.path_parsers.iter())
            {
                *position = parser.transition(*position, terminal);
            }
        }

        child.check_negative_weight()?;
        Ok(child)
    }
}
