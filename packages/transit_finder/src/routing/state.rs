//! A State records the progress of a search at a single vertex. States form
//! an append-only chain running back to the initial state of the search,
//! and are never modified once built. Any number of children can share a
//! parent, so a completed path is simply the chain behind its final state.

pub mod builder;
pub mod data;

use crate::common::config::RoutingConfig;
use crate::common::graph::RoutingGraph;
use crate::common::graph_data::{
    ServiceDay, TraverseMode, TripPattern, TripTimes,
};
use crate::routing::parser::{AutomatonState, START};
use builder::StateBuilder;
use data::StateData;
use log::{debug, error, warn};
use petgraph::graph::{EdgeIndex, NodeIndex};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Errors which indicate a bug in the engine rather than a problem with the
/// user's request. These should never be swallowed
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StateError {
    #[error("traversing edge {edge} reduced the path weight by {delta}")]
    NegativeWeight { edge: usize, delta: f64 },
    #[error("edge {edge} was traversed from a vertex it does not touch")]
    DefectiveTraversal { edge: usize },
}

#[derive(Clone)]
pub struct State {
    pub(crate) time: i64,
    pub(crate) weight: f64,
    pub(crate) vertex: NodeIndex,
    pub(crate) back_state: Option<Arc<State>>,
    pub(crate) back_edge: Option<EdgeIndex>,
    pub(crate) data: Arc<StateData>,
    pub(crate) walk_distance: f64,
    pub(crate) pre_transit_time: i64,
    pub(crate) parser_states: Vec<AutomatonState>,
}

impl State {
    /// Create the root state of a search, which has no parent
    pub fn initial(
        vertex: NodeIndex,
        time: i64,
        config: Arc<RoutingConfig>,
    ) -> State {
        let (non_transit_mode, car_parked) = if config.uses_car_to_transit() {
            // Arrive-by searches start at the destination, after the car
            // has been left behind
            let parked = config.arrive_by;
            let mode = if parked {
                TraverseMode::Walk
            } else {
                TraverseMode::Car
            };
            (mode, parked)
        } else {
            (config.modes.primary_street_mode(), false)
        };

        let parser_states = vec![START; config.path_parsers.len()];
        let data = StateData::new(config, time, non_transit_mode, car_parked);

        State {
            time,
            weight: 0.0,
            vertex,
            back_state: None,
            back_edge: None,
            data: Arc::new(data),
            walk_distance: 0.0,
            pre_transit_time: 0,
            parser_states,
        }
    }

    /// Start building the child state reached by traversing `edge`
    pub fn edit<'g>(
        self: &Arc<Self>,
        graph: &'g RoutingGraph,
        edge: EdgeIndex,
    ) -> StateBuilder<'g> {
        StateBuilder::new(self, graph, edge)
    }

    /// Create a parentless copy of this state which can be used to walk its
    /// path in the opposite direction
    pub fn reversed_clone(&self) -> State {
        State {
            time: self.time,
            weight: 0.0,
            vertex: self.vertex,
            back_state: None,
            back_edge: None,
            data: Arc::new(self.data.reversed(self.time)),
            walk_distance: 0.0,
            pre_transit_time: 0,
            parser_states: Vec::new(),
        }
    }

    // Accessors --------------------------------------------------------------

    pub fn time(&self) -> i64 {
        self.time
    }

    pub fn weight(&self) -> f64 {
        self.weight
    }

    pub fn vertex(&self) -> NodeIndex {
        self.vertex
    }

    pub fn back_state(&self) -> Option<&Arc<State>> {
        self.back_state.as_ref()
    }

    pub fn back_edge(&self) -> Option<EdgeIndex> {
        self.back_edge
    }

    pub fn data(&self) -> &Arc<StateData> {
        &self.data
    }

    pub fn config(&self) -> &RoutingConfig {
        &self.data.config
    }

    pub fn walk_distance(&self) -> f64 {
        self.walk_distance
    }

    pub fn pre_transit_time(&self) -> i64 {
        self.pre_transit_time
    }

    pub fn start_time(&self) -> i64 {
        self.data.start_time
    }

    pub fn service_day(&self) -> ServiceDay {
        self.data.service_day
    }

    pub fn trip_times(&self) -> Option<&Arc<TripTimes>> {
        self.data.trip_times.as_ref()
    }

    pub fn trip_id(&self) -> Option<&Arc<str>> {
        self.data.trip_times.as_ref().map(|trip| &trip.trip_id)
    }

    pub fn route(&self) -> Option<&Arc<str>> {
        self.data.route.as_ref()
    }

    pub fn route_sequence(&self) -> &[Arc<str>] {
        &self.data.route_sequence
    }

    pub fn last_pattern(&self) -> Option<&Arc<TripPattern>> {
        self.data.last_pattern.as_ref()
    }

    pub fn non_transit_mode(&self) -> TraverseMode {
        self.data.non_transit_mode
    }

    /// The mode used on the edge which led to this state
    pub fn back_mode(&self) -> Option<TraverseMode> {
        self.data.back_mode
    }

    pub fn is_back_walking_bike(&self) -> bool {
        self.data.back_walking_bike
    }

    /// Alerts attached to the edge which led to this state
    pub fn back_alerts(&self) -> &[Arc<str>] {
        &self.data.alerts
    }

    pub fn initial_wait_time(&self) -> i64 {
        self.data.initial_wait_time
    }

    pub fn last_alighted_time(&self) -> i64 {
        self.data.last_alighted_time
    }

    pub fn last_next_arrival_delta(&self) -> i64 {
        self.data.last_next_arrival_delta
    }

    pub fn parser_states(&self) -> &[AutomatonState] {
        &self.parser_states
    }

    // Travel flags -----------------------------------------------------------

    pub fn num_boardings(&self) -> u32 {
        self.data.num_boardings
    }

    pub fn is_ever_boarded(&self) -> bool {
        self.data.ever_boarded
    }

    pub fn is_onboard(&self) -> bool {
        self.data.trip_times.is_some()
    }

    pub fn is_bike_renting(&self) -> bool {
        self.data.using_rented_bike
    }

    pub fn is_car_parked(&self) -> bool {
        self.data.car_parked
    }

    /// Whether a path may end at this state. A rented bike must have been
    /// returned, and when driving to transit the car must be where the
    /// search direction expects it
    pub fn is_final(&self) -> bool {
        let config = self.config();
        let check_park = config.uses_car_to_transit();
        let renting = self.is_bike_renting();
        let parked = self.is_car_parked();
        if config.arrive_by {
            !renting && !(check_park && parked)
        } else {
            !renting && !(check_park && !parked)
        }
    }

    // Time & weight ----------------------------------------------------------

    /// Time spent travelling since the root of the search
    pub fn elapsed_time(&self) -> i64 {
        (self.time - self.data.start_time).abs()
    }

    /// Elapsed time without the wait before the first boarding, which is
    /// limited to `clamp_initial_wait` seconds where that is set
    pub fn active_time(&self) -> i64 {
        let elapsed = self.elapsed_time();
        let clamp = self.config().clamp_initial_wait;
        let initial_wait = if clamp >= 0 {
            self.data.initial_wait_time.min(clamp)
        } else {
            self.data.initial_wait_time
        };

        let active = elapsed - initial_wait;
        if active < 0 {
            warn!(
                "Initial wait of {initial_wait}s exceeds elapsed time of \
                 {elapsed}s, using elapsed time instead"
            );
            return elapsed;
        }
        active
    }

    /// Elapsed time once any wait before the first boarding has been
    /// discounted
    pub fn optimized_elapsed_time(&self) -> i64 {
        self.elapsed_time() - self.data.initial_wait_time
    }

    pub fn weight_delta(&self) -> f64 {
        match &self.back_state {
            Some(parent) => self.weight - parent.weight,
            None => 0.0,
        }
    }

    pub fn time_delta(&self) -> i64 {
        match &self.back_state {
            Some(parent) => self.time - parent.time,
            None => 0,
        }
    }

    pub fn abs_time_delta(&self) -> i64 {
        self.time_delta().abs()
    }

    pub fn walk_distance_delta(&self) -> f64 {
        match &self.back_state {
            Some(parent) => (self.walk_distance - parent.walk_distance).abs(),
            None => 0.0,
        }
    }

    pub fn pre_transit_time_delta(&self) -> i64 {
        match &self.back_state {
            Some(parent) => {
                (self.pre_transit_time - parent.pre_transit_time).abs()
            }
            None => 0,
        }
    }

    /// Weight must never decrease along a path, any decrease means that one
    /// of the traversals has a bug
    pub fn check_negative_weight(&self) -> Result<(), StateError> {
        let delta = self.weight_delta();
        if delta >= 0.0 {
            return Ok(());
        }
        let edge = self.back_edge.map_or(usize::MAX, |edge| edge.index());
        error!(
            "Weight decreased by {delta} when traversing edge {edge}, from \
             {:?}",
            self.back_state
        );
        Err(StateError::NegativeWeight { edge, delta })
    }

    /// Ordering between states, which only considers weight
    pub fn better_than(&self, other: &State) -> bool {
        self.weight < other.weight
    }

    pub fn exceeds_weight_limit(&self, max_weight: f64) -> bool {
        self.weight > max_weight
    }

    // Transit history --------------------------------------------------------

    /// The trip which was being ridden along the edge which led to this
    /// state, if that edge was on board a vehicle
    pub fn back_trip(&self, graph: &RoutingGraph) -> Option<&Arc<TripTimes>> {
        let edge = graph.edge(self.back_edge?)?;
        if edge.is_onboard() {
            self.trip_times()
        } else {
            None
        }
    }

    /// The direction shown to the traveller on the edge which led here. This
    /// is the headsign for transit edges, and the street name otherwise
    pub fn back_direction(&self, graph: &RoutingGraph) -> Option<Arc<str>> {
        let edge = graph.edge(self.back_edge?)?;
        let trip = self
            .trip_times()
            .or_else(|| self.back_state.as_ref()?.trip_times());
        match trip {
            Some(trip) if !edge.is_street() => edge.headsign_for(trip),
            _ => edge.name.clone(),
        }
    }

    /// Distance walked since the last vehicle was left, or since the start
    /// of the search when nothing has been boarded yet
    pub fn walk_since_last_transit(&self) -> f64 {
        if self.is_ever_boarded() && !self.is_onboard() {
            self.walk_distance - self.data.last_transit_walk
        } else {
            self.walk_distance
        }
    }

    /// Whether this state's routes start with every route of `other`
    pub fn route_sequence_prefix(&self, other: &State) -> bool {
        let ours = self.route_sequence();
        let theirs = other.route_sequence();
        theirs.len() <= ours.len() && ours[..theirs.len()] == *theirs
    }

    /// Whether every route used by this state was used by `other`
    pub fn route_sequence_subset(&self, other: &State) -> bool {
        self.route_sequence()
            .iter()
            .all(|route| other.route_sequence().contains(route))
    }

    pub fn route_sequence_superset(&self, other: &State) -> bool {
        other.route_sequence_subset(self)
    }

    /// Subset in either direction
    pub fn route_sequence_subset_symmetric(&self, other: &State) -> bool {
        self.route_sequence_subset(other) || other.route_sequence_subset(self)
    }

    // Path parsers -----------------------------------------------------------

    pub fn parsers_live(&self) -> bool {
        self.parser_states
            .iter()
            .zip(self.config().path_parsers.iter())
            .all(|(position, parser)| parser.is_live(*position))
    }

    pub fn all_parsers_accept(&self) -> bool {
        self.parser_states
            .iter()
            .zip(self.config().path_parsers.iter())
            .all(|(position, parser)| parser.accepts(*position))
    }

    pub fn parser_states_string(&self) -> String {
        let positions: Vec<String> = self
            .parser_states
            .iter()
            .map(|position| position.to_string())
            .collect();
        format!("[{}]", positions.join(", "))
    }

    // Paths ------------------------------------------------------------------

    /// Iterate from this state back to the root of its search
    pub fn path(&self) -> impl Iterator<Item = &State> {
        std::iter::successors(Some(self), |state| state.back_state.as_deref())
    }

    /// Write every state on the path to the debug log, root last
    pub fn log_path(&self, graph: &RoutingGraph) {
        for state in self.path() {
            let edge = state
                .back_edge
                .and_then(|edge| graph.edge(edge))
                .map_or_else(|| "root".to_string(), |edge| edge.to_string());
            debug!(
                "{state} via {edge} mode={:?} boardings={} parsers={}",
                state.back_mode(),
                state.num_boardings(),
                state.parser_states_string()
            );
        }
    }

    /// Check whether the traveller had a real choice to make at the vertex
    /// before this one. Another street edge leaving that vertex must be
    /// traversable in the same mode, and must lead somewhere which can be
    /// left again in that mode
    pub fn multiple_options_before(
        &self,
        graph: &RoutingGraph,
    ) -> Result<bool, StateError> {
        let Some(parent) = &self.back_state else {
            return Ok(false);
        };
        let mode = self.non_transit_mode();
        let arrive_by = self.config().arrive_by;
        let same_mode = |state: &State| state.back_mode() == Some(mode);

        for edge in graph.edges_away(parent.vertex, arrive_by) {
            if Some(edge) == self.back_edge {
                continue;
            }
            if !graph.edge(edge).is_some_and(|data| data.is_street()) {
                continue;
            }
            for option in graph.traverse(edge, parent)? {
                if !same_mode(&option) {
                    continue;
                }
                let option = Arc::new(option);
                for onward in graph.edges_away(option.vertex, arrive_by) {
                    let continuations = graph.traverse(onward, &option)?;
                    if continuations.iter().any(same_mode) {
                        return Ok(true);
                    }
                }
            }
        }
        Ok(false)
    }
}

impl Drop for State {
    fn drop(&mut self) {
        // Unlink long chains one state at a time rather than recursively
        let mut next = self.back_state.take();
        while let Some(parent) = next {
            match Arc::try_unwrap(parent) {
                Ok(mut parent) => next = parent.back_state.take(),
                Err(_) => break,
            }
        }
    }
}

impl fmt::Debug for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("State")
            .field("time", &self.time)
            .field("weight", &self.weight)
            .field("vertex", &self.vertex.index())
            .field("back_edge", &self.back_edge.map(|edge| edge.index()))
            .field("walk_distance", &self.walk_distance)
            .field("num_boardings", &self.data.num_boardings)
            .field("parser_states", &self.parser_states)
            .finish()
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "<State {} at {} weight {:.1}>",
            self.vertex.index(),
            self.time,
            self.weight
        )
    }
}

#[cfg(test)]
mod tests {

    use super::*;
    use crate::common::graph_data::TraverseModeSet;
    use crate::routing::parser::{PathParser, TableParser};
    use crate::routing::test_support::{
        get_test_config, get_test_fork, get_test_street_line, get_test_transit,
    };
    use approx::assert_relative_eq;

    /// Follow a fixed sequence of edges, taking the first result each time
    fn follow(
        graph: &RoutingGraph,
        root: State,
        edges: &[EdgeIndex],
    ) -> Arc<State> {
        let mut state = Arc::new(root);
        for edge in edges {
            let mut results = match graph.traverse(*edge, &state) {
                Ok(results) => results,
                Err(err) => panic!("Got an unexpected error: {err}"),
            };
            if results.is_empty() {
                panic!("Edge {} could not be traversed", edge.index());
            }
            state = Arc::new(results.remove(0));
        }
        state
    }

    mod test_initial {

        use super::*;

        #[test]
        fn test_defaults() {
            let config = Arc::new(get_test_config());

            let result = State::initial(NodeIndex::new(0), 500, config);

            assert_eq!(result.time(), 500);
            assert_eq!(result.start_time(), 500);
            assert_relative_eq!(result.weight(), 0.0);
            assert!(result.back_state().is_none());
            assert_eq!(result.non_transit_mode(), TraverseMode::Walk);
            assert!(!result.is_car_parked());
            assert!(result.is_final());
        }

        /// Driving to transit starts in the car for depart-at searches, and
        /// on foot for arrive-by searches
        #[test]
        fn test_car_to_transit() {
            let depart_at = RoutingConfig {
                park_and_ride: true,
                modes: TraverseModeSet::all(),
                ..get_test_config()
            };
            let arrive_by = RoutingConfig {
                arrive_by: true,
                ..depart_at.clone()
            };

            let driving =
                State::initial(NodeIndex::new(0), 0, Arc::new(depart_at));
            let walking =
                State::initial(NodeIndex::new(0), 0, Arc::new(arrive_by));

            assert_eq!(driving.non_transit_mode(), TraverseMode::Car);
            assert!(!driving.is_car_parked());
            assert!(!driving.is_final());
            assert_eq!(walking.non_transit_mode(), TraverseMode::Walk);
            assert!(walking.is_car_parked());
            assert!(!walking.is_final());
        }

        #[test]
        fn test_parsers_start() {
            let parser: Arc<dyn PathParser> =
                Arc::new(TableParser::max_boardings(1));
            let config = RoutingConfig {
                path_parsers: vec![parser.clone(), parser],
                ..get_test_config()
            };

            let result = State::initial(NodeIndex::new(0), 0, Arc::new(config));

            assert_eq!(result.parser_states(), &[START, START]);
            assert!(result.parsers_live());
            assert!(result.all_parsers_accept());
            assert_eq!(result.parser_states_string(), "[0, 0]");
        }
    }

    mod test_derived {

        use super::*;

        #[test]
        fn test_deltas() {
            // Arrange
            let (graph, edges) = get_test_street_line(3, 100.0);
            let root = State::initial(
                NodeIndex::new(0),
                1000,
                Arc::new(get_test_config()),
            );

            // Act
            let result = follow(&graph, root, &edges);

            // Assert
            // 100m at 1m/s, with a walk reluctance of 2
            assert_eq!(result.time(), 1200);
            assert_eq!(result.elapsed_time(), 200);
            assert_eq!(result.time_delta(), 100);
            assert_relative_eq!(result.weight(), 400.0);
            assert_relative_eq!(result.weight_delta(), 200.0);
            assert_relative_eq!(result.walk_distance(), 200.0);
            assert_relative_eq!(result.walk_distance_delta(), 100.0);
            assert_eq!(result.path().count(), 3);
            assert!(result.check_negative_weight().is_ok());
        }

        #[test]
        fn test_active_time() {
            let config = RoutingConfig {
                clamp_initial_wait: 60,
                ..get_test_config()
            };
            let mut state =
                State::initial(NodeIndex::new(0), 0, Arc::new(config));
            state.time = 500;

            Arc::make_mut(&mut state.data).initial_wait_time = 100;
            let clamped = state.active_time();

            Arc::make_mut(&mut state.data).initial_wait_time = 30;
            let unclamped = state.active_time();

            assert_eq!(clamped, 440);
            assert_eq!(unclamped, 470);
            assert_eq!(state.optimized_elapsed_time(), 470);
        }

        /// An initial wait longer than the journey falls back to elapsed time
        #[test]
        fn test_negative_active_time() {
            let mut state = State::initial(
                NodeIndex::new(0),
                0,
                Arc::new(get_test_config()),
            );
            state.time = 50;
            Arc::make_mut(&mut state.data).initial_wait_time = 100;

            assert_eq!(state.active_time(), 50);
        }

        #[test]
        fn test_better_than() {
            let config = Arc::new(get_test_config());
            let mut cheap =
                State::initial(NodeIndex::new(0), 0, config.clone());
            let mut dear = State::initial(NodeIndex::new(0), 0, config);
            cheap.weight = 10.0;
            dear.weight = 20.0;

            assert!(cheap.better_than(&dear));
            assert!(!dear.better_than(&cheap));
            assert!(dear.exceeds_weight_limit(15.0));
            assert!(!cheap.exceeds_weight_limit(15.0));
        }

        #[test]
        fn test_route_sequences() {
            let config = Arc::new(get_test_config());
            let mut long = State::initial(NodeIndex::new(0), 0, config.clone());
            let mut short = State::initial(NodeIndex::new(0), 0, config);
            Arc::make_mut(&mut long.data).route_sequence =
                vec![Arc::from("A"), Arc::from("B")];
            Arc::make_mut(&mut short.data).route_sequence =
                vec![Arc::from("A")];

            assert!(long.route_sequence_prefix(&short));
            assert!(!short.route_sequence_prefix(&long));
            assert!(short.route_sequence_subset(&long));
            assert!(long.route_sequence_superset(&short));
            assert!(long.route_sequence_subset_symmetric(&short));
            assert!(!long.route_sequence_subset(&short));
        }
    }

    mod test_transit_history {

        use super::*;

        #[test]
        fn test_boarding_history() {
            // Arrange
            let fixture = get_test_transit(vec![(200, 300)]);
            let root = State::initial(
                fixture.origin,
                0,
                Arc::new(get_test_config()),
            );

            // Act
            let onboard = follow(
                &fixture.graph,
                root,
                &[fixture.access, fixture.board, fixture.hop],
            );
            let alighted = follow(
                &fixture.graph,
                (*onboard).clone(),
                &[fixture.alight, fixture.egress],
            );

            // Assert
            assert!(onboard.is_onboard());
            assert_eq!(onboard.num_boardings(), 1);
            assert_eq!(onboard.trip_id().map(|id| id.as_ref()), Some("trip-0"));
            assert_eq!(
                onboard.back_trip(&fixture.graph).map(|trip| trip.num_stops()),
                Some(2)
            );
            assert_eq!(
                onboard.back_direction(&fixture.graph).as_deref(),
                Some("Town Centre")
            );
            assert!(!alighted.is_onboard());
            assert!(alighted.is_ever_boarded());
            assert!(alighted.back_trip(&fixture.graph).is_none());
            assert_eq!(
                alighted.back_direction(&fixture.graph).as_deref(),
                Some("Station Road")
            );
            assert_eq!(alighted.route_sequence().len(), 1);
            assert_relative_eq!(alighted.walk_since_last_transit(), 100.0);
        }
    }

    mod test_multiple_options_before {

        use super::*;

        /// Two parallel edges lead to a vertex which can be left again
        #[test]
        fn test_two_options() {
            let fixture = get_test_fork(true);
            let root = State::initial(
                fixture.start,
                0,
                Arc::new(get_test_config()),
            );

            let state = follow(&fixture.graph, root, &[fixture.first]);

            match state.multiple_options_before(&fixture.graph) {
                Ok(result) => assert!(result),
                Err(err) => panic!("Got an unexpected error: {err}"),
            }
        }

        #[test]
        fn test_one_option() {
            let fixture = get_test_fork(false);
            let root = State::initial(
                fixture.start,
                0,
                Arc::new(get_test_config()),
            );

            let state = follow(&fixture.graph, root, &[fixture.first]);

            match state.multiple_options_before(&fixture.graph) {
                Ok(result) => assert!(!result),
                Err(err) => panic!("Got an unexpected error: {err}"),
            }
        }

        #[test]
        fn test_root() {
            let fixture = get_test_fork(true);
            let root = State::initial(
                fixture.start,
                0,
                Arc::new(get_test_config()),
            );

            match root.multiple_options_before(&fixture.graph) {
                Ok(result) => assert!(!result),
                Err(err) => panic!("Got an unexpected error: {err}"),
            }
        }
    }

    /// Dropping a long chain must not overflow the stack
    #[test]
    fn test_drop_long_chain() {
        let config = Arc::new(get_test_config());
        let mut state = Arc::new(State::initial(NodeIndex::new(0), 0, config));
        for step in 1..200_000 {
            let mut child = (*state).clone();
            child.time = step;
            child.back_state = Some(state);
            state = Arc::new(child);
        }

        assert_eq!(state.path().count(), 200_000);
        drop(state);
    }
}
