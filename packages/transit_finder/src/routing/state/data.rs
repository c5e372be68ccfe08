//! The slow-changing part of a search state. Consecutive states along a path
//! usually share a single StateData, it is only copied when a traversal
//! actually changes one of its fields.

use crate::common::config::RoutingConfig;
use crate::common::graph_data::{
    ServiceDay, TraverseMode, TripPattern, TripTimes,
};
use std::sync::Arc;

/// Container for the state fields which rarely change between one edge and
/// the next
#[derive(Debug, Clone)]
pub struct StateData {
    pub(crate) config: Arc<RoutingConfig>,
    pub(crate) start_time: i64,

    // Transit
    pub(crate) trip_times: Option<Arc<TripTimes>>,
    pub(crate) route: Option<Arc<str>>,
    pub(crate) route_sequence: Vec<Arc<str>>,
    pub(crate) num_boardings: u32,
    pub(crate) ever_boarded: bool,
    pub(crate) last_pattern: Option<Arc<TripPattern>>,
    pub(crate) service_day: ServiceDay,

    // Street
    pub(crate) using_rented_bike: bool,
    pub(crate) car_parked: bool,
    pub(crate) non_transit_mode: TraverseMode,
    pub(crate) back_mode: Option<TraverseMode>,
    pub(crate) back_walking_bike: bool,

    /// Alerts attached to the edge which was traversed to reach this state
    pub(crate) alerts: Vec<Arc<str>>,

    // Timings used when optimizing a completed path
    pub(crate) initial_wait_time: i64,
    pub(crate) last_alighted_time: i64,
    pub(crate) last_transit_walk: f64,
    pub(crate) last_next_arrival_delta: i64,
}

impl StateData {
    /// Set up the data for the root of a search, travelling in the provided
    /// mode
    pub fn new(
        config: Arc<RoutingConfig>,
        start_time: i64,
        non_transit_mode: TraverseMode,
        car_parked: bool,
    ) -> Self {
        let service_day = config.service_day;
        StateData {
            config,
            start_time,
            trip_times: None,
            route: None,
            route_sequence: Vec::new(),
            num_boardings: 0,
            ever_boarded: false,
            last_pattern: None,
            service_day,
            using_rented_bike: false,
            car_parked,
            non_transit_mode,
            back_mode: None,
            back_walking_bike: false,
            alerts: Vec::new(),
            initial_wait_time: 0,
            last_alighted_time: 0,
            last_transit_walk: 0.0,
            last_next_arrival_delta: 0,
        }
    }

    /// Generate the data for the root of a reversed path. The search
    /// direction is flipped and the path parsers are removed. Only the
    /// active trip, the travel flags and the initial wait are carried over,
    /// everything else starts afresh
    pub fn reversed(&self, start_time: i64) -> Self {
        let config = Arc::new(self.config.reversed());
        let mut reversed = StateData::new(
            config,
            start_time,
            self.non_transit_mode,
            self.car_parked,
        );
        reversed.trip_times = self.trip_times.clone();
        reversed.using_rented_bike = self.using_rented_bike;
        reversed.initial_wait_time = self.initial_wait_time;
        reversed
    }
}

#[cfg(test)]
mod tests {

    use super::*;

    #[test]
    fn test_new() {
        let config = Arc::new(RoutingConfig::default());

        let result = StateData::new(config, 1000, TraverseMode::Walk, false);

        assert_eq!(result.start_time, 1000);
        assert_eq!(result.num_boardings, 0);
        assert!(result.trip_times.is_none());
        assert!(result.back_mode.is_none());
        assert_eq!(result.non_transit_mode, TraverseMode::Walk);
    }

    /// Reversing flips the direction, but keeps the travel flags
    #[test]
    fn test_reversed() {
        let config = Arc::new(RoutingConfig::default());
        let mut data = StateData::new(config, 0, TraverseMode::Walk, true);
        data.num_boardings = 2;
        data.initial_wait_time = 300;
        data.back_mode = Some(TraverseMode::Walk);
        data.alerts.push(Arc::from("Road closed"));

        let result = data.reversed(5000);

        assert!(result.config.arrive_by);
        assert!(!data.config.arrive_by);
        assert_eq!(result.start_time, 5000);
        assert_eq!(result.num_boardings, 0);
        assert_eq!(result.initial_wait_time, 300);
        assert_eq!(result.non_transit_mode, TraverseMode::Walk);
        assert!(result.car_parked);
        assert!(result.back_mode.is_none());
        assert!(result.alerts.is_empty());
    }
}
