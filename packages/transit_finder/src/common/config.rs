//! This module contains structs which represent the routing configuration
//! options selected by the end user. In particular, the RoutingConfig struct
//! is shared by every State produced during a search, and informs how each
//! edge is traversed.

use crate::common::graph_data::{ServiceDay, TraverseModeSet};
use crate::routing::parser::{PathParser, TableParser};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

/// Stores the user's requested routing configuration exactly as it is
/// received, e.g. from a JSON request body
#[derive(Deserialize, Debug, PartialEq)]
pub struct UserRoutingConfig {
    pub arrive_by: bool,
    pub modes: String,
    pub park_and_ride: bool,
    pub kiss_and_ride: bool,
    pub max_weight: Option<f64>,
    pub clamp_initial_wait: Option<i64>,
    pub max_boardings: Option<usize>,
    pub reverse_optimize: bool,
    pub walk_speed: Option<f64>,
    pub service_day_midnight: i64,
    pub max_departure_options: Option<usize>,
}

impl Into<RoutingConfig> for UserRoutingConfig {
    fn into(self) -> RoutingConfig {
        let defaults = RoutingConfig::default();

        let mut path_parsers: Vec<Arc<dyn PathParser>> = Vec::new();
        if let Some(max_boardings) = self.max_boardings {
            let parser = TableParser::max_boardings(max_boardings);
            path_parsers.push(Arc::new(parser));
        }

        RoutingConfig {
            arrive_by: self.arrive_by,
            modes: TraverseModeSet::from_list(&self.modes),
            park_and_ride: self.park_and_ride,
            kiss_and_ride: self.kiss_and_ride,
            max_weight: self.max_weight.unwrap_or(defaults.max_weight),
            clamp_initial_wait: self
                .clamp_initial_wait
                .unwrap_or(defaults.clamp_initial_wait),
            path_parsers,
            reverse_optimize: self.reverse_optimize,
            walk_speed: self.walk_speed.unwrap_or(defaults.walk_speed),
            service_day: ServiceDay::new(self.service_day_midnight),
            max_departure_options: self
                .max_departure_options
                .unwrap_or(defaults.max_departure_options)
                .max(1),
            ..defaults
        }
    }
}

/// Stores the routing configuration in a format which can be used in the
/// rest of this package. Users will generally create a UserRoutingConfig and
/// use .into() to convert it, although defaults are provided for tests and
/// for callers which build a configuration by hand.
#[derive(Debug, Clone)]
pub struct RoutingConfig {
    pub arrive_by: bool,
    pub modes: TraverseModeSet,
    pub park_and_ride: bool,
    pub kiss_and_ride: bool,
    pub max_weight: f64,
    /// Upper bound on the initial wait which is discounted from active time,
    /// -1 disables the clamp
    pub clamp_initial_wait: i64,
    pub path_parsers: Vec<Arc<dyn PathParser>>,
    pub reverse_optimize: bool,

    // Costs, speeds are in metres per second and times in seconds
    pub walk_speed: f64,
    pub bike_speed: f64,
    pub car_speed: f64,
    pub walk_reluctance: f64,
    pub wait_reluctance: f64,
    pub wait_at_beginning_factor: f64,
    pub board_cost: f64,
    pub bike_rental_pickup_time: i64,
    pub bike_rental_pickup_cost: f64,
    pub bike_rental_dropoff_time: i64,
    pub car_dropoff_time: i64,

    pub service_day: ServiceDay,
    /// Number of alternative trips a single boarding may produce
    pub max_departure_options: usize,
    pub first_path_timeout: Duration,
    pub multi_path_timeout: Duration,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        RoutingConfig {
            arrive_by: false,
            modes: TraverseModeSet::from_list("walk,transit"),
            park_and_ride: false,
            kiss_and_ride: false,
            max_weight: f64::MAX,
            clamp_initial_wait: -1,
            path_parsers: Vec::new(),
            reverse_optimize: true,
            walk_speed: 1.33,
            bike_speed: 5.0,
            car_speed: 11.2,
            walk_reluctance: 2.0,
            wait_reluctance: 1.0,
            wait_at_beginning_factor: 0.4,
            board_cost: 600.0,
            bike_rental_pickup_time: 60,
            bike_rental_pickup_cost: 120.0,
            bike_rental_dropoff_time: 30,
            car_dropoff_time: 120,
            service_day: ServiceDay::default(),
            max_departure_options: 1,
            first_path_timeout: Duration::from_secs(10),
            multi_path_timeout: Duration::from_secs(1),
        }
    }
}

impl RoutingConfig {
    /// Generate the configuration used when walking a completed path in the
    /// opposite direction. The search direction is flipped and no path
    /// parsers are applied, as the path being reversed has already been
    /// accepted.
    pub fn reversed(&self) -> RoutingConfig {
        let mut reversed = self.clone();
        reversed.arrive_by = !self.arrive_by;
        reversed.path_parsers = Vec::new();
        reversed
    }

    /// Whether the car needs to be tracked as parked or unparked
    pub fn uses_car_to_transit(&self) -> bool {
        self.park_and_ride || self.kiss_and_ride
    }

    /// The time an external search driver should be allowed before giving
    /// up, which is more generous while no path has yet been found
    pub fn timeout_for(&self, paths_found: usize) -> Duration {
        if paths_found == 0 {
            self.first_path_timeout
        } else {
            self.multi_path_timeout
        }
    }
}
