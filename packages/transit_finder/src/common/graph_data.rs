//! Defines the data which is stored against vertices and edges of the routing
//! graph. Street edges are created from OSM ways, while transit edges are
//! created from trip patterns. Edges are represented as a closed set of
//! variants, with capability queries used by the traversal code in place of
//! any kind of type inspection.

use geo::{LineString, Point};
use log::warn;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

// Modes ----------------------------------------------------------------------

/// The ways in which a traveller can move along an edge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TraverseMode {
    Walk,
    Bicycle,
    Car,
    Transit,
}

impl TraverseMode {
    fn bit(&self) -> u8 {
        match self {
            TraverseMode::Walk => 1,
            TraverseMode::Bicycle => 1 << 1,
            TraverseMode::Car => 1 << 2,
            TraverseMode::Transit => 1 << 3,
        }
    }
}

impl FromStr for TraverseMode {
    type Err = ();

    fn from_str(input: &str) -> Result<TraverseMode, Self::Err> {
        match input {
            "walk" => Ok(TraverseMode::Walk),
            "bicycle" | "bike" => Ok(TraverseMode::Bicycle),
            "car" => Ok(TraverseMode::Car),
            "transit" => Ok(TraverseMode::Transit),
            _ => Err(()),
        }
    }
}

impl fmt::Display for TraverseMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TraverseMode::Walk => "WALK",
            TraverseMode::Bicycle => "BICYCLE",
            TraverseMode::Car => "CAR",
            TraverseMode::Transit => "TRANSIT",
        };
        write!(f, "{name}")
    }
}

/// A compact set of traverse modes, stored as a bitmask
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TraverseModeSet(u8);

impl TraverseModeSet {
    pub const fn empty() -> Self {
        TraverseModeSet(0)
    }

    pub fn all() -> Self {
        [
            TraverseMode::Walk,
            TraverseMode::Bicycle,
            TraverseMode::Car,
            TraverseMode::Transit,
        ]
        .into_iter()
        .collect()
    }

    /// The set of modes which can travel on a general purpose street
    pub fn street() -> Self {
        [TraverseMode::Walk, TraverseMode::Bicycle, TraverseMode::Car]
            .into_iter()
            .collect()
    }

    pub fn with(mut self, mode: TraverseMode) -> Self {
        self.0 |= mode.bit();
        self
    }

    pub fn without(mut self, mode: TraverseMode) -> Self {
        self.0 &= !mode.bit();
        self
    }

    pub fn contains(&self, mode: TraverseMode) -> bool {
        self.0 & mode.bit() != 0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// Determine which mode a search should start in when it is not driving
    /// to transit. Driving takes precedence over cycling, and cycling over
    /// walking.
    pub fn primary_street_mode(&self) -> TraverseMode {
        if self.contains(TraverseMode::Car) {
            TraverseMode::Car
        } else if self.contains(TraverseMode::Bicycle) {
            TraverseMode::Bicycle
        } else {
            TraverseMode::Walk
        }
    }

    /// Build a mode set from a comma separated list such as
    /// "walk,transit". Unrecognised entries are skipped with a warning.
    pub fn from_list(modes: &str) -> Self {
        let mut set = TraverseModeSet::empty();
        for item in modes.split(',').map(str::trim).filter(|s| !s.is_empty())
        {
            match TraverseMode::from_str(item) {
                Ok(mode) => set = set.with(mode),
                Err(_) => warn!("Ignoring unknown traverse mode '{item}'"),
            }
        }
        set
    }
}

impl FromIterator<TraverseMode> for TraverseModeSet {
    fn from_iter<I: IntoIterator<Item = TraverseMode>>(iter: I) -> Self {
        iter.into_iter()
            .fold(TraverseModeSet::empty(), |set, mode| set.with(mode))
    }
}

// Schedules ------------------------------------------------------------------

/// The service day which a search is running against. All trip times are
/// stored as seconds since midnight of the service day
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct ServiceDay {
    pub midnight: i64,
}

impl ServiceDay {
    pub fn new(midnight: i64) -> Self {
        ServiceDay { midnight }
    }

    pub fn seconds_since_midnight(&self, time: i64) -> i64 {
        time - self.midnight
    }

    pub fn time(&self, seconds_since_midnight: i64) -> i64 {
        self.midnight + seconds_since_midnight
    }
}

/// Scheduled arrival and departure times for every stop on a single trip
#[derive(Debug, Clone, PartialEq)]
pub struct TripTimes {
    pub trip_id: Arc<str>,
    pub route_id: Arc<str>,
    pub headsign: Option<Arc<str>>,
    pub stop_headsigns: Vec<Option<Arc<str>>>,
    pub arrivals: Vec<i64>,
    pub departures: Vec<i64>,
}

impl TripTimes {
    pub fn new(
        trip_id: &str,
        route_id: &str,
        arrivals: Vec<i64>,
        departures: Vec<i64>,
    ) -> Self {
        TripTimes {
            trip_id: Arc::from(trip_id),
            route_id: Arc::from(route_id),
            headsign: None,
            stop_headsigns: Vec::new(),
            arrivals,
            departures,
        }
    }

    pub fn with_headsign(mut self, headsign: &str) -> Self {
        self.headsign = Some(Arc::from(headsign));
        self
    }

    pub fn num_stops(&self) -> usize {
        self.arrivals.len()
    }

    pub fn arrival(&self, stop_index: usize) -> Option<i64> {
        self.arrivals.get(stop_index).copied()
    }

    pub fn departure(&self, stop_index: usize) -> Option<i64> {
        self.departures.get(stop_index).copied()
    }

    /// Per-stop headsigns override the trip headsign where they are set
    pub fn headsign(&self, stop_index: usize) -> Option<Arc<str>> {
        match self.stop_headsigns.get(stop_index) {
            Some(Some(headsign)) => Some(headsign.clone()),
            _ => self.headsign.clone(),
        }
    }
}

/// A sequence of stops which is served by a set of trips, each of which
/// visits the stops in the same order
#[derive(Debug, Clone, PartialEq)]
pub struct TripPattern {
    pub id: Arc<str>,
    pub route_id: Arc<str>,
    pub trips: Vec<Arc<TripTimes>>,
}

impl TripPattern {
    /// Create a new pattern, trips are sorted by their first departure
    pub fn new(id: &str, route_id: &str, mut trips: Vec<TripTimes>) -> Self {
        trips.sort_by_key(|trip| trip.departure(0).unwrap_or(i64::MAX));
        TripPattern {
            id: Arc::from(id),
            route_id: Arc::from(route_id),
            trips: trips.into_iter().map(Arc::new).collect(),
        }
    }

    pub fn num_stops(&self) -> usize {
        self.trips.first().map_or(0, |trip| trip.num_stops())
    }

    /// All trips which depart from the provided stop at or after `time`
    /// (seconds since midnight), soonest first
    pub fn departures_from(
        &self,
        stop_index: usize,
        time: i64,
    ) -> Vec<(i64, &Arc<TripTimes>)> {
        let mut found: Vec<(i64, &Arc<TripTimes>)> = self
            .trips
            .iter()
            .filter_map(|trip| {
                trip.departure(stop_index)
                    .filter(|dep| *dep >= time)
                    .map(|dep| (dep, trip))
            })
            .collect();
        found.sort_by_key(|(dep, _)| *dep);
        found
    }

    /// All trips which arrive at the provided stop at or before `time`
    /// (seconds since midnight), latest first
    pub fn arrivals_until(
        &self,
        stop_index: usize,
        time: i64,
    ) -> Vec<(i64, &Arc<TripTimes>)> {
        let mut found: Vec<(i64, &Arc<TripTimes>)> = self
            .trips
            .iter()
            .filter_map(|trip| {
                trip.arrival(stop_index)
                    .filter(|arr| *arr <= time)
                    .map(|arr| (arr, trip))
            })
            .collect();
        found.sort_by_key(|(arr, _)| std::cmp::Reverse(*arr));
        found
    }

    pub fn next_departure(
        &self,
        stop_index: usize,
        time: i64,
    ) -> Option<(i64, &Arc<TripTimes>)> {
        self.departures_from(stop_index, time).into_iter().next()
    }

    pub fn previous_arrival(
        &self,
        stop_index: usize,
        time: i64,
    ) -> Option<(i64, &Arc<TripTimes>)> {
        self.arrivals_until(stop_index, time).into_iter().next()
    }
}

// Vertices -------------------------------------------------------------------

/// Distinguishes between the different roles a vertex can play
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub enum VertexKind {
    #[default]
    Street,
    TransitStop,
    Onboard,
}

/// Sets the data which will be stored as weights against vertices in the
/// petgraph graph
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct VertexData {
    pub id: i64,
    pub lat: f64,
    pub lon: f64,
    pub kind: VertexKind,
}

impl VertexData {
    pub fn new(id: i64, lat: f64, lon: f64) -> Self {
        VertexData {
            id,
            lat,
            lon,
            kind: VertexKind::Street,
        }
    }

    pub fn point(&self) -> Point {
        Point::new(self.lon, self.lat)
    }
}

// Edges ----------------------------------------------------------------------

/// A street segment, length is in metres
#[derive(Debug, Clone, PartialEq)]
pub struct StreetEdge {
    pub length: f64,
    pub permission: TraverseModeSet,
}

/// Links a stop to the onboard vertex of a pattern. When `boarding` is set
/// the edge leads from the stop onto the vehicle, otherwise it leads from
/// the vehicle back to the stop
#[derive(Debug, Clone, PartialEq)]
pub struct BoardAlightEdge {
    pub pattern: Arc<TripPattern>,
    pub stop_index: usize,
    pub boarding: bool,
}

/// Travel on board a vehicle between `stop_index` and the stop after it
#[derive(Debug, Clone, PartialEq)]
pub struct HopEdge {
    pub pattern: Arc<TripPattern>,
    pub stop_index: usize,
}

/// Staying on board while a vehicle finishes one trip and continues as
/// another
#[derive(Debug, Clone, PartialEq)]
pub struct InterlineDwellEdge {
    pub from_trip: Arc<TripTimes>,
    pub to_trip: Arc<TripTimes>,
}

/// Picking up (or dropping off) a rental bicycle at a dock
#[derive(Debug, Clone, PartialEq)]
pub struct BikeRentalEdge {
    pub pickup: bool,
}

/// The closed set of edge variants which can be found in the graph
#[derive(Debug, Clone, PartialEq)]
pub enum EdgeKind {
    Street(StreetEdge),
    BoardAlight(BoardAlightEdge),
    Hop(HopEdge),
    InterlineDwell(InterlineDwellEdge),
    BikeRental(BikeRentalEdge),
    ParkAndRide,
}

/// Container for edge metadata which will be stored in the graph
#[derive(Debug, Clone, PartialEq)]
pub struct EdgeData {
    pub kind: EdgeKind,
    pub geometry: LineString<f64>,
    pub name: Option<Arc<str>>,
    pub alerts: Vec<Arc<str>>,
}

impl EdgeData {
    pub fn new(kind: EdgeKind, geometry: LineString<f64>) -> Self {
        EdgeData {
            kind,
            geometry,
            name: None,
            alerts: Vec::new(),
        }
    }

    pub fn street(
        length: f64,
        permission: TraverseModeSet,
        geometry: LineString<f64>,
    ) -> Self {
        EdgeData::new(
            EdgeKind::Street(StreetEdge { length, permission }),
            geometry,
        )
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.name = Some(Arc::from(name));
        self
    }

    pub fn with_alert(mut self, alert: &str) -> Self {
        self.alerts.push(Arc::from(alert));
        self
    }

    pub fn is_street(&self) -> bool {
        matches!(self.kind, EdgeKind::Street(_))
    }

    /// Whether traversing this edge means being on board a vehicle
    pub fn is_onboard(&self) -> bool {
        matches!(self.kind, EdgeKind::Hop(_) | EdgeKind::InterlineDwell(_))
    }

    pub fn is_pedestrian_traversable(&self) -> bool {
        match &self.kind {
            EdgeKind::Street(street) => {
                street.permission.contains(TraverseMode::Walk)
            }
            _ => false,
        }
    }

    pub fn length(&self) -> f64 {
        match &self.kind {
            EdgeKind::Street(street) => street.length,
            _ => 0.0,
        }
    }

    /// The direction shown to a traveller who is riding the provided trip
    /// along this edge. Edges which are not part of a trip have no headsign
    pub fn headsign_for(&self, trip: &TripTimes) -> Option<Arc<str>> {
        match &self.kind {
            EdgeKind::Hop(hop) => trip.headsign(hop.stop_index),
            EdgeKind::BoardAlight(board) if board.boarding => {
                trip.headsign(board.stop_index)
            }
            EdgeKind::InterlineDwell(dwell) => dwell.to_trip.headsign(0),
            _ => None,
        }
    }
}

impl fmt::Display for EdgeData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match &self.kind {
            EdgeKind::Street(_) => "Street",
            EdgeKind::BoardAlight(board) if board.boarding => "Board",
            EdgeKind::BoardAlight(_) => "Alight",
            EdgeKind::Hop(_) => "Hop",
            EdgeKind::InterlineDwell(_) => "InterlineDwell",
            EdgeKind::BikeRental(rental) if rental.pickup => "RentBike",
            EdgeKind::BikeRental(_) => "DropOffBike",
            EdgeKind::ParkAndRide => "ParkAndRide",
        };
        match &self.name {
            Some(name) => write!(f, "{label}({name})"),
            None => write!(f, "{label}"),
        }
    }
}

#[cfg(test)]
mod tests {

    use super::*;

    /// Generate a pattern with two trips over three stops
    fn get_test_pattern() -> TripPattern {
        let early = TripTimes::new(
            "early",
            "route",
            vec![100, 200, 300],
            vec![110, 210, 310],
        );
        let late = TripTimes::new(
            "late",
            "route",
            vec![400, 500, 600],
            vec![410, 510, 610],
        )
        .with_headsign("Late Town");

        // Deliberately out of order, pattern should sort them
        TripPattern::new("pattern", "route", vec![late, early])
    }

    mod test_modes {

        use super::*;

        #[test]
        fn test_from_list() {
            let result = TraverseModeSet::from_list("walk, bike,unknown");

            assert!(result.contains(TraverseMode::Walk));
            assert!(result.contains(TraverseMode::Bicycle));
            assert!(!result.contains(TraverseMode::Car));
            assert!(!result.contains(TraverseMode::Transit));
        }

        #[test]
        fn test_primary_street_mode() {
            let walk_only = TraverseModeSet::empty().with(TraverseMode::Walk);
            let with_car = walk_only.with(TraverseMode::Car);

            assert_eq!(walk_only.primary_street_mode(), TraverseMode::Walk);
            assert_eq!(with_car.primary_street_mode(), TraverseMode::Car);
            assert_eq!(
                with_car.without(TraverseMode::Car).primary_street_mode(),
                TraverseMode::Walk
            );
        }

        #[test]
        fn test_empty() {
            assert!(TraverseModeSet::empty().is_empty());
            assert!(!TraverseModeSet::street().is_empty());
            assert!(
                !TraverseModeSet::street().contains(TraverseMode::Transit)
            );
        }
    }

    mod test_pattern {

        use super::*;

        /// Trips should be sorted by their first departure on creation
        #[test]
        fn test_sorted() {
            let pattern = get_test_pattern();

            assert_eq!(&*pattern.trips[0].trip_id, "early");
            assert_eq!(&*pattern.trips[1].trip_id, "late");
            assert_eq!(pattern.num_stops(), 3);
        }

        #[test]
        fn test_next_departure() {
            let pattern = get_test_pattern();

            let exact = pattern.next_departure(1, 210);
            let later = pattern.next_departure(1, 211);
            let none = pattern.next_departure(1, 511);

            assert_eq!(exact.map(|(dep, _)| dep), Some(210));
            assert_eq!(later.map(|(_, trip)| &*trip.trip_id), Some("late"));
            assert!(none.is_none());
        }

        #[test]
        fn test_previous_arrival() {
            let pattern = get_test_pattern();

            let result = pattern.previous_arrival(2, 599);
            let latest = pattern.previous_arrival(2, 600);

            assert_eq!(result.map(|(arr, _)| arr), Some(300));
            assert_eq!(latest.map(|(_, trip)| &*trip.trip_id), Some("late"));
            assert!(pattern.previous_arrival(2, 299).is_none());
        }

        #[test]
        fn test_departures_from_ordering() {
            let pattern = get_test_pattern();

            let result: Vec<i64> = pattern
                .departures_from(0, 0)
                .into_iter()
                .map(|(dep, _)| dep)
                .collect();

            assert_eq!(result, vec![110, 410]);
        }
    }

    mod test_edge_data {

        use super::*;

        #[test]
        fn test_headsign_for_hop() {
            let pattern = Arc::new(get_test_pattern());
            let hop = EdgeData::new(
                EdgeKind::Hop(HopEdge {
                    pattern: pattern.clone(),
                    stop_index: 0,
                }),
                LineString::new(vec![]),
            );
            let street = EdgeData::street(
                1.0,
                TraverseModeSet::street(),
                LineString::new(vec![]),
            );

            let late = &pattern.trips[1];

            assert_eq!(hop.headsign_for(late).as_deref(), Some("Late Town"));
            assert!(street.headsign_for(late).is_none());
            assert!(hop.is_onboard());
            assert!(!street.is_onboard());
        }

        #[test]
        fn test_pedestrian_traversable() {
            let footway = EdgeData::street(
                1.0,
                TraverseModeSet::empty().with(TraverseMode::Walk),
                LineString::new(vec![]),
            );
            let motorway = EdgeData::street(
                1.0,
                TraverseModeSet::empty().with(TraverseMode::Car),
                LineString::new(vec![]),
            );
            let rental = EdgeData::new(
                EdgeKind::BikeRental(BikeRentalEdge { pickup: true }),
                LineString::new(vec![]),
            );

            assert!(footway.is_pedestrian_traversable());
            assert!(!motorway.is_pedestrian_traversable());
            assert!(!rental.is_pedestrian_traversable());
        }

        #[test]
        fn test_display() {
            let street = EdgeData::street(
                1.0,
                TraverseModeSet::street(),
                LineString::new(vec![]),
            )
            .with_name("High Street");

            assert_eq!(street.to_string(), "Street(High Street)");
        }
    }
}
