//! Traversal of a single edge. Each edge kind has its own rules for whether
//! it can be used from a given state, and what it costs to do so. A traversal
//! produces zero, one or a few child states. An empty result means that the
//! edge can't be used, which is not an error.
//!
//! Every rule is written for both search directions. In arrive-by searches
//! edges are walked from target to source, so boarding a vehicle mirrors
//! alighting from it, and picking up a bike mirrors dropping it off.

use crate::common::graph::RoutingGraph;
use crate::common::graph_data::{
    BikeRentalEdge, BoardAlightEdge, EdgeData, EdgeKind, HopEdge,
    InterlineDwellEdge, StreetEdge, TraverseMode,
};
use crate::routing::state::{State, StateError};
use petgraph::graph::EdgeIndex;
use std::sync::Arc;

impl RoutingGraph {
    /// Traverse `edge` from `state`, returning every state which can be
    /// reached. Edges which aren't in the graph can't be traversed
    pub fn traverse(
        &self,
        edge: EdgeIndex,
        state: &Arc<State>,
    ) -> Result<Vec<State>, StateError> {
        let Some(data) = self.edge(edge) else {
            return Ok(Vec::new());
        };
        match &data.kind {
            EdgeKind::Street(street) => {
                self.traverse_street(edge, data, street, state)
            }
            EdgeKind::BoardAlight(board) => {
                self.traverse_board_alight(edge, data, board, state, None)
            }
            EdgeKind::Hop(hop) => self.traverse_hop(edge, data, hop, state),
            EdgeKind::InterlineDwell(dwell) => {
                self.traverse_interline(edge, dwell, state)
            }
            EdgeKind::BikeRental(rental) => {
                self.traverse_bike_rental(edge, rental, state)
            }
            EdgeKind::ParkAndRide => self.traverse_park_and_ride(edge, state),
        }
    }

    /// Traverse a board/alight edge in the direction which leaves the
    /// vehicle, waiting at the stop until `arrival`. This is used when
    /// reversing a path, so that the wait before the first boarding is
    /// preserved and recorded as the initial wait. Any other edge is
    /// traversed as normal
    pub fn traverse_board_alight_with_arrival(
        &self,
        edge: EdgeIndex,
        state: &Arc<State>,
        arrival: i64,
    ) -> Result<Vec<State>, StateError> {
        match self.edge(edge).map(|data| (data, &data.kind)) {
            Some((data, EdgeKind::BoardAlight(board))) => self
                .traverse_board_alight(edge, data, board, state, Some(arrival)),
            _ => self.traverse(edge, state),
        }
    }

    // Streets ----------------------------------------------------------------

    fn traverse_street(
        &self,
        edge: EdgeIndex,
        data: &EdgeData,
        street: &StreetEdge,
        state: &Arc<State>,
    ) -> Result<Vec<State>, StateError> {
        let config = state.config();
        let mode = state.non_transit_mode();
        let mut results = Vec::new();

        // Cyclists can push their bike along footways
        let walking_bike = mode == TraverseMode::Bicycle
            && !street.permission.contains(TraverseMode::Bicycle)
            && street.permission.contains(TraverseMode::Walk);

        if street.permission.contains(mode) || walking_bike {
            let (speed, reluctance) = match mode {
                TraverseMode::Bicycle if !walking_bike => {
                    (config.bike_speed, 1.0)
                }
                TraverseMode::Car => (config.car_speed, 1.0),
                _ => (config.walk_speed, config.walk_reluctance),
            };
            let seconds = (street.length / speed).ceil() as i64;

            let mut builder = state.edit(self, edge);
            builder.increment_time(seconds);
            builder.increment_weight(seconds as f64 * reluctance);
            builder.increment_walk_distance(street.length);
            builder.set_back_mode(if walking_bike {
                TraverseMode::Walk
            } else {
                mode
            });
            builder.set_back_walking_bike(walking_bike);
            builder.add_alerts(&data.alerts);
            if mode == TraverseMode::Car && config.uses_car_to_transit() {
                builder.increment_pre_transit_time(seconds);
            }
            results.push(builder.build()?);
        }

        if config.kiss_and_ride {
            if let Some(child) =
                self.traverse_kiss_and_ride(edge, data, street, state)?
            {
                results.push(child);
            }
        }

        Ok(results)
    }

    /// The alternative to carrying on in the car. Depart-at searches are
    /// dropped off and walk this edge, arrive-by searches are picked up and
    /// drive it
    fn traverse_kiss_and_ride(
        &self,
        edge: EdgeIndex,
        data: &EdgeData,
        street: &StreetEdge,
        state: &Arc<State>,
    ) -> Result<Option<State>, StateError> {
        let config = state.config();
        let mode = state.non_transit_mode();

        let dropping_off = !config.arrive_by
            && mode == TraverseMode::Car
            && !state.is_car_parked()
            && street.permission.contains(TraverseMode::Walk);
        let picking_up = config.arrive_by
            && mode == TraverseMode::Walk
            && state.is_car_parked()
            && street.permission.contains(TraverseMode::Car);

        if !(dropping_off || picking_up) {
            return Ok(None);
        }

        let mut builder = state.edit(self, edge);
        builder.increment_walk_distance(street.length);
        builder.add_alerts(&data.alerts);
        if dropping_off {
            let seconds = (street.length / config.walk_speed).ceil() as i64;
            builder.increment_time(seconds + config.car_dropoff_time);
            builder.increment_weight(
                seconds as f64 * config.walk_reluctance
                    + config.car_dropoff_time as f64,
            );
            builder.set_car_parked(true);
            builder.set_non_transit_mode(TraverseMode::Walk);
            builder.set_back_mode(TraverseMode::Walk);
        } else {
            let seconds = (street.length / config.car_speed).ceil() as i64;
            builder.increment_time(seconds + config.car_dropoff_time);
            builder.increment_weight(
                seconds as f64 + config.car_dropoff_time as f64,
            );
            builder.increment_pre_transit_time(seconds);
            builder.set_car_parked(false);
            builder.set_non_transit_mode(TraverseMode::Car);
            builder.set_back_mode(TraverseMode::Car);
        }
        builder.build().map(Some)
    }

    // Transit ----------------------------------------------------------------

    fn traverse_board_alight(
        &self,
        edge: EdgeIndex,
        data: &EdgeData,
        board: &BoardAlightEdge,
        state: &Arc<State>,
        arrival: Option<i64>,
    ) -> Result<Vec<State>, StateError> {
        let config = state.config();
        if !config.modes.contains(TraverseMode::Transit) {
            return Ok(Vec::new());
        }

        // Boarding in a depart-at search, or alighting in an arrive-by one,
        // puts the traveller on a vehicle
        if board.boarding != config.arrive_by {
            self.get_on_vehicle(edge, data, board, state)
        } else {
            self.get_off_vehicle(edge, data, board, state, arrival)
        }
    }

    fn get_on_vehicle(
        &self,
        edge: EdgeIndex,
        data: &EdgeData,
        board: &BoardAlightEdge,
        state: &Arc<State>,
    ) -> Result<Vec<State>, StateError> {
        let config = state.config();
        if state.is_onboard() || state.is_bike_renting() {
            return Ok(Vec::new());
        }
        if config.uses_car_to_transit() && !state.is_car_parked() {
            return Ok(Vec::new());
        }

        let service_day = state.service_day();
        let now = service_day.seconds_since_midnight(state.time());
        let options = if config.arrive_by {
            board.pattern.arrivals_until(board.stop_index, now)
        } else {
            board.pattern.departures_from(board.stop_index, now)
        };

        let first_boarding = state.num_boardings() == 0;
        let mut results = Vec::new();
        for (scheduled, trip) in
            options.into_iter().take(config.max_departure_options)
        {
            let wait = (scheduled - now).abs();

            let mut builder = state.edit(self, edge);
            builder.increment_time(wait);
            if first_boarding {
                builder.set_initial_wait_time(wait);
                builder.increment_weight(
                    wait as f64 * config.wait_at_beginning_factor
                        + config.board_cost,
                );
            } else {
                builder.increment_weight(
                    wait as f64 * config.wait_reluctance + config.board_cost,
                );
            }
            builder.set_trip_times(Some(Arc::clone(trip)));
            builder.set_route(Some(Arc::clone(&trip.route_id)));
            builder.push_route(Arc::clone(&trip.route_id));
            builder.set_last_pattern(Some(Arc::clone(&board.pattern)));
            builder.increment_num_boardings();
            builder.set_ever_boarded(true);
            builder.set_back_mode(TraverseMode::Transit);
            builder.add_alerts(&data.alerts);
            results.push(builder.build()?);
        }
        Ok(results)
    }

    fn get_off_vehicle(
        &self,
        edge: EdgeIndex,
        data: &EdgeData,
        board: &BoardAlightEdge,
        state: &Arc<State>,
        arrival: Option<i64>,
    ) -> Result<Vec<State>, StateError> {
        let Some(trip) = state.trip_times() else {
            return Ok(Vec::new());
        };
        if trip.num_stops() <= board.stop_index {
            return Ok(Vec::new());
        }

        let mut builder = state.edit(self, edge);
        if let Some(arrival) = arrival {
            let wait = (state.time() - arrival).abs();
            builder.increment_time(wait);
            builder.increment_weight(
                wait as f64 * state.config().wait_at_beginning_factor,
            );
            builder.set_initial_wait_time(wait);
        }
        builder.set_trip_times(None);
        builder.set_last_alighted_time(state.time());
        builder.set_last_transit_walk(state.walk_distance());
        builder.set_back_mode(TraverseMode::Transit);
        builder.add_alerts(&data.alerts);
        Ok(vec![builder.build()?])
    }

    /// Ride from one stop to the next. The clock is set from the trip's
    /// schedule, so any dwell at the stop is included
    fn traverse_hop(
        &self,
        edge: EdgeIndex,
        data: &EdgeData,
        hop: &HopEdge,
        state: &Arc<State>,
    ) -> Result<Vec<State>, StateError> {
        let Some(trip) = state.trip_times() else {
            return Ok(Vec::new());
        };
        let arrive_by = state.config().arrive_by;
        let service_day = state.service_day();
        let now = service_day.seconds_since_midnight(state.time());

        let scheduled = if arrive_by {
            trip.departure(hop.stop_index)
        } else {
            trip.arrival(hop.stop_index + 1)
        };
        let Some(scheduled) = scheduled else {
            return Ok(Vec::new());
        };
        let ride = if arrive_by {
            now - scheduled
        } else {
            scheduled - now
        };
        if ride < 0 {
            return Ok(Vec::new());
        }

        let mut builder = state.edit(self, edge);
        builder.increment_time(ride);
        builder.increment_weight(ride as f64);
        builder.set_back_mode(TraverseMode::Transit);
        builder.add_alerts(&data.alerts);
        Ok(vec![builder.build()?])
    }

    /// Stay on board while the vehicle continues as another trip. Only the
    /// trip which the edge was built for can use it
    fn traverse_interline(
        &self,
        edge: EdgeIndex,
        dwell: &InterlineDwellEdge,
        state: &Arc<State>,
    ) -> Result<Vec<State>, StateError> {
        let Some(trip) = state.trip_times() else {
            return Ok(Vec::new());
        };
        let arrive_by = state.config().arrive_by;
        let (current, next) = if arrive_by {
            (&dwell.to_trip, &dwell.from_trip)
        } else {
            (&dwell.from_trip, &dwell.to_trip)
        };
        if trip.trip_id != current.trip_id {
            return Ok(Vec::new());
        }

        let service_day = state.service_day();
        let now = service_day.seconds_since_midnight(state.time());
        let scheduled = if arrive_by {
            next.arrivals.last().copied()
        } else {
            next.departure(0)
        };
        let Some(scheduled) = scheduled else {
            return Ok(Vec::new());
        };
        let dwell_time = (scheduled - now).abs();

        let mut builder = state.edit(self, edge);
        builder.increment_time(dwell_time);
        builder.increment_weight(dwell_time as f64);
        builder.set_trip_times(Some(Arc::clone(next)));
        builder.set_route(Some(Arc::clone(&next.route_id)));
        builder.set_back_mode(TraverseMode::Transit);
        Ok(vec![builder.build()?])
    }

    // Bikes & cars -----------------------------------------------------------

    fn traverse_bike_rental(
        &self,
        edge: EdgeIndex,
        rental: &BikeRentalEdge,
        state: &Arc<State>,
    ) -> Result<Vec<State>, StateError> {
        let config = state.config();
        if !config.modes.contains(TraverseMode::Bicycle) {
            return Ok(Vec::new());
        }

        // Picking up in a depart-at search, or dropping off in an arrive-by
        // one, means the traveller is on a bike afterwards
        let acquiring = rental.pickup != config.arrive_by;
        if acquiring == state.is_bike_renting() {
            return Ok(Vec::new());
        }
        if acquiring && state.non_transit_mode() != TraverseMode::Walk {
            return Ok(Vec::new());
        }

        let (seconds, cost) = if rental.pickup {
            (config.bike_rental_pickup_time, config.bike_rental_pickup_cost)
        } else {
            (
                config.bike_rental_dropoff_time,
                config.bike_rental_dropoff_time as f64,
            )
        };

        let mut builder = state.edit(self, edge);
        builder.increment_time(seconds);
        builder.increment_weight(cost);
        builder.set_bike_renting(acquiring);
        builder.set_non_transit_mode(if acquiring {
            TraverseMode::Bicycle
        } else {
            TraverseMode::Walk
        });
        builder.set_back_mode(TraverseMode::Walk);
        Ok(vec![builder.build()?])
    }

    fn traverse_park_and_ride(
        &self,
        edge: EdgeIndex,
        state: &Arc<State>,
    ) -> Result<Vec<State>, StateError> {
        let config = state.config();
        if !config.park_and_ride {
            return Ok(Vec::new());
        }

        // Depart-at searches leave the car here, arrive-by searches collect
        // it
        let parking = !config.arrive_by;
        let allowed = if parking {
            state.non_transit_mode() == TraverseMode::Car
                && !state.is_car_parked()
        } else {
            state.is_car_parked()
        };
        if !allowed {
            return Ok(Vec::new());
        }

        let mut builder = state.edit(self, edge);
        builder.increment_time(config.car_dropoff_time);
        builder.increment_weight(config.car_dropoff_time as f64);
        builder.set_car_parked(parking);
        builder.set_non_transit_mode(if parking {
            TraverseMode::Walk
        } else {
            TraverseMode::Car
        });
        builder.set_back_mode(TraverseMode::Walk);
        Ok(vec![builder.build()?])
    }
}
