//! Snaps free coordinates (such as the start and end points of a search) onto
//! the nearest walkable street. The result is a Sample, which records the two
//! vertices at either end of the matched edge along with the time it takes to
//! walk from the coordinate to each of them.

use crate::common::bbox::BBox;
use crate::common::graph::RoutingGraph;
use geo::{Coord, Distance, Haversine, Point};
use petgraph::graph::{EdgeIndex, NodeIndex};
use serde::Serialize;
use std::f64::consts::PI;
use thiserror::Error;

pub const DEFAULT_SEARCH_RADIUS_M: f64 = 200.0;

/// Walking speed used to convert the distance to each end of the matched
/// edge into a time, in metres per second
pub const SAMPLE_WALK_SPEED: f64 = 1.33;

const RADIUS_OF_EARTH_M: f64 = 6_371_010.0;

/// Convert a distance on the surface of the earth into degrees of latitude
pub fn meters_to_degrees(meters: f64) -> f64 {
    meters / (PI / 180.0 * RADIUS_OF_EARTH_M)
}

/// A coordinate which has been matched onto a street. `t0` and `t1` are the
/// seconds needed to reach `v0` and `v1` respectively
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Sample {
    pub v0: NodeIndex,
    pub t0: i64,
    pub v1: NodeIndex,
    pub t1: i64,
}

impl Sample {
    /// Combine the sample with the times at which each vertex was reached by
    /// a search, returning the earliest time at which the sampled
    /// coordinate itself could be reached
    pub fn eval<F>(&self, times: F) -> Option<i64>
    where
        F: Fn(NodeIndex) -> Option<i64>,
    {
        let via_v0 = times(self.v0).map(|time| time + self.t0);
        let via_v1 = times(self.v1).map(|time| time + self.t1);
        match (via_v0, via_v1) {
            (Some(left), Some(right)) => Some(left.min(right)),
            (left, right) => left.or(right),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SampleError {
    #[error("no walkable street within {radius}m of ({lon}, {lat})")]
    NoMatch { lon: f64, lat: f64, radius: f64 },
}

/// The closest point found so far
#[derive(Debug, Clone, Copy)]
struct Candidate {
    edge: EdgeIndex,
    segment: usize,
    projected: Coord,
    dist2: f64,
}

/// The position along a segment which is closest to the query point, as a
/// fraction of the segment's length. Longitudes are scaled by `xscale` so
/// that both axes are in comparable units
fn segment_fraction(
    start: Coord,
    end: Coord,
    point: Coord,
    xscale: f64,
) -> f64 {
    let dx = (end.x - start.x) * xscale;
    let dy = end.y - start.y;
    let length2 = dx * dx + dy * dy;
    if length2 == 0.0 {
        return 0.0;
    }
    let px = (point.x - start.x) * xscale;
    let py = point.y - start.y;
    ((px * dx + py * dy) / length2).clamp(0.0, 1.0)
}

fn scaled_distance2(left: Coord, right: Coord, xscale: f64) -> f64 {
    let dx = (left.x - right.x) * xscale;
    let dy = left.y - right.y;
    dx * dx + dy * dy
}

fn haversine(left: Coord, right: Coord) -> f64 {
    Haversine::distance(Point::from(left), Point::from(right))
}

/// Distance from the start of the line to a point on the provided segment
fn distance_along(coords: &[Coord], segment: usize, point: Coord) -> f64 {
    let before: f64 = coords[..=segment]
        .windows(2)
        .map(|pair| haversine(pair[0], pair[1]))
        .sum();
    before + haversine(coords[segment], point)
}

/// Distance from a point on the provided segment to the end of the line
fn distance_to_end(coords: &[Coord], segment: usize, point: Coord) -> f64 {
    let after: f64 = coords[segment + 1..]
        .windows(2)
        .map(|pair| haversine(pair[0], pair[1]))
        .sum();
    haversine(point, coords[segment + 1]) + after
}

pub struct SampleFactory<'g> {
    graph: &'g RoutingGraph,
    search_radius_m: f64,
    search_radius_deg: f64,
}

impl<'g> SampleFactory<'g> {
    pub fn new(graph: &'g RoutingGraph) -> Self {
        SampleFactory {
            graph,
            search_radius_m: DEFAULT_SEARCH_RADIUS_M,
            search_radius_deg: meters_to_degrees(DEFAULT_SEARCH_RADIUS_M),
        }
    }

    pub fn set_search_radius(&mut self, meters: f64) {
        self.search_radius_m = meters;
        self.search_radius_deg = meters_to_degrees(meters);
    }

    pub fn search_radius(&self) -> f64 {
        self.search_radius_m
    }

    /// Find the closest point on any walkable street, using a flat
    /// approximation of the earth which is good enough to rank candidates
    fn find_closest(&self, point: Coord, xscale: f64) -> Option<Candidate> {
        let bbox = BBox::around(
            &Point::from(point),
            self.search_radius_deg / xscale,
            self.search_radius_deg,
        );

        let mut best: Option<Candidate> = None;
        for edge in self.graph.edges_near(&bbox) {
            let Some(data) = self.graph.edge(edge) else {
                continue;
            };
            for (segment, pair) in data.geometry.0.windows(2).enumerate() {
                let (start, end) = (pair[0], pair[1]);
                let frac = segment_fraction(start, end, point, xscale);
                let projected = Coord {
                    x: start.x + frac * (end.x - start.x),
                    y: start.y + frac * (end.y - start.y),
                };
                let dist2 = scaled_distance2(projected, point, xscale);
                // Ties go to whichever edge the index returned first
                if best.is_none_or(|current| dist2 < current.dist2) {
                    best = Some(Candidate {
                        edge,
                        segment,
                        projected,
                        dist2,
                    });
                }
            }
        }
        best
    }

    /// Snap a coordinate onto the closest walkable street. Returns None if
    /// nothing is within the search radius
    pub fn get_sample(&self, lon: f64, lat: f64) -> Option<Sample> {
        let point = Coord { x: lon, y: lat };
        let xscale = lat.to_radians().cos();

        let best = self.find_closest(point, xscale)?;
        let (v0, v1) = self.graph.endpoints(best.edge)?;
        let coords = &self.graph.edge(best.edge)?.geometry.0;

        let distance = haversine(best.projected, point);
        if distance > self.search_radius_m {
            return None;
        }

        let along = distance_along(coords, best.segment, best.projected);
        let to_end = distance_to_end(coords, best.segment, best.projected);

        Some(Sample {
            v0,
            t0: ((distance + along) / SAMPLE_WALK_SPEED).floor() as i64,
            v1,
            t1: ((distance + to_end) / SAMPLE_WALK_SPEED).floor() as i64,
        })
    }

    /// As get_sample, but treats a missing match as an error
    pub fn sample_endpoint(
        &self,
        lon: f64,
        lat: f64,
    ) -> Result<Sample, SampleError> {
        self.get_sample(lon, lat).ok_or(SampleError::NoMatch {
            lon,
            lat,
            radius: self.search_radius_m,
        })
    }
}
