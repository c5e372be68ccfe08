//! Defines a struct to represent a bounding box, which is used to represent
//! a 2d square(ish) on the planet's surface. Bounding boxes are used as the
//! envelopes of edges in the spatial index, and as the search area when
//! snapping a free coordinate onto the graph.

use geo::{BoundingRect, LineString, Point};
use rstar::AABB;

/// A bounding box for geographical data. Contains the minimum and maximum
/// latitudes & longitudes, defining a 'rectangle' on the surface of the Earth
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BBox {
    pub min_lat: f64,
    pub min_lon: f64,
    pub max_lat: f64,
    pub max_lon: f64,
}

impl BBox {
    /// Create a bounding box centred on the provided point. Extents are
    /// provided in degrees, and are applied on either side of the centre
    pub fn around(centre: &Point, lon_extent: f64, lat_extent: f64) -> Self {
        BBox {
            min_lat: centre.y() - lat_extent,
            min_lon: centre.x() - lon_extent,
            max_lat: centre.y() + lat_extent,
            max_lon: centre.x() + lon_extent,
        }
    }

    /// Generate the smallest bounding box which contains every coordinate
    /// of the provided line. Empty lines have no bounding box
    pub fn from_line(line: &LineString<f64>) -> Option<Self> {
        line.bounding_rect().map(|rect| BBox {
            min_lat: rect.min().y,
            min_lon: rect.min().x,
            max_lat: rect.max().y,
            max_lon: rect.max().x,
        })
    }

    /// Convert into an envelope which can be used with the spatial index.
    /// Coordinates are stored as [lon, lat]
    pub fn to_envelope(&self) -> AABB<[f64; 2]> {
        AABB::from_corners(
            [self.min_lon, self.min_lat],
            [self.max_lon, self.max_lat],
        )
    }
}
