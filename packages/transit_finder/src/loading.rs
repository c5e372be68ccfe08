//! This module focuses on decoding OSM PBF extracts and using the decoded
//! ways and relations to generate a petgraph graph object.

pub mod osm_format;
pub mod pbf;
pub mod petgraph;
pub mod structs;
