//! Types which are shared across the package: the routing graph and the
//! data stored against it, user configuration and bounding boxes.

pub mod bbox;
pub mod config;
pub mod graph;
pub mod graph_data;
