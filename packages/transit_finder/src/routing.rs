//! The search machinery. States record progress along a path, edges are
//! traversed to produce new states, and completed paths can be reversed to
//! remove unnecessary waiting.

pub mod expand;
pub mod parser;
pub mod reverse;
pub mod sample;
pub mod state;
pub mod traverse;
pub mod turns;

#[cfg(test)]
pub(crate) mod test_support;
