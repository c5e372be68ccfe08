//! Path parsers are small automata which are advanced every time an edge is
//! traversed. They allow structural rules to be applied to a path, such as
//! limiting the number of vehicles boarded, without the traversal code
//! needing to know anything about them. A state which has reached a dead
//! automaton position can never lead to an acceptable path.

use crate::common::graph_data::{EdgeData, EdgeKind};
use std::fmt;

/// Position of a single automaton
pub type AutomatonState = i32;

pub const START: AutomatonState = 0;
pub const REJECT: AutomatonState = -1;

/// The symbols an automaton is fed with, one per traversed edge
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Terminal {
    Street,
    Board,
    Ride,
    Alight,
    Rental,
    Park,
}

impl Terminal {
    pub const COUNT: usize = 6;

    pub fn for_edge(edge: &EdgeData) -> Terminal {
        match &edge.kind {
            EdgeKind::Street(_) => Terminal::Street,
            EdgeKind::BoardAlight(board) if board.boarding => Terminal::Board,
            EdgeKind::BoardAlight(_) => Terminal::Alight,
            EdgeKind::Hop(_) | EdgeKind::InterlineDwell(_) => Terminal::Ride,
            EdgeKind::BikeRental(_) => Terminal::Rental,
            EdgeKind::ParkAndRide => Terminal::Park,
        }
    }

    fn index(&self) -> usize {
        match self {
            Terminal::Street => 0,
            Terminal::Board => 1,
            Terminal::Ride => 2,
            Terminal::Alight => 3,
            Terminal::Rental => 4,
            Terminal::Park => 5,
        }
    }
}

/// A rule which decides whether a path is structurally acceptable
pub trait PathParser: fmt::Debug + Send + Sync {
    /// Move from one automaton position to the next
    fn transition(
        &self,
        state: AutomatonState,
        terminal: Terminal,
    ) -> AutomatonState;

    /// Whether a path may finish at the provided position
    fn accepts(&self, state: AutomatonState) -> bool;

    /// Whether any path can still be accepted from the provided position
    fn is_live(&self, state: AutomatonState) -> bool {
        state != REJECT
    }
}

/// A deterministic automaton defined by a transition table, with one row
/// per automaton position and one column per terminal
#[derive(Debug, Clone, PartialEq)]
pub struct TableParser {
    table: Vec<[AutomatonState; Terminal::COUNT]>,
    accepting: Vec<bool>,
}

impl TableParser {
    pub fn new(
        table: Vec<[AutomatonState; Terminal::COUNT]>,
        accepting: &[AutomatonState],
    ) -> Self {
        let mut accepting_mask = vec![false; table.len()];
        for state in accepting {
            if let Some(flag) = usize::try_from(*state)
                .ok()
                .and_then(|inx| accepting_mask.get_mut(inx))
            {
                *flag = true;
            }
        }
        TableParser {
            table,
            accepting: accepting_mask,
        }
    }

    /// Accept any path which boards at most `max_boardings` vehicles. Each
    /// automaton position counts the boardings made so far
    pub fn max_boardings(max_boardings: usize) -> Self {
        let mut table = Vec::with_capacity(max_boardings + 1);
        for boarded in 0..=max_boardings {
            let current = boarded as AutomatonState;
            let mut row = [current; Terminal::COUNT];
            row[Terminal::Board.index()] = if boarded == max_boardings {
                REJECT
            } else {
                current + 1
            };
            table.push(row);
        }
        let accepting: Vec<AutomatonState> =
            (0..=max_boardings as AutomatonState).collect();
        TableParser::new(table, &accepting)
    }
}

impl PathParser for TableParser {
    fn transition(
        &self,
        state: AutomatonState,
        terminal: Terminal,
    ) -> AutomatonState {
        usize::try_from(state)
            .ok()
            .and_then(|inx| self.table.get(inx))
            .map_or(REJECT, |row| row[terminal.index()])
    }

    fn accepts(&self, state: AutomatonState) -> bool {
        usize::try_from(state)
            .ok()
            .and_then(|inx| self.accepting.get(inx))
            .copied()
            .unwrap_or(false)
    }
}
