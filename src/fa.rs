use color_eyre::eyre::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::path::Path;

/// The label of a transition. `Epsilon` transitions are taken without consuming input.
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Symbol {
    Epsilon,
    Char(char),
}

impl Symbol {
    pub fn is_epsilon(&self) -> bool {
        matches!(self, Symbol::Epsilon)
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Symbol::Epsilon => write!(f, "ε"),
            Symbol::Char(c) => write!(f, "{}", c),
        }
    }
}

pub trait FA {
    fn get_num_states(&self) -> usize;
    fn get_start_state(&self) -> usize;
    fn get_alphabet(&self) -> &BTreeSet<char>;
    fn get_acceptor_states(&self) -> &[usize];
    fn is_accept_state(&self, state_id: usize) -> bool {
        self.get_acceptor_states().contains(&state_id)
    }
    /// Graphviz description of the automaton.
    fn to_dot(&self) -> String;
    fn save_dot(&self, file_name: &Path) -> Result<()>;
}

#[cfg(test)]
mod fa_tests {
    use super::*;

    #[test]
    fn test_symbol_display() {
        assert_eq!(Symbol::Char('a').to_string(), "a");
        assert_eq!(Symbol::Epsilon.to_string(), "ε");
        assert!(Symbol::Epsilon.is_epsilon());
        assert!(!Symbol::Char('x').is_epsilon());
    }
}
