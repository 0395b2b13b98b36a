//! # thompviz
//!
//! A regular expression to automaton compiler and NFA simulator, meant to feed a visualizer
//! with the automaton and the states visited while testing a string.
//!
//! This library provides functionality to:
//! - Tokenize regular expressions over `|`, `*`, grouping and implicit concatenation
//! - Convert them to postfix form with the shunting-yard algorithm
//! - Convert the postfix form to an NFA using Thompson Construction
//! - Simulate the NFA on an input string, recording every state visited
//! - Export the automaton as JSON or Graphviz DOT

// Re-export the modules
pub mod fa;
pub mod nfa;
pub mod reg_ex;
pub mod simulator;

// Re-export commonly used functions for convenience
pub use fa::{Symbol, FA};
pub use nfa::{build_nfa, NFAError, NFA};
pub use reg_ex::{parse_regex, RegExError};
pub use simulator::{test_string, TestResult};
