/* Simulate an NFA by tracking the set of states it can be in, following
 * epsilon closures after every consumed symbol. */

use bitvec::prelude::*;
use color_eyre::eyre::Result;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};

use crate::fa::{Symbol, FA};
use crate::nfa::NFA;

/// Outcome of running one input string through an automaton.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestResult {
    accepted: bool,
    path: Vec<usize>,
}

impl TestResult {
    pub fn is_accepted(&self) -> bool {
        self.accepted
    }

    /// Every state id reached, step by step, including the epsilon closures.
    pub fn get_path(&self) -> &[usize] {
        &self.path
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

pub struct Simulator<'a> {
    nfa: &'a NFA,
    /// Maps a state id to its position in the state list.
    index: HashMap<usize, usize>,
    /// Outgoing edges per state position, in transition order.
    edges: Vec<Vec<(Symbol, usize)>>,
}

impl<'a> Simulator<'a> {
    pub fn new(nfa: &'a NFA) -> Self {
        let index: HashMap<usize, usize> = nfa
            .get_states()
            .iter()
            .enumerate()
            .map(|(pos, state)| (state.get_id(), pos))
            .collect();

        let mut edges = vec![Vec::new(); nfa.get_num_states()];

        for transition in nfa.get_transitions() {
            if let (Some(&from), Some(&to)) =
                (index.get(&transition.get_from()), index.get(&transition.get_to()))
            {
                edges[from].push((transition.get_symbol(), to));
            }
        }

        Simulator { nfa, index, edges }
    }

    fn state_id(&self, pos: usize) -> usize {
        self.nfa.get_states()[pos].get_id()
    }

    /// Epsilon closure of a set of state ids, in discovery order. Unknown ids are ignored.
    pub fn get_epsilon_closure(&self, state_ids: &[usize]) -> Vec<usize> {
        let positions: Vec<usize> = state_ids
            .iter()
            .filter_map(|id| self.index.get(id).copied())
            .collect();

        self.closure(&positions)
            .into_iter()
            .map(|pos| self.state_id(pos))
            .collect()
    }

    // Breadth-first reachability over epsilon edges, on state positions
    fn closure(&self, states: &[usize]) -> Vec<usize> {
        let mut visited: BitVec<u8, Lsb0> = BitVec::repeat(false, self.edges.len());
        let mut closure = Vec::new();
        let mut work_list: VecDeque<usize> = VecDeque::new();

        for &state in states {
            if !visited[state] {
                visited.set(state, true);
                work_list.push_back(state);
            }
        }

        while let Some(state) = work_list.pop_front() {
            closure.push(state);

            for (symbol, target) in &self.edges[state] {
                if symbol.is_epsilon() && !visited[*target] {
                    visited.set(*target, true);
                    work_list.push_back(*target);
                }
            }
        }

        closure
    }

    // The set of positions reachable via character c from the set q
    fn delta(&self, q: &[usize], c: char) -> Vec<usize> {
        let mut seen: BitVec<u8, Lsb0> = BitVec::repeat(false, self.edges.len());
        let mut result = Vec::new();

        for &state in q {
            for (symbol, target) in &self.edges[state] {
                if *symbol == Symbol::Char(c) && !seen[*target] {
                    seen.set(*target, true);
                    result.push(*target);
                }
            }
        }

        result
    }

    pub fn run(&self, input: &str) -> TestResult {
        let start = match self.index.get(&self.nfa.get_start_state()) {
            Some(&start) => start,
            None => {
                return TestResult {
                    accepted: false,
                    path: Vec::new(),
                }
            }
        };

        let mut current = self.closure(&[start]);
        let mut path: Vec<usize> = current.iter().map(|&pos| self.state_id(pos)).collect();

        for (step, c) in input.chars().enumerate() {
            let moved = self.delta(&current, c);
            let next = self.closure(&moved);

            if next.is_empty() {
                log::debug!(
                    "Dead end on {:?} at position {} while matching {:?}",
                    c,
                    step,
                    input
                );
                return TestResult {
                    accepted: false,
                    path,
                };
            }

            log::trace!("Consumed {:?}: {} active states", c, next.len());

            path.extend(next.iter().map(|&pos| self.state_id(pos)));
            current = next;
        }

        let accepted = current
            .iter()
            .any(|&pos| self.nfa.is_accept_state(self.state_id(pos)));

        TestResult { accepted, path }
    }
}

/// Run input through the automaton and report acceptance together with the visited states.
pub fn test_string(nfa: &NFA, input: &str) -> TestResult {
    Simulator::new(nfa).run(input)
}
