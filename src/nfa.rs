use color_eyre::eyre::{Report, Result};
use petgraph::dot::Dot;
use petgraph::graph::DiGraph;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;
use std::fs::File;
use std::io::Write;
use std::path::Path;

use crate::fa::{Symbol, FA};
use crate::reg_ex::{parse_regex, Token};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NFAState {
    id: usize,
    label: String,
    is_start: bool,
    is_accept: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transition {
    id: usize,
    from: usize,
    to: usize,
    symbol: Symbol,
}

/// An automaton produced by Thompson Construction. Also used for the intermediate fragments.
/// Deserializing goes through `check_invariants`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "RawNFA")]
pub struct NFA {
    states: Vec<NFAState>,
    transitions: Vec<Transition>,
    start_state: usize,
    accept_states: Vec<usize>,
    alphabet: BTreeSet<char>,
    regex: String,
}

// Unchecked wire form of an NFA
#[derive(Deserialize)]
struct RawNFA {
    states: Vec<NFAState>,
    transitions: Vec<Transition>,
    start_state: usize,
    accept_states: Vec<usize>,
    alphabet: BTreeSet<char>,
    regex: String,
}

impl TryFrom<RawNFA> for NFA {
    type Error = NFAError;

    fn try_from(raw: RawNFA) -> Result<Self, Self::Error> {
        let nfa = NFA {
            states: raw.states,
            transitions: raw.transitions,
            start_state: raw.start_state,
            accept_states: raw.accept_states,
            alphabet: raw.alphabet,
            regex: raw.regex,
        };
        nfa.check_invariants()?;
        Ok(nfa)
    }
}

#[derive(Debug)]
pub enum NFAError {
    OperandStackUnderflow(Token),
    LeftoverFragments(usize),
    UnexpectedToken(Token),
    InconsistentAutomaton(String),
}

impl fmt::Display for NFAError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NFAError::OperandStackUnderflow(token) => {
                write!(f, "Error: Operator {} is missing an operand!", token)
            }
            NFAError::LeftoverFragments(count) => write!(
                f,
                "Error: Construction finished with {} fragments instead of one!",
                count
            ),
            NFAError::UnexpectedToken(token) => {
                write!(f, "Error: Unexpected token {} in postfix expression!", token)
            }
            NFAError::InconsistentAutomaton(reason) => {
                write!(f, "Error: Inconsistent automaton: {}", reason)
            }
        }
    }
}

impl std::error::Error for NFAError {}

impl FA for NFA {
    fn get_num_states(&self) -> usize {
        self.states.len()
    }

    fn get_start_state(&self) -> usize {
        self.start_state
    }

    fn get_alphabet(&self) -> &BTreeSet<char> {
        &self.alphabet
    }

    fn get_acceptor_states(&self) -> &[usize] {
        &self.accept_states
    }

    fn to_dot(&self) -> String {
        let mut graph = DiGraph::new();
        let mut node_map = HashMap::new();

        // Add nodes
        for state in &self.states {
            let label = match (state.is_start, state.is_accept) {
                (true, true) => format!("Start\nAccept\n{}", state.label),
                (true, false) => format!("Start\n{}", state.label),
                (false, true) => format!("Accept\n{}", state.label),
                (false, false) => state.label.clone(),
            };
            let node = graph.add_node(label);
            node_map.insert(state.id, node);
        }

        // Add edges
        for transition in &self.transitions {
            if let (Some(&from), Some(&to)) =
                (node_map.get(&transition.from), node_map.get(&transition.to))
            {
                graph.add_edge(from, to, transition.symbol.to_string());
            }
        }

        Dot::new(&graph).to_string()
    }

    fn save_dot(&self, file_name: &Path) -> Result<()> {
        let mut dot_file = File::create(file_name)?;
        dot_file.write_all(self.to_dot().as_bytes())?;

        log::info!("NFA description saved as {}", file_name.display());
        Ok(())
    }
}

impl NFAState {
    fn new(id: usize) -> Self {
        NFAState {
            id,
            label: format!("q{id}"),
            is_start: false,
            is_accept: false,
        }
    }

    pub fn get_id(&self) -> usize {
        self.id
    }

    pub fn get_label(&self) -> &str {
        &self.label
    }

    pub fn is_start(&self) -> bool {
        self.is_start
    }

    pub fn is_accept(&self) -> bool {
        self.is_accept
    }
}

impl Transition {
    pub fn get_id(&self) -> usize {
        self.id
    }

    pub fn get_from(&self) -> usize {
        self.from
    }

    pub fn get_to(&self) -> usize {
        self.to
    }

    pub fn get_symbol(&self) -> Symbol {
        self.symbol
    }
}

impl NFA {
    fn new() -> Self {
        NFA {
            states: Vec::new(),
            transitions: Vec::new(),
            start_state: 0,
            accept_states: Vec::new(),
            alphabet: BTreeSet::new(),
            regex: String::new(),
        }
    }

    pub fn get_states(&self) -> &[NFAState] {
        &self.states
    }

    pub fn get_transitions(&self) -> &[Transition] {
        &self.transitions
    }

    pub fn get_state(&self, id: usize) -> Option<&NFAState> {
        self.states.iter().find(|state| state.id == id)
    }

    pub fn get_regex(&self) -> &str {
        &self.regex
    }

    fn get_mut_state(&mut self, id: usize) -> Option<&mut NFAState> {
        self.states.iter_mut().find(|state| state.id == id)
    }

    fn set_start_state(&mut self, state_id: usize) {
        if let Some(state) = self.get_mut_state(state_id) {
            state.is_start = true;
        }
        self.start_state = state_id;
    }

    fn set_accept_state(&mut self, state_id: usize) {
        if let Some(state) = self.get_mut_state(state_id) {
            state.is_accept = true;
        }
        if !self.accept_states.contains(&state_id) {
            self.accept_states.push(state_id);
        }
    }

    fn clear_flags(&mut self) {
        for state in self.states.iter_mut() {
            state.is_start = false;
            state.is_accept = false;
        }
        self.accept_states.clear();
    }

    // Move every state and transition of other into self without touching any flags
    fn absorb(&mut self, other: NFA) {
        self.states.extend(other.states);
        self.transitions.extend(other.transitions);
        self.alphabet.extend(other.alphabet);
    }

    /// Verify that the start/accept flags agree with the start and accept lists and that every
    /// transition connects states of this automaton.
    pub fn check_invariants(&self) -> Result<(), NFAError> {
        let ids: HashSet<usize> = self.states.iter().map(|state| state.id).collect();

        if ids.len() != self.states.len() {
            return Err(NFAError::InconsistentAutomaton(
                "duplicate state ids".to_string(),
            ));
        }

        let starts: Vec<usize> = self
            .states
            .iter()
            .filter(|state| state.is_start)
            .map(|state| state.id)
            .collect();

        if starts != [self.start_state] {
            return Err(NFAError::InconsistentAutomaton(format!(
                "start state {} does not match start flags {:?}",
                self.start_state, starts
            )));
        }

        let flagged: BTreeSet<usize> = self
            .states
            .iter()
            .filter(|state| state.is_accept)
            .map(|state| state.id)
            .collect();
        let listed: BTreeSet<usize> = self.accept_states.iter().copied().collect();

        if flagged != listed || listed.len() != self.accept_states.len() {
            return Err(NFAError::InconsistentAutomaton(format!(
                "accept states {:?} do not match accept flags {:?}",
                self.accept_states, flagged
            )));
        }

        for transition in &self.transitions {
            if !ids.contains(&transition.from) || !ids.contains(&transition.to) {
                return Err(NFAError::InconsistentAutomaton(format!(
                    "transition {} connects unknown states {} -> {}",
                    transition.id, transition.from, transition.to
                )));
            }
        }

        Ok(())
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<NFA> {
        let raw: RawNFA = serde_json::from_str(json)?;

        match NFA::try_from(raw) {
            Ok(nfa) => Ok(nfa),
            Err(err) => Err(Report::new(err)),
        }
    }
}

/// Hands out fresh state and transition ids for one construction and combines fragments.
pub struct ThompsonBuilder {
    next_state: usize,
    next_transition: usize,
}

impl Default for ThompsonBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ThompsonBuilder {
    pub fn new() -> Self {
        ThompsonBuilder {
            next_state: 0,
            next_transition: 0,
        }
    }

    fn add_state(&mut self, nfa: &mut NFA) -> usize {
        let state_id = self.next_state;
        self.next_state += 1;
        nfa.states.push(NFAState::new(state_id));
        state_id
    }

    fn add_transition(&mut self, nfa: &mut NFA, from: usize, symbol: Symbol, to: usize) {
        let id = self.next_transition;
        self.next_transition += 1;
        nfa.transitions.push(Transition {
            id,
            from,
            to,
            symbol,
        });
    }

    /// A single state that is both start and accept.
    pub fn empty(&mut self) -> NFA {
        let mut result = NFA::new();
        let state = self.add_state(&mut result);
        result.set_start_state(state);
        result.set_accept_state(state);
        result
    }

    pub fn literal(&mut self, character: char) -> NFA {
        let mut result = NFA::new();
        let start_state = self.add_state(&mut result);
        let end_state = self.add_state(&mut result);
        result.alphabet.insert(character);
        self.add_transition(&mut result, start_state, Symbol::Char(character), end_state);

        result.set_start_state(start_state);
        result.set_accept_state(end_state);
        result
    }

    pub fn closure(&mut self, mut nfa: NFA) -> NFA {
        let mut result = NFA::new();
        let new_start = self.add_state(&mut result);
        let new_accept = self.add_state(&mut result);

        let old_start = nfa.start_state;
        let old_accepts = std::mem::take(&mut nfa.accept_states);
        nfa.clear_flags();
        result.absorb(nfa);

        self.add_transition(&mut result, new_start, Symbol::Epsilon, old_start);
        // Zero repetitions
        self.add_transition(&mut result, new_start, Symbol::Epsilon, new_accept);

        for accept in old_accepts {
            self.add_transition(&mut result, accept, Symbol::Epsilon, old_start);
            self.add_transition(&mut result, accept, Symbol::Epsilon, new_accept);
        }

        result.set_start_state(new_start);
        result.set_accept_state(new_accept);
        result
    }

    pub fn concatenate(&mut self, mut nfa1: NFA, mut nfa2: NFA) -> NFA {
        let start = nfa1.start_state;
        let nfa1_accepts = std::mem::take(&mut nfa1.accept_states);
        let nfa2_start = nfa2.start_state;
        let nfa2_accepts = std::mem::take(&mut nfa2.accept_states);

        let mut result = NFA::new();
        nfa1.clear_flags();
        nfa2.clear_flags();
        result.absorb(nfa1);
        result.absorb(nfa2);

        for accept in nfa1_accepts {
            self.add_transition(&mut result, accept, Symbol::Epsilon, nfa2_start);
        }

        result.set_start_state(start);

        // If the start of nfa2 also accepts it stays accepting, reachable from nfa1's old accepts
        for accept in nfa2_accepts {
            result.set_accept_state(accept);
        }

        result
    }

    pub fn alternation(&mut self, mut nfa1: NFA, mut nfa2: NFA) -> NFA {
        let mut result = NFA::new();
        let new_start = self.add_state(&mut result);
        let new_accept = self.add_state(&mut result);

        let nfa1_start = nfa1.start_state;
        let nfa1_accepts = std::mem::take(&mut nfa1.accept_states);
        let nfa2_start = nfa2.start_state;
        let nfa2_accepts = std::mem::take(&mut nfa2.accept_states);

        nfa1.clear_flags();
        nfa2.clear_flags();
        result.absorb(nfa1);
        result.absorb(nfa2);

        self.add_transition(&mut result, new_start, Symbol::Epsilon, nfa1_start);
        self.add_transition(&mut result, new_start, Symbol::Epsilon, nfa2_start);

        for accept in nfa1_accepts.into_iter().chain(nfa2_accepts) {
            self.add_transition(&mut result, accept, Symbol::Epsilon, new_accept);
        }

        result.set_start_state(new_start);
        result.set_accept_state(new_accept);
        result
    }

    /// Evaluate a postfix token sequence over a stack of fragments.
    pub fn build(&mut self, postfix: &[Token]) -> Result<NFA, NFAError> {
        let mut stack: Vec<NFA> = Vec::new();

        for token in postfix {
            let fragment = match token {
                Token::Literal(character) => self.literal(*character),
                Token::Star => {
                    let nfa = stack.pop().ok_or(NFAError::OperandStackUnderflow(*token))?;
                    self.closure(nfa)
                }
                Token::Concat | Token::Union => {
                    let nfa2 = stack.pop().ok_or(NFAError::OperandStackUnderflow(*token))?;
                    let nfa1 = stack.pop().ok_or(NFAError::OperandStackUnderflow(*token))?;
                    if *token == Token::Concat {
                        self.concatenate(nfa1, nfa2)
                    } else {
                        self.alternation(nfa1, nfa2)
                    }
                }
                Token::LParen | Token::RParen => return Err(NFAError::UnexpectedToken(*token)),
            };
            stack.push(fragment);
        }

        let mut result = match stack.len() {
            0 => self.empty(),
            1 => stack.swap_remove(0),
            count => return Err(NFAError::LeftoverFragments(count)),
        };

        result.states.sort_by_key(|state| state.id);
        result.transitions.sort_by_key(|transition| transition.id);
        result.accept_states.sort_unstable();

        Ok(result)
    }
}

/// Compile a regular expression into an NFA using Thompson Construction.
pub fn build_nfa(regex: &str) -> Result<NFA> {
    let postfix = parse_regex(regex)?;

    let mut builder = ThompsonBuilder::new();
    let mut result = match builder.build(&postfix) {
        Ok(nfa) => nfa,
        Err(err) => return Err(Report::new(err)),
    };
    result.regex = regex.to_string();

    log::debug!(
        "Constructed NFA for {:?} with {} states and {} transitions",
        regex,
        result.get_num_states(),
        result.transitions.len()
    );

    Ok(result)
}

#[cfg(test)]
mod nfa_tests {
    use super::*;
    use crate::reg_ex::tokenize;

    fn epsilon_count(nfa: &NFA) -> usize {
        nfa.transitions
            .iter()
            .filter(|transition| transition.symbol.is_epsilon())
            .count()
    }

    #[test]
    fn test_literal_construction() {
        let mut builder = ThompsonBuilder::new();
        let nfa = builder.literal('a');

        assert_eq!(nfa.get_num_states(), 2);
        assert_eq!(nfa.get_start_state(), 0);
        assert_eq!(nfa.get_acceptor_states(), &[1]);
        assert_eq!(nfa.transitions.len(), 1);
        assert_eq!(nfa.transitions[0].symbol, Symbol::Char('a'));
        assert!(nfa.alphabet.contains(&'a'));
        assert!(nfa.check_invariants().is_ok());
    }

    #[test]
    fn test_closure_construction() {
        let mut builder = ThompsonBuilder::new();
        let inner = builder.literal('a');
        let nfa = builder.closure(inner);

        assert_eq!(nfa.get_num_states(), 4);
        assert_eq!(nfa.get_start_state(), 2);
        assert_eq!(nfa.get_acceptor_states(), &[3]);
        // start -> old start, start -> accept, old accept -> old start, old accept -> accept
        assert_eq!(epsilon_count(&nfa), 4);
        assert!(!nfa.get_state(0).unwrap().is_start());
        assert!(!nfa.get_state(1).unwrap().is_accept());
        assert!(nfa.check_invariants().is_ok());
    }

    #[test]
    fn test_concatenate_construction() {
        let mut builder = ThompsonBuilder::new();
        let a = builder.literal('a');
        let b = builder.literal('b');
        let nfa = builder.concatenate(a, b);

        assert_eq!(nfa.get_num_states(), 4);
        assert_eq!(nfa.get_start_state(), 0);
        assert_eq!(nfa.get_acceptor_states(), &[3]);
        assert_eq!(epsilon_count(&nfa), 1);
        assert!(!nfa.get_state(2).unwrap().is_start());
        assert!(!nfa.get_state(1).unwrap().is_accept());
        assert_eq!(nfa.alphabet.len(), 2);
        assert!(nfa.check_invariants().is_ok());
    }

    #[test]
    fn test_concatenate_with_accepting_start() {
        let mut builder = ThompsonBuilder::new();
        let a = builder.literal('a');
        let empty = builder.empty();
        let nfa = builder.concatenate(a, empty);

        assert_eq!(nfa.get_start_state(), 0);
        assert_eq!(nfa.get_acceptor_states(), &[2]);
        let merged = nfa.get_state(2).unwrap();
        assert!(merged.is_accept());
        assert!(!merged.is_start());
        assert!(nfa.check_invariants().is_ok());
    }

    #[test]
    fn test_alternation_construction() {
        let mut builder = ThompsonBuilder::new();
        let a = builder.literal('a');
        let b = builder.literal('b');
        let nfa = builder.alternation(a, b);

        assert_eq!(nfa.get_num_states(), 6);
        assert_eq!(nfa.get_start_state(), 4);
        assert_eq!(nfa.get_acceptor_states(), &[5]);
        assert_eq!(epsilon_count(&nfa), 4);
        assert!(nfa.check_invariants().is_ok());
    }

    #[test]
    fn test_build_ids_are_dense() {
        let nfa = build_nfa("(a|b)*abb").unwrap();

        for (idx, state) in nfa.get_states().iter().enumerate() {
            assert_eq!(state.get_id(), idx);
            assert_eq!(state.get_label(), format!("q{idx}"));
        }
        for (idx, transition) in nfa.get_transitions().iter().enumerate() {
            assert_eq!(transition.get_id(), idx);
        }
        assert_eq!(nfa.get_regex(), "(a|b)*abb");
        assert!(nfa.check_invariants().is_ok());
    }

    #[test]
    fn test_builds_are_independent() {
        let first = build_nfa("ab").unwrap();
        let second = build_nfa("ab").unwrap();

        assert_eq!(first.get_states(), second.get_states());
        assert_eq!(first.get_transitions(), second.get_transitions());
    }

    #[test]
    fn test_empty_regex() {
        let nfa = build_nfa("").unwrap();

        assert_eq!(nfa.get_num_states(), 1);
        assert!(nfa.get_transitions().is_empty());
        assert_eq!(nfa.get_acceptor_states(), &[nfa.get_start_state()]);
        assert!(nfa.check_invariants().is_ok());
    }

    #[test]
    fn test_malformed_postfix() {
        let mut builder = ThompsonBuilder::new();
        match builder.build(&[Token::Star]) {
            Err(NFAError::OperandStackUnderflow(Token::Star)) => {}
            other => panic!("Unexpected result {:?}", other),
        }

        let mut builder = ThompsonBuilder::new();
        match builder.build(&[Token::Literal('a'), Token::Union]) {
            Err(NFAError::OperandStackUnderflow(Token::Union)) => {}
            other => panic!("Unexpected result {:?}", other),
        }

        let mut builder = ThompsonBuilder::new();
        match builder.build(&tokenize("ab")) {
            Err(NFAError::LeftoverFragments(2)) => {}
            other => panic!("Unexpected result {:?}", other),
        }

        let mut builder = ThompsonBuilder::new();
        match builder.build(&[Token::LParen]) {
            Err(NFAError::UnexpectedToken(Token::LParen)) => {}
            other => panic!("Unexpected result {:?}", other),
        }
    }

    #[test]
    fn test_invalid_regex_is_rejected() {
        let result = build_nfa("a|");
        assert!(result.is_err());
        assert!(result
            .unwrap_err()
            .downcast_ref::<crate::reg_ex::RegExError>()
            .is_some());
    }

    #[test]
    fn test_json_round_trip_keeps_invariants() {
        let nfa = build_nfa("a*b").unwrap();
        let json = nfa.to_json().unwrap();
        let loaded = NFA::from_json(&json).unwrap();

        assert_eq!(loaded.get_states(), nfa.get_states());
        assert_eq!(loaded.get_transitions(), nfa.get_transitions());
        assert_eq!(loaded.get_start_state(), nfa.get_start_state());
    }

    #[test]
    fn test_from_json_rejects_inconsistent_flags() {
        let mut nfa = build_nfa("a").unwrap();
        nfa.accept_states.clear();
        let json = serde_json::to_string(&nfa).unwrap();

        let result = NFA::from_json(&json);
        assert!(result.is_err());

        match result.unwrap_err().downcast_ref::<NFAError>().unwrap() {
            NFAError::InconsistentAutomaton(_) => {}
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_deserialize_rejects_unknown_endpoint() {
        let nfa = build_nfa("ab").unwrap();
        let mut value = serde_json::to_value(&nfa).unwrap();
        value["transitions"][0]["to"] = serde_json::json!(99);

        let result = serde_json::from_value::<NFA>(value.clone());
        assert!(result.is_err());

        let result = NFA::from_json(&value.to_string());
        match result.unwrap_err().downcast_ref::<NFAError>() {
            Some(NFAError::InconsistentAutomaton(_)) => {}
            other => panic!("Unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_dot_export_skips_dangling_edges() {
        let mut nfa = build_nfa("ab").unwrap();
        nfa.transitions[0].to = 99;

        let dot = nfa.to_dot();
        assert!(dot.starts_with("digraph"));
        assert_eq!(dot.matches("->").count(), nfa.get_transitions().len() - 1);
    }

    #[test]
    fn test_dot_export() {
        let nfa = build_nfa("a|b").unwrap();
        let dot = nfa.to_dot();

        assert!(dot.starts_with("digraph"));
        assert!(dot.contains("Start"));
        assert!(dot.contains("Accept"));
        assert!(dot.contains("ε"));
    }
}
