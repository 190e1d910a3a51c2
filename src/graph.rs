//! The indexed Boolean graph (PDAG).
//!
//! A [`BooleanGraph`] is a propositional directed acyclic graph built once
//! from a fault-tree model: gates and constants become indexed nodes,
//! basic events become densely indexed variables, and literal polarity is
//! encoded in the sign of the child edges. Three flags summarize the
//! result for the preprocessing dispatch: `coherent` (no negation
//! anywhere), `constants` (house events present), and `normal` (only AND
//! and OR gates).
//!
//! The graph owns every gate transitively through the root; independent
//! analyses never share a graph, and the index allocator is a property of
//! the graph rather than of the process.

use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use log::debug;

use crate::error::Error;
use crate::gate::{Gate, Operator, State};
use crate::model;
use crate::model::{Arg, Event};
use crate::node::{Constant, GateRef, Node, NodeIndexer, Variable};

pub struct BooleanGraph {
    root: GateRef,
    /// Original basic events; the event of variable `i` sits at `i - 1`.
    basic_events: Vec<Rc<model::BasicEvent>>,
    indexer: Rc<NodeIndexer>,
    coherent: bool,
    constants: bool,
    normal: bool,
}

impl BooleanGraph {
    /// Builds the graph from the top gate of a fault tree.
    ///
    /// `ccf` substitutes common-cause basic events with their group
    /// sub-gates via the loader's [`is_ccf`][model::BasicEvent::is_ccf]
    /// hook.
    pub fn new(root: &Rc<model::Gate>, ccf: bool) -> Result<Self, Error> {
        let indexer = Rc::new(NodeIndexer::new());
        let mut builder = Builder {
            indexer: indexer.clone(),
            basic_events: Vec::new(),
            id_to_node: HashMap::new(),
            ccf,
            coherent: true,
            constants: false,
            normal: true,
        };
        let root_gate = builder.process_formula(root.formula())?;
        debug!(
            "constructed Boolean graph: {} variables, coherent = {}, normal = {}",
            indexer.num_variables(),
            builder.coherent,
            builder.normal
        );
        Ok(Self {
            root: root_gate,
            basic_events: builder.basic_events,
            indexer,
            coherent: builder.coherent,
            constants: builder.constants,
            normal: builder.normal,
        })
    }

    /// The current top gate of the graph.
    pub fn root(&self) -> &GateRef {
        &self.root
    }

    /// Replaces the top gate. Meant for the preprocessor.
    pub fn set_root(&mut self, gate: GateRef) {
        self.root = gate;
    }

    /// True if the tree contains no negation at all.
    pub fn coherent(&self) -> bool {
        self.coherent
    }

    /// True if the original tree contains constants (house events).
    pub fn constants(&self) -> bool {
        self.constants
    }

    /// True if the tree contains only AND and OR gates.
    pub fn normal(&self) -> bool {
        self.normal
    }

    /// The original basic events in variable-index order.
    pub fn basic_events(&self) -> &[Rc<model::BasicEvent>] {
        &self.basic_events
    }

    /// Maps a positive variable index back to its basic event.
    pub fn get_basic_event(&self, index: i32) -> &Rc<model::BasicEvent> {
        assert!(index > 0, "Variable index must be positive");
        assert!(
            index as usize <= self.basic_events.len(),
            "Variable index {} out of range",
            index
        );
        &self.basic_events[(index - 1) as usize]
    }

    pub fn num_variables(&self) -> usize {
        debug_assert_eq!(self.indexer.num_variables(), self.basic_events.len());
        self.indexer.num_variables()
    }

    /// Resets the traversal marks of all gates.
    pub fn clear_gate_marks(&self) {
        let mut visited = HashSet::new();
        Self::clear_marks_impl(&self.root, &mut visited);
    }

    fn clear_marks_impl(gate: &GateRef, visited: &mut HashSet<i32>) {
        if !visited.insert(gate.borrow().index()) {
            return;
        }
        gate.borrow_mut().set_mark(false);
        let children: Vec<GateRef> = gate.borrow().gate_children().values().cloned().collect();
        for child in children {
            Self::clear_marks_impl(&child, visited);
        }
    }

    /// Resets the visit times of every node in the graph.
    pub fn clear_node_visits(&self) {
        let mut visited = HashSet::new();
        Self::clear_visits_impl(&self.root, &mut visited);
    }

    fn clear_visits_impl(gate: &GateRef, visited: &mut HashSet<i32>) {
        if !visited.insert(gate.borrow().index()) {
            return;
        }
        gate.borrow_mut().base_mut().clear_visits();
        {
            let g = gate.borrow();
            for variable in g.variable_children().values() {
                variable.borrow_mut().base_mut().clear_visits();
            }
            for constant in g.constant_children().values() {
                constant.borrow_mut().base_mut().clear_visits();
            }
        }
        let children: Vec<GateRef> = gate.borrow().gate_children().values().cloned().collect();
        for child in children {
            Self::clear_visits_impl(&child, visited);
        }
    }
}

/// Transient construction state: the identity map lives only here.
struct Builder {
    indexer: Rc<NodeIndexer>,
    basic_events: Vec<Rc<model::BasicEvent>>,
    id_to_node: HashMap<String, Node>,
    ccf: bool,
    coherent: bool,
    constants: bool,
    normal: bool,
}

impl Builder {
    fn process_formula(&mut self, formula: &model::Formula) -> Result<GateRef, Error> {
        let arity = formula.arguments().len();
        if arity == 0 {
            return Err(Error::EmptyFormula {
                operator: formula.operator(),
            });
        }
        match formula.operator() {
            Operator::Not | Operator::Null if arity != 1 => {
                return Err(Error::InvalidArity {
                    operator: formula.operator(),
                    expected: "exactly 1",
                    actual: arity,
                });
            }
            Operator::Xor if arity < 2 => {
                return Err(Error::InvalidArity {
                    operator: Operator::Xor,
                    expected: "at least 2",
                    actual: arity,
                });
            }
            Operator::Xor => return self.process_xor(formula.arguments()),
            Operator::Atleast => {
                let vote = formula.vote_number().ok_or(Error::MissingVoteNumber)?;
                if vote < 1 || vote as usize > arity {
                    return Err(Error::InvalidVoteNumber { vote, arity });
                }
                // K/N normalizations: 1/N is OR, N/N is AND.
                let operator = if vote == 1 {
                    Operator::Or
                } else if vote as usize == arity {
                    Operator::And
                } else {
                    Operator::Atleast
                };
                return self.build_gate(operator, vote, formula.arguments());
            }
            _ => {}
        }
        self.build_gate(formula.operator(), 0, formula.arguments())
    }

    fn build_gate(
        &mut self,
        operator: Operator,
        vote: i32,
        arguments: &[Arg],
    ) -> Result<GateRef, Error> {
        self.note_operator(operator);
        let gate = Gate::new(operator, &self.indexer);
        if operator == Operator::Atleast {
            gate.borrow_mut().set_vote_number(vote);
        }
        for argument in arguments {
            if gate.borrow().state() != State::Normal {
                break; // The gate collapsed into a constant.
            }
            self.add_argument(&gate, argument, 1)?;
        }
        Ok(gate)
    }

    /// An XOR of three or more inputs becomes a binary tree of XORs.
    fn process_xor(&mut self, arguments: &[Arg]) -> Result<GateRef, Error> {
        self.note_operator(Operator::Xor);
        let gate = Gate::new(Operator::Xor, &self.indexer);
        self.add_argument(&gate, &arguments[0], 1)?;
        if gate.borrow().state() != State::Normal {
            return Ok(gate);
        }
        if arguments.len() == 2 {
            self.add_argument(&gate, &arguments[1], 1)?;
        } else {
            let sub = self.process_xor(&arguments[1..])?;
            let index = sub.borrow().index();
            gate.borrow_mut().add_child(index, Node::Gate(sub));
        }
        Ok(gate)
    }

    fn note_operator(&mut self, operator: Operator) {
        match operator {
            Operator::And | Operator::Or => {}
            Operator::Not | Operator::Nand | Operator::Nor | Operator::Xor => {
                self.coherent = false;
                self.normal = false;
            }
            Operator::Atleast | Operator::Null => {
                self.normal = false;
            }
        }
    }

    /// Adds one formula argument to a gate with the given polarity.
    ///
    /// Returns true iff the gate collapsed into a constant.
    fn add_argument(&mut self, gate: &GateRef, argument: &Arg, sign: i32) -> Result<bool, Error> {
        match argument {
            Arg::Event(Event::Basic(event)) => {
                if self.ccf && event.is_ccf() {
                    let ccf_gate = event.ccf_gate().unwrap().clone();
                    let sub = self.resolve_gate(&ccf_gate)?;
                    let index = sub.borrow().index();
                    Ok(gate.borrow_mut().add_child(sign * index, Node::Gate(sub)))
                } else {
                    let variable = self.resolve_variable(event);
                    let index = variable.borrow().index();
                    Ok(gate
                        .borrow_mut()
                        .add_child(sign * index, Node::Variable(variable)))
                }
            }
            Arg::Event(Event::House(event)) => {
                self.constants = true;
                let constant = self.resolve_constant(event);
                let index = constant.borrow().index();
                Ok(gate
                    .borrow_mut()
                    .add_child(sign * index, Node::Constant(constant)))
            }
            Arg::Event(Event::Gate(sub)) => {
                let sub_gate = self.resolve_gate(sub)?;
                let index = sub_gate.borrow().index();
                Ok(gate
                    .borrow_mut()
                    .add_child(sign * index, Node::Gate(sub_gate)))
            }
            Arg::Formula(sub) => {
                // An anonymous NOT becomes a negative edge, not a gate.
                if sub.operator() == Operator::Not && sub.arguments().len() == 1 {
                    self.coherent = false;
                    return self.add_argument(gate, &sub.arguments()[0], -sign);
                }
                let sub_gate = self.process_formula(sub)?;
                let index = sub_gate.borrow().index();
                Ok(gate
                    .borrow_mut()
                    .add_child(sign * index, Node::Gate(sub_gate)))
            }
        }
    }

    fn resolve_variable(&mut self, event: &Rc<model::BasicEvent>) -> crate::node::VariableRef {
        if let Some(Node::Variable(variable)) = self.id_to_node.get(event.id()) {
            return variable.clone();
        }
        assert!(
            !self.id_to_node.contains_key(event.id()),
            "Identifier `{}` is reused across event kinds",
            event.id()
        );
        let variable = Variable::new(&self.indexer);
        self.basic_events.push(event.clone());
        self.id_to_node
            .insert(event.id().to_string(), Node::Variable(variable.clone()));
        variable
    }

    fn resolve_constant(&mut self, event: &Rc<model::HouseEvent>) -> crate::node::ConstantRef {
        if let Some(Node::Constant(constant)) = self.id_to_node.get(event.id()) {
            return constant.clone();
        }
        assert!(
            !self.id_to_node.contains_key(event.id()),
            "Identifier `{}` is reused across event kinds",
            event.id()
        );
        let constant = Constant::new(&self.indexer, event.state());
        self.id_to_node
            .insert(event.id().to_string(), Node::Constant(constant.clone()));
        constant
    }

    fn resolve_gate(&mut self, gate: &Rc<model::Gate>) -> Result<GateRef, Error> {
        if let Some(Node::Gate(existing)) = self.id_to_node.get(gate.id()) {
            return Ok(existing.clone());
        }
        assert!(
            !self.id_to_node.contains_key(gate.id()),
            "Identifier `{}` is reused across event kinds",
            gate.id()
        );
        let built = self.process_formula(gate.formula())?;
        self.id_to_node
            .insert(gate.id().to_string(), Node::Gate(built.clone()));
        Ok(built)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{BasicEvent, Formula, HouseEvent};
    use crate::node::GATE_INDEX_BASE;

    fn events(n: usize) -> Vec<Rc<BasicEvent>> {
        (0..n).map(|i| BasicEvent::new(format!("e{}", i + 1))).collect()
    }

    #[test]
    fn test_simple_and_graph() {
        let e = events(2);
        let mut formula = Formula::new(Operator::And);
        formula.add_basic_event(&e[0]);
        formula.add_basic_event(&e[1]);
        let top = model::Gate::new("top", formula);

        let graph = BooleanGraph::new(&top, false).unwrap();
        assert!(graph.coherent());
        assert!(graph.normal());
        assert!(!graph.constants());
        assert_eq!(graph.num_variables(), 2);
        assert_eq!(graph.get_basic_event(1).id(), "e1");
        assert_eq!(graph.get_basic_event(2).id(), "e2");

        let root = graph.root().borrow();
        assert_eq!(root.operator(), Operator::And);
        assert!(root.index() >= GATE_INDEX_BASE);
        assert_eq!(*root.children(), [1, 2].into_iter().collect());
    }

    #[test]
    fn test_repeated_event_reuses_index() {
        let e = events(1);
        let mut inner = Formula::new(Operator::Or);
        inner.add_basic_event(&e[0]);
        let mut formula = Formula::new(Operator::And);
        formula.add_basic_event(&e[0]);
        formula.add_formula(inner);
        let top = model::Gate::new("top", formula);

        let graph = BooleanGraph::new(&top, false).unwrap();
        assert_eq!(graph.num_variables(), 1);
        let root = graph.root().borrow();
        let (_, sub) = root.gate_children().iter().next().unwrap();
        assert!(sub.borrow().children().contains(&1));
        assert!(root.children().contains(&1));
    }

    #[test]
    fn test_anonymous_not_becomes_negative_edge() {
        let e = events(2);
        let mut negation = Formula::new(Operator::Not);
        negation.add_basic_event(&e[1]);
        let mut formula = Formula::new(Operator::And);
        formula.add_basic_event(&e[0]);
        formula.add_formula(negation);
        let top = model::Gate::new("top", formula);

        let graph = BooleanGraph::new(&top, false).unwrap();
        assert!(!graph.coherent());
        let root = graph.root().borrow();
        assert_eq!(*root.children(), [1, -2].into_iter().collect());
        assert!(root.gate_children().is_empty());
    }

    #[test]
    fn test_atleast_normalizations() {
        let e = events(3);

        let mut one = Formula::vote(1);
        for event in &e {
            one.add_basic_event(event);
        }
        let graph = BooleanGraph::new(&model::Gate::new("top", one), false).unwrap();
        assert_eq!(graph.root().borrow().operator(), Operator::Or);

        let mut all = Formula::vote(3);
        for event in &e {
            all.add_basic_event(event);
        }
        let graph = BooleanGraph::new(&model::Gate::new("top", all), false).unwrap();
        assert_eq!(graph.root().borrow().operator(), Operator::And);

        let mut two = Formula::vote(2);
        for event in &e {
            two.add_basic_event(event);
        }
        let graph = BooleanGraph::new(&model::Gate::new("top", two), false).unwrap();
        let root = graph.root().borrow();
        assert_eq!(root.operator(), Operator::Atleast);
        assert_eq!(root.vote_number(), 2);
        assert!(!graph.normal());
    }

    #[test]
    fn test_nary_xor_decomposition() {
        let e = events(3);
        let mut formula = Formula::new(Operator::Xor);
        for event in &e {
            formula.add_basic_event(event);
        }
        let top = model::Gate::new("top", formula);

        let graph = BooleanGraph::new(&top, false).unwrap();
        assert!(!graph.coherent());
        let root = graph.root().borrow();
        assert_eq!(root.operator(), Operator::Xor);
        assert_eq!(root.children().len(), 2);
        let (_, sub) = root.gate_children().iter().next().unwrap();
        let sub = sub.borrow();
        assert_eq!(sub.operator(), Operator::Xor);
        assert_eq!(*sub.children(), [2, 3].into_iter().collect());
    }

    #[test]
    fn test_house_events_become_constants() {
        let e = events(1);
        let house = HouseEvent::new("maintenance", true);
        let mut formula = Formula::new(Operator::And);
        formula.add_basic_event(&e[0]);
        formula.add_house_event(&house);
        let top = model::Gate::new("top", formula);

        let graph = BooleanGraph::new(&top, false).unwrap();
        assert!(graph.constants());
        let root = graph.root().borrow();
        assert_eq!(root.constant_children().len(), 1);
        let constant = root.constant_children().values().next().unwrap();
        assert!(constant.borrow().state());
    }

    #[test]
    fn test_shared_named_gate() {
        let e = events(2);
        let mut shared = Formula::new(Operator::Or);
        shared.add_basic_event(&e[0]);
        shared.add_basic_event(&e[1]);
        let shared = model::Gate::new("shared", shared);

        let mut left = Formula::new(Operator::And);
        left.add_gate(&shared);
        left.add_basic_event(&e[0]);
        let mut right = Formula::new(Operator::And);
        right.add_gate(&shared);
        right.add_basic_event(&e[1]);
        let mut formula = Formula::new(Operator::Or);
        formula.add_formula(left);
        formula.add_formula(right);
        let top = model::Gate::new("top", formula);

        let graph = BooleanGraph::new(&top, false).unwrap();
        let root = graph.root().borrow();
        let subs: Vec<_> = root.gate_children().values().collect();
        assert_eq!(subs.len(), 2);
        let shared_indices: Vec<i32> = subs
            .iter()
            .map(|g| {
                *g.borrow()
                    .gate_children()
                    .keys()
                    .next()
                    .expect("nested gate")
            })
            .collect();
        assert_eq!(shared_indices[0], shared_indices[1]);
    }

    #[test]
    fn test_ccf_substitution() {
        let e = events(2);
        let mut group = Formula::new(Operator::Or);
        group.add_basic_event(&e[0]);
        group.add_basic_event(&e[1]);
        let ccf_gate = model::Gate::new("ccf-pump", group);
        let member = BasicEvent::with_ccf_gate("pump", ccf_gate);

        let mut formula = Formula::new(Operator::Null);
        formula.add_basic_event(&member);
        let top = model::Gate::new("top", formula);

        // Without CCF the member stays a variable.
        let graph = BooleanGraph::new(&top, false).unwrap();
        assert_eq!(graph.num_variables(), 1);
        assert_eq!(graph.root().borrow().variable_children().len(), 1);

        // With CCF the member is substituted by its sub-gate.
        let graph = BooleanGraph::new(&top, true).unwrap();
        assert_eq!(graph.num_variables(), 2);
        assert_eq!(graph.root().borrow().gate_children().len(), 1);
    }

    #[test]
    fn test_validation_errors() {
        let e = events(2);

        let empty = Formula::new(Operator::And);
        assert!(matches!(
            BooleanGraph::new(&model::Gate::new("top", empty), false),
            Err(Error::EmptyFormula { .. })
        ));

        let mut bad_not = Formula::new(Operator::Not);
        bad_not.add_basic_event(&e[0]);
        bad_not.add_basic_event(&e[1]);
        assert!(matches!(
            BooleanGraph::new(&model::Gate::new("top", bad_not), false),
            Err(Error::InvalidArity { .. })
        ));

        let mut no_vote = Formula::new(Operator::Atleast);
        no_vote.add_basic_event(&e[0]);
        no_vote.add_basic_event(&e[1]);
        assert!(matches!(
            BooleanGraph::new(&model::Gate::new("top", no_vote), false),
            Err(Error::MissingVoteNumber)
        ));

        let mut bad_vote = Formula::vote(3);
        bad_vote.add_basic_event(&e[0]);
        bad_vote.add_basic_event(&e[1]);
        assert!(matches!(
            BooleanGraph::new(&model::Gate::new("top", bad_vote), false),
            Err(Error::InvalidVoteNumber { vote: 3, arity: 2 })
        ));
    }

    #[test]
    fn test_collapsed_gate_during_construction() {
        // OR(x, NOT x) collapses to unity while the graph is being built.
        let e = events(1);
        let mut negation = Formula::new(Operator::Not);
        negation.add_basic_event(&e[0]);
        let mut formula = Formula::new(Operator::Or);
        formula.add_basic_event(&e[0]);
        formula.add_formula(negation);
        let top = model::Gate::new("top", formula);

        let graph = BooleanGraph::new(&top, false).unwrap();
        assert!(!graph.coherent());
        assert_eq!(graph.root().borrow().state(), State::Unity);
    }
}
