//! Graph normalization for cut-set generation.
//!
//! The MOCUS engine expects a graph with constants propagated, negations
//! pushed down to variable edges, pass-through gates removed, and modules
//! marked. This pipeline establishes exactly that contract:
//!
//! 1. constant propagation (house events and collapsed gates),
//! 2. gate normalization (NOT/NAND/NOR retyped with the negation moved to
//!    the parent edges; XOR decomposed; trivial arities reduced),
//! 3. complement propagation (negative gate edges replaced by shared
//!    De Morgan clones),
//! 4. pass-through removal,
//! 5. coalescing of same-logic single-parent gates,
//! 6. module detection over DFS visit times.

use std::collections::{HashMap, HashSet};

use log::debug;

use crate::gate::{Gate, Operator, State};
use crate::graph::BooleanGraph;
use crate::node::{GateRef, Node};

pub struct Preprocessor<'a> {
    graph: &'a mut BooleanGraph,
}

impl<'a> Preprocessor<'a> {
    pub fn new(graph: &'a mut BooleanGraph) -> Self {
        Self { graph }
    }

    /// Runs the full pipeline for cut-set generation.
    pub fn run(&mut self) {
        debug!("preprocessing the Boolean graph");
        self.propagate_constants();
        if self.graph.root().borrow().state() != State::Normal {
            return;
        }
        self.normalize_gates();
        self.propagate_complements();
        self.remove_null_gates();
        self.coalesce_gates();
        // Joining may have collapsed gates into constants; sweep again.
        self.propagate_constants();
        if self.graph.root().borrow().state() != State::Normal {
            return;
        }
        self.detect_modules();
    }

    /// Folds constant children into their parents, bottom-up.
    fn propagate_constants(&mut self) {
        debug!("propagating constants");
        let root = self.graph.root().clone();
        let mut visited = HashSet::new();
        Self::fold_constants(&root, &mut visited);
    }

    fn fold_constants(gate: &GateRef, visited: &mut HashSet<i32>) {
        if !visited.insert(gate.borrow().index()) {
            return;
        }
        let child_gates: Vec<GateRef> = gate.borrow().gate_children().values().cloned().collect();
        for child in &child_gates {
            Self::fold_constants(child, visited);
        }
        loop {
            if gate.borrow().state() != State::Normal {
                return;
            }
            // The effective value of a constant edge folds in the sign.
            let found: Option<(i32, bool)> = {
                let g = gate.borrow();
                g.children().iter().copied().find_map(|index| {
                    if let Some(constant) = g.constant_children().get(&index) {
                        let state = constant.borrow().state();
                        Some((index, if index > 0 { state } else { !state }))
                    } else if let Some(sub) = g.gate_children().get(&index) {
                        let state = sub.borrow().state();
                        match state {
                            State::Normal => None,
                            State::Unity => Some((index, index > 0)),
                            State::Null => Some((index, index < 0)),
                        }
                    } else {
                        None
                    }
                })
            };
            match found {
                Some((index, value)) => Self::process_constant_child(gate, index, value),
                None => break,
            }
        }
    }

    /// Boolean algebra for one constant child of a gate.
    fn process_constant_child(gate: &GateRef, index: i32, value: bool) {
        let mut g = gate.borrow_mut();
        debug!("G{}: child {} is constant {}", g.index(), index, value);
        match g.operator() {
            Operator::And => {
                if value {
                    g.erase_child(index);
                    if g.children().is_empty() {
                        g.make_unity();
                    }
                } else {
                    g.nullify();
                }
            }
            Operator::Or => {
                if value {
                    g.make_unity();
                } else {
                    g.erase_child(index);
                    if g.children().is_empty() {
                        g.nullify();
                    }
                }
            }
            Operator::Atleast => {
                g.erase_child(index);
                if value {
                    let vote = g.vote_number();
                    g.set_vote_number(vote - 1);
                }
                g.reduce_vote_bounds();
            }
            Operator::Xor => {
                g.erase_child(index);
                let other = *g.children().iter().next().expect("XOR is binary");
                if value {
                    g.invert_child(other);
                }
                g.set_operator(Operator::Null);
            }
            Operator::Not => {
                if value {
                    g.nullify();
                } else {
                    g.make_unity();
                }
            }
            Operator::Null => {
                if value {
                    g.make_unity();
                } else {
                    g.nullify();
                }
            }
            Operator::Nand => {
                if value {
                    g.erase_child(index);
                    if g.children().is_empty() {
                        g.nullify();
                    }
                } else {
                    g.make_unity();
                }
            }
            Operator::Nor => {
                if value {
                    g.nullify();
                } else {
                    g.erase_child(index);
                    if g.children().is_empty() {
                        g.make_unity();
                    }
                }
            }
        }
    }

    /// Retypes negative gates, decomposes XOR, and reduces trivial arities.
    fn normalize_gates(&mut self) {
        debug!("normalizing gates");
        // The root has no parent edge to absorb its negation, so the
        // negation goes into the children by De Morgan.
        {
            let root = self.graph.root().clone();
            let mut r = root.borrow_mut();
            match r.operator() {
                Operator::Not => {
                    r.set_operator(Operator::Null);
                    r.invert_children();
                }
                Operator::Nand => {
                    r.set_operator(Operator::Or);
                    r.invert_children();
                }
                Operator::Nor => {
                    r.set_operator(Operator::And);
                    r.invert_children();
                }
                _ => {}
            }
        }

        let gates = self.gather_gates();
        // Move the negation of NOT/NAND/NOR onto every parent edge; the
        // child itself retypes once, so shared gates stay consistent.
        for gate in &gates {
            let retype = match gate.borrow().operator() {
                Operator::Not => Operator::Null,
                Operator::Nand => Operator::And,
                Operator::Nor => Operator::Or,
                _ => continue,
            };
            let index = gate.borrow().index();
            let parents: Vec<GateRef> = gate
                .borrow()
                .base()
                .parents()
                .values()
                .filter_map(|parent| parent.upgrade())
                .collect();
            for parent in parents {
                let mut p = parent.borrow_mut();
                if p.children().contains(&index) {
                    p.invert_child(index);
                } else {
                    debug_assert!(p.children().contains(&-index));
                    p.invert_child(-index);
                }
            }
            gate.borrow_mut().set_operator(retype);
        }

        for gate in &gates {
            if gate.borrow().operator() == Operator::Xor {
                Self::normalize_xor(gate);
            }
        }

        // A single-literal AND/OR behaves as a pass-through.
        for gate in &gates {
            let mut g = gate.borrow_mut();
            if matches!(g.operator(), Operator::And | Operator::Or)
                && g.state() == State::Normal
                && g.children().len() == 1
            {
                g.set_operator(Operator::Null);
            }
        }
    }

    /// `a XOR b` becomes `(a AND NOT b) OR (NOT a AND b)`.
    fn normalize_xor(gate: &GateRef) {
        let (a, b, node_a, node_b, indexer) = {
            let g = gate.borrow();
            assert_eq!(g.operator(), Operator::Xor);
            assert_eq!(g.children().len(), 2, "XOR must be binary");
            debug!("decomposing XOR G{}", g.index());
            let mut edges = g.children().iter();
            let a = *edges.next().unwrap();
            let b = *edges.next().unwrap();
            (a, b, g.child_node(a), g.child_node(b), g.indexer().clone())
        };
        let left = Gate::new(Operator::And, &indexer);
        left.borrow_mut().add_child(a, node_a.clone());
        left.borrow_mut().add_child(-b, node_b.clone());
        let right = Gate::new(Operator::And, &indexer);
        right.borrow_mut().add_child(-a, node_a);
        right.borrow_mut().add_child(b, node_b);

        let left_index = left.borrow().index();
        let right_index = right.borrow().index();
        let mut g = gate.borrow_mut();
        g.erase_child(a);
        g.erase_child(b);
        g.set_operator(Operator::Or);
        g.add_child(left_index, Node::Gate(left.clone()));
        g.add_child(right_index, Node::Gate(right.clone()));
    }

    /// Replaces negative gate edges with shared De Morgan clones.
    fn propagate_complements(&mut self) {
        debug!("propagating complements");
        let root = self.graph.root().clone();
        let mut complements = HashMap::new();
        let mut visited = HashSet::new();
        Self::propagate_complements_impl(&root, &mut complements, &mut visited);
    }

    fn propagate_complements_impl(
        gate: &GateRef,
        complements: &mut HashMap<i32, GateRef>,
        visited: &mut HashSet<i32>,
    ) {
        if !visited.insert(gate.borrow().index()) {
            return;
        }
        loop {
            if gate.borrow().state() != State::Normal {
                return;
            }
            let negative: Option<(i32, GateRef)> = {
                let g = gate.borrow();
                g.gate_children()
                    .iter()
                    .find(|(&index, _)| index < 0)
                    .map(|(&index, child)| (index, child.clone()))
            };
            let Some((index, child)) = negative else { break };
            let child_index = child.borrow().index();
            let complement = match complements.get(&child_index) {
                Some(existing) => existing.clone(),
                None => {
                    let fresh = Self::make_complement(&child);
                    complements.insert(child_index, fresh.clone());
                    fresh
                }
            };
            let mut g = gate.borrow_mut();
            g.erase_child(index);
            let complement_index = complement.borrow().index();
            g.add_child(complement_index, Node::Gate(complement.clone()));
        }
        let children: Vec<GateRef> = gate.borrow().gate_children().values().cloned().collect();
        for child in children {
            Self::propagate_complements_impl(&child, complements, visited);
        }
    }

    /// The De Morgan dual of a gate with every child edge inverted.
    ///
    /// `NOT @(k, n) = @(n - k + 1, n)` over the inverted children.
    fn make_complement(gate: &GateRef) -> GateRef {
        let g = gate.borrow();
        debug!("building the complement of G{}", g.index());
        let (operator, vote) = match g.operator() {
            Operator::And => (Operator::Or, 0),
            Operator::Or => (Operator::And, 0),
            Operator::Null => (Operator::Null, 0),
            Operator::Atleast => (
                Operator::Atleast,
                g.children().len() as i32 - g.vote_number() + 1,
            ),
            operator => panic!("Complement of {} requires prior normalization", operator),
        };
        let complement = Gate::new(operator, g.indexer());
        {
            let mut c = complement.borrow_mut();
            c.set_vote_number(vote);
            for &index in g.children() {
                let collapsed = c.add_child(-index, g.child_node(index));
                assert!(!collapsed, "A complement cannot collapse");
            }
            c.reduce_vote_bounds();
        }
        complement
    }

    /// Joins NULL pass-through gates into their parents and re-roots the
    /// graph while the top itself is a pass-through over a gate.
    fn remove_null_gates(&mut self) {
        debug!("removing pass-through gates");
        {
            let root = self.graph.root().clone();
            let mut visited = HashSet::new();
            Self::join_null_children(&root, &mut visited);
        }
        loop {
            let replacement: Option<(i32, GateRef)> = {
                let root = self.graph.root().borrow();
                if root.operator() == Operator::Null && root.state() == State::Normal {
                    root.gate_children()
                        .iter()
                        .next()
                        .map(|(&edge, child)| (edge, child.clone()))
                } else {
                    None
                }
            };
            let Some((edge, child)) = replacement else { break };
            assert!(edge > 0, "Negative pass-through at the root");
            self.graph.root().borrow_mut().erase_child(edge);
            self.graph.set_root(child);
        }
    }

    fn join_null_children(gate: &GateRef, visited: &mut HashSet<i32>) {
        if !visited.insert(gate.borrow().index()) {
            return;
        }
        let children: Vec<GateRef> = gate.borrow().gate_children().values().cloned().collect();
        for child in &children {
            Self::join_null_children(child, visited);
        }
        loop {
            if gate.borrow().state() != State::Normal {
                return;
            }
            let null_edge: Option<i32> = {
                let g = gate.borrow();
                g.gate_children()
                    .iter()
                    .find(|(_, child)| {
                        let c = child.borrow();
                        c.operator() == Operator::Null && c.state() == State::Normal
                    })
                    .map(|(&edge, _)| edge)
            };
            let Some(edge) = null_edge else { break };
            if gate.borrow_mut().join_null_gate(edge) {
                return;
            }
        }
    }

    /// Merges single-parent same-logic gate children into their parents.
    fn coalesce_gates(&mut self) {
        debug!("coalescing gates");
        let root = self.graph.root().clone();
        let mut visited = HashSet::new();
        Self::coalesce_impl(&root, &mut visited);
    }

    fn coalesce_impl(gate: &GateRef, visited: &mut HashSet<i32>) {
        if !visited.insert(gate.borrow().index()) {
            return;
        }
        let mut skipped: HashSet<i32> = HashSet::new();
        loop {
            if gate.borrow().state() != State::Normal {
                return;
            }
            let candidate: Option<GateRef> = {
                let g = gate.borrow();
                if !matches!(g.operator(), Operator::And | Operator::Or) {
                    None
                } else {
                    g.gate_children()
                        .iter()
                        .find(|(&index, child)| {
                            index > 0 && !skipped.contains(&index) && {
                                let c = child.borrow();
                                c.state() == State::Normal
                                    && c.operator() == g.operator()
                                    && c.base().parents().len() == 1
                            }
                        })
                        .map(|(_, child)| child.clone())
                }
            };
            let Some(child) = candidate else { break };
            // A merge that meets a complement is left to the constant
            // sweep instead of collapsing the parent mid-pass.
            let conflict = {
                let g = gate.borrow();
                let c = child.borrow();
                c.children().iter().any(|&index| g.children().contains(&-index))
            };
            if conflict {
                skipped.insert(child.borrow().index());
                continue;
            }
            if gate.borrow_mut().join_gate(&child) {
                return;
            }
        }
        let children: Vec<GateRef> = gate.borrow().gate_children().values().cloned().collect();
        for child in children {
            Self::coalesce_impl(&child, visited);
        }
    }

    /// Marks independent modules using DFS visit times: a gate is a module
    /// iff every visit of its sub-tree falls within the gate's own
    /// enter/exit window.
    fn detect_modules(&mut self) {
        debug!("detecting modules");
        self.graph.clear_node_visits();
        let root = self.graph.root().clone();
        let time = Self::assign_timing(0, &root);
        debug!("timing assigned up to {}", time);
        self.graph.clear_gate_marks();
        Self::find_modules(&root);
        assert!(!root.borrow().base().revisited(), "The root cannot be shared");
        if !root.borrow().is_module() {
            root.borrow_mut().turn_module();
        }
    }

    fn assign_timing(time: i32, gate: &GateRef) -> i32 {
        let mut time = time + 1;
        if gate.borrow_mut().base_mut().visit(time) {
            return time; // Re-visited through another parent.
        }
        let child_gates: Vec<GateRef> = gate.borrow().gate_children().values().cloned().collect();
        for child in child_gates {
            time = Self::assign_timing(time, &child);
        }
        {
            let g = gate.borrow();
            for variable in g.variable_children().values() {
                time += 1;
                variable.borrow_mut().base_mut().visit(time);
            }
            for constant in g.constant_children().values() {
                time += 1;
                constant.borrow_mut().base_mut().visit(time);
            }
        }
        time += 1;
        let revisited = gate.borrow_mut().base_mut().visit(time); // Exit.
        assert!(!revisited, "Corrupted traversal timing");
        time
    }

    fn find_modules(gate: &GateRef) {
        if gate.borrow().mark() {
            return;
        }
        gate.borrow_mut().set_mark(true);

        let enter = gate.borrow().base().enter_time();
        let exit = gate.borrow().base().exit_time();
        let mut min_time = enter;
        // The gate's own re-visits through other parents count against it.
        let mut max_time = exit.max(gate.borrow().base().max_time());

        let child_gates: Vec<GateRef> = gate.borrow().gate_children().values().cloned().collect();
        for child in child_gates {
            Self::find_modules(&child);
            let c = child.borrow();
            min_time = min_time.min(c.min_time());
            max_time = max_time.max(c.max_time());
        }
        {
            let g = gate.borrow();
            for variable in g.variable_children().values() {
                let v = variable.borrow();
                min_time = min_time.min(v.base().min_time());
                max_time = max_time.max(v.base().max_time());
            }
            for constant in g.constant_children().values() {
                let c = constant.borrow();
                min_time = min_time.min(c.base().min_time());
                max_time = max_time.max(c.base().max_time());
            }
        }

        let mut g = gate.borrow_mut();
        if !g.is_module() && min_time == enter && max_time == exit {
            debug!("G{} is a module", g.index());
            g.turn_module();
        }
        g.set_min_time(min_time);
        g.set_max_time(max_time);
    }

    fn gather_gates(&self) -> Vec<GateRef> {
        let mut gates = Vec::new();
        let mut visited = HashSet::new();
        Self::gather_impl(self.graph.root(), &mut gates, &mut visited);
        gates
    }

    fn gather_impl(gate: &GateRef, gates: &mut Vec<GateRef>, visited: &mut HashSet<i32>) {
        if !visited.insert(gate.borrow().index()) {
            return;
        }
        gates.push(gate.clone());
        let children: Vec<GateRef> = gate.borrow().gate_children().values().cloned().collect();
        for child in children {
            Self::gather_impl(&child, gates, visited);
        }
    }
}
