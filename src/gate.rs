//! The mutable interior node of the Boolean graph.
//!
//! A gate carries an operator, an optional vote number for K/N logic, and a
//! set of signed child edges. Literal polarity lives on the edge: a negative
//! index is a complemented child, so De Morgan is a pure edge-sign flip and
//! shared children stay canonical.
//!
//! Children are held in three disjoint tables keyed by the signed edge, one
//! per node kind, so the kind of a child is known without inspecting it.
//! Mutation is transactional at the gate level: when an addition proves the
//! gate constant (`x AND NOT x`, `x OR NOT x`, ...), the gate transitions
//! its [`State`] and clears its children within the same call. The boolean
//! returned by the mutators reports exactly that transition, and callers
//! must stop feeding children to a constant gate.

use std::cell::RefCell;
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::rc::Rc;

use log::debug;

use crate::node::{ConstantRef, GateRef, GateWeak, Node, NodeBase, NodeIndexer, VariableRef};

/// Boolean connectives of gates.
///
/// After preprocessing only AND, OR, ATLEAST, and NULL survive; the rest
/// exist for faithful construction from the source model.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Operator {
    And,
    Or,
    /// Combination, K/N, or vote gate.
    Atleast,
    /// Exclusive OR with exactly two children.
    Xor,
    Not,
    Nand,
    Nor,
    /// Single-child pass-through. This is not the null set.
    Null,
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operator::And => "and",
            Operator::Or => "or",
            Operator::Atleast => "atleast",
            Operator::Xor => "xor",
            Operator::Not => "not",
            Operator::Nand => "nand",
            Operator::Nor => "nor",
            Operator::Null => "null",
        };
        write!(f, "{}", name)
    }
}

/// Algebraic state of a gate.
///
/// Null and Unity record that simplification proved the gate constant;
/// such a gate keeps no children.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum State {
    Normal,
    /// The gate is constant false.
    Null,
    /// The gate is constant true.
    Unity,
}

/// The indexed Boolean gate.
pub struct Gate {
    base: NodeBase,
    operator: Operator,
    vote_number: i32,
    state: State,
    mark: bool,
    min_time: i32,
    max_time: i32,
    module: bool,
    num_failed_children: usize,
    /// Signed edges to all children. Zero is forbidden.
    children: BTreeSet<i32>,
    gate_children: HashMap<i32, GateRef>,
    variable_children: HashMap<i32, VariableRef>,
    constant_children: HashMap<i32, ConstantRef>,
    indexer: Rc<NodeIndexer>,
    self_ptr: GateWeak,
}

impl Gate {
    /// Creates a free-standing gate with the next node index.
    pub fn new(operator: Operator, indexer: &Rc<NodeIndexer>) -> GateRef {
        let index = indexer.next_node();
        let indexer = indexer.clone();
        Rc::new_cyclic(|self_ptr| {
            RefCell::new(Gate {
                base: NodeBase::new(index),
                operator,
                vote_number: 0,
                state: State::Normal,
                mark: false,
                min_time: 0,
                max_time: 0,
                module: false,
                num_failed_children: 0,
                children: BTreeSet::new(),
                gate_children: HashMap::new(),
                variable_children: HashMap::new(),
                constant_children: HashMap::new(),
                indexer,
                self_ptr: self_ptr.clone(),
            })
        })
    }

    pub fn index(&self) -> i32 {
        self.base.index()
    }

    pub fn base(&self) -> &NodeBase {
        &self.base
    }

    pub fn base_mut(&mut self) -> &mut NodeBase {
        &mut self.base
    }

    pub fn operator(&self) -> Operator {
        self.operator
    }

    /// Changes the operator of this gate.
    ///
    /// Only the simple connectives may be assigned from outside; complex
    /// rewrites go through the dedicated operations.
    pub fn set_operator(&mut self, operator: Operator) {
        assert!(
            matches!(
                operator,
                Operator::And | Operator::Or | Operator::Not | Operator::Null
            ),
            "Complex operator change to {}",
            operator
        );
        self.operator = operator;
    }

    pub fn vote_number(&self) -> i32 {
        self.vote_number
    }

    /// Sets the vote number for an ATLEAST gate. Not validated here.
    pub fn set_vote_number(&mut self, number: i32) {
        self.vote_number = number;
    }

    pub fn state(&self) -> State {
        self.state
    }

    /// Signed edges to all children.
    pub fn children(&self) -> &BTreeSet<i32> {
        &self.children
    }

    pub fn gate_children(&self) -> &HashMap<i32, GateRef> {
        &self.gate_children
    }

    pub fn variable_children(&self) -> &HashMap<i32, VariableRef> {
        &self.variable_children
    }

    pub fn constant_children(&self) -> &HashMap<i32, ConstantRef> {
        &self.constant_children
    }

    /// Mark for linear traversal, an alternative to the visit times.
    pub fn mark(&self) -> bool {
        self.mark
    }

    pub fn set_mark(&mut self, flag: bool) {
        self.mark = flag;
    }

    /// The minimum visit time of this gate's sub-tree.
    pub fn min_time(&self) -> i32 {
        self.min_time
    }

    pub fn set_min_time(&mut self, time: i32) {
        assert!(time > 0, "Visit time must be positive");
        self.min_time = time;
    }

    /// The maximum visit time of this gate's sub-tree.
    pub fn max_time(&self) -> i32 {
        self.max_time
    }

    pub fn set_max_time(&mut self, time: i32) {
        assert!(time > 0, "Visit time must be positive");
        self.max_time = time;
    }

    pub fn is_module(&self) -> bool {
        self.module
    }

    /// Flags this gate's sub-tree as an independent module. One-way.
    pub fn turn_module(&mut self) {
        assert!(!self.module, "The gate is already a module");
        self.module = true;
    }

    pub(crate) fn indexer(&self) -> &Rc<NodeIndexer> {
        &self.indexer
    }

    /// Looks up the child node behind a signed edge.
    pub fn child_node(&self, index: i32) -> Node {
        if let Some(gate) = self.gate_children.get(&index) {
            Node::Gate(gate.clone())
        } else if let Some(variable) = self.variable_children.get(&index) {
            Node::Variable(variable.clone())
        } else if let Some(constant) = self.constant_children.get(&index) {
            Node::Constant(constant.clone())
        } else {
            panic!("No child {} in G{}", index, self.index());
        }
    }
}

// The child algebra.
impl Gate {
    /// Adds a signed child edge to this gate.
    ///
    /// A duplicate or complement of an existing child is resolved by the
    /// logic of the operator instead of being inserted; the gate may
    /// rewrite itself or become constant in the process.
    ///
    /// Returns true iff the gate became constant (Null or Unity). Callers
    /// must not add further children after that.
    pub fn add_child(&mut self, index: i32, child: Node) -> bool {
        assert!(index != 0, "Child index must not be zero");
        assert_eq!(index.abs(), child.index(), "Child index mismatch");
        assert_eq!(
            self.state,
            State::Normal,
            "Adding a child to a constant gate"
        );
        debug_assert_ne!(index.abs(), self.index(), "Gate cannot be its own child");

        if self.children.contains(&index) {
            return self.process_duplicate_child(index);
        }
        if self.children.contains(&-index) {
            return self.process_complement_child(index);
        }

        self.children.insert(index);
        let parent_index = self.index();
        let self_ptr = self.self_ptr.clone();
        match child {
            Node::Gate(gate) => {
                gate.borrow_mut().base_mut().add_parent(parent_index, self_ptr);
                self.gate_children.insert(index, gate);
            }
            Node::Variable(variable) => {
                variable
                    .borrow_mut()
                    .base_mut()
                    .add_parent(parent_index, self_ptr);
                self.variable_children.insert(index, variable);
            }
            Node::Constant(constant) => {
                constant
                    .borrow_mut()
                    .base_mut()
                    .add_parent(parent_index, self_ptr);
                self.constant_children.insert(index, constant);
            }
        }
        false
    }

    /// Resolves the addition of a child that is already present.
    fn process_duplicate_child(&mut self, index: i32) -> bool {
        assert!(
            !matches!(self.operator, Operator::Not | Operator::Null),
            "Duplicate child for a single-child gate"
        );
        assert!(self.children.contains(&index));
        debug!("G{}: duplicate child {}", self.index(), index);
        match self.operator {
            // Absorption.
            Operator::And | Operator::Or | Operator::Nand | Operator::Nor => false,
            // x XOR x is constant false.
            Operator::Xor => {
                self.nullify();
                true
            }
            Operator::Atleast => {
                self.process_atleast_duplicate(index);
                self.state != State::Normal
            }
            Operator::Not | Operator::Null => unreachable!(),
        }
    }

    /// `@(k, [x, x, rest]) = x & @(k-2, [rest]) | @(k, [rest])`
    ///
    /// The gate rewrites itself into the OR junction of that identity;
    /// the sub-terms are freshly allocated gates sharing the children.
    fn process_atleast_duplicate(&mut self, index: i32) {
        assert_eq!(self.operator, Operator::Atleast);
        let vote = self.vote_number;
        assert!(vote > 1, "ATLEAST vote number must exceed 1");
        debug!(
            "G{}: rewriting @({}) with duplicate {}",
            self.index(),
            vote,
            index
        );

        let duplicate = self.child_node(index);
        let clone_one = self.clone_gate(); // @(k, [x, rest])
        clone_one.borrow_mut().erase_child(index); // @(k, [rest])

        self.erase_all_children();
        self.operator = Operator::Or;
        self.vote_number = 0;

        let clone_one_index = clone_one.borrow().index();
        self.add_child(clone_one_index, Node::Gate(clone_one.clone()));

        if vote == 2 {
            // @(2, [x, x, rest]) = x | @(2, [rest])
            self.add_child(index, duplicate);
        } else {
            let clone_two = clone_one.borrow().clone_gate(); // @(k, [rest])
            clone_two.borrow_mut().set_vote_number(vote - 2);
            let and_gate = Gate::new(Operator::And, &self.indexer);
            let and_index = and_gate.borrow().index();
            self.add_child(and_index, Node::Gate(and_gate.clone()));
            {
                let mut junction = and_gate.borrow_mut();
                junction.add_child(index, duplicate);
                let clone_two_index = clone_two.borrow().index();
                junction.add_child(clone_two_index, Node::Gate(clone_two.clone()));
            }
            clone_two.borrow_mut().reduce_vote_bounds();
        }
        clone_one.borrow_mut().reduce_vote_bounds();
    }

    /// Resolves the addition of the complement of an existing child.
    fn process_complement_child(&mut self, index: i32) -> bool {
        assert!(
            !matches!(self.operator, Operator::Not | Operator::Null),
            "Complement child for a single-child gate"
        );
        assert!(self.children.contains(&-index));
        debug!("G{}: complement child {}", self.index(), index);
        match self.operator {
            // x AND NOT x is constant false; NOR by De Morgan alike.
            Operator::And | Operator::Nor => self.nullify(),
            // x OR NOT x is constant true; so are NAND and XOR.
            Operator::Or | Operator::Nand | Operator::Xor => self.make_unity(),
            Operator::Atleast => {
                // @(k, [x, ~x, rest]) = @(k-1, [rest])
                self.erase_child(-index);
                self.vote_number -= 1;
                self.reduce_vote_bounds();
            }
            Operator::Not | Operator::Null => unreachable!(),
        }
        self.state != State::Normal
    }

    /// Re-normalizes an ATLEAST gate after a vote or arity change.
    ///
    /// `@(0, ...)` is unity, `@(k, n < k)` is null, `@(1, ...)` is OR,
    /// and `@(n, n)` is AND.
    pub(crate) fn reduce_vote_bounds(&mut self) {
        if self.operator != Operator::Atleast || self.state != State::Normal {
            return;
        }
        let arity = self.children.len() as i32;
        if self.vote_number <= 0 {
            self.make_unity();
        } else if self.vote_number > arity {
            self.nullify();
        } else if self.vote_number == 1 {
            self.operator = Operator::Or;
            self.vote_number = 0;
        } else if self.vote_number == arity {
            self.operator = Operator::And;
            self.vote_number = 0;
        }
    }

    /// Creates a new gate with the same operator, vote number, and shared
    /// children as this one.
    pub fn clone_gate(&self) -> GateRef {
        debug!("cloning G{}", self.index());
        assert_eq!(self.state, State::Normal, "Cloning a constant gate");
        let clone = Gate::new(self.operator, &self.indexer);
        {
            let mut fresh = clone.borrow_mut();
            fresh.vote_number = self.vote_number;
            for &index in &self.children {
                let constant = fresh.add_child(index, self.child_node(index));
                assert!(!constant, "A clone cannot collapse");
            }
        }
        clone
    }

    /// Moves a child edge of this gate to another gate.
    ///
    /// Returns the recipient's add result: true iff the recipient became
    /// constant.
    pub fn transfer_child(&mut self, index: i32, recipient: &GateRef) -> bool {
        assert!(index != 0, "Child index must not be zero");
        debug_assert_ne!(recipient.borrow().index(), self.index());
        let node = self.child_node(index);
        self.erase_child(index);
        recipient.borrow_mut().add_child(index, node)
    }

    /// Adds a child edge of this gate to another gate as well.
    ///
    /// Returns the recipient's add result: true iff the recipient became
    /// constant.
    pub fn share_child(&self, index: i32, recipient: &GateRef) -> bool {
        assert!(self.children.contains(&index), "No child {} to share", index);
        debug_assert_ne!(recipient.borrow().index(), self.index());
        recipient.borrow_mut().add_child(index, self.child_node(index))
    }

    /// Negates every child edge. De Morgan's helper; the caller flips the
    /// operator (AND to NAND, OR to NOR, and vice versa).
    pub fn invert_children(&mut self) {
        let edges: Vec<i32> = self.children.iter().copied().collect();
        for index in edges {
            self.invert_child(index);
        }
    }

    /// Negates a single child edge.
    pub fn invert_child(&mut self, index: i32) {
        assert!(self.children.remove(&index), "No child {} to invert", index);
        assert!(
            !self.children.contains(&-index),
            "Inversion collides with an existing child"
        );
        self.children.insert(-index);
        if let Some(gate) = self.gate_children.remove(&index) {
            self.gate_children.insert(-index, gate);
        } else if let Some(variable) = self.variable_children.remove(&index) {
            self.variable_children.insert(-index, variable);
        } else {
            let constant = self
                .constant_children
                .remove(&index)
                .unwrap_or_else(|| panic!("No child {} in G{}", index, self.base.index()));
            self.constant_children.insert(-index, constant);
        }
    }

    /// Coalesces a positive child gate of the same logic into this gate.
    ///
    /// All of the child's edges move into this gate with their signs, and
    /// the edge to the child is removed.
    ///
    /// Returns true iff the merge made this gate constant.
    pub fn join_gate(&mut self, child_gate: &GateRef) -> bool {
        let child_index = child_gate.borrow().index();
        debug!("G{}: joining G{}", self.index(), child_index);
        assert!(
            self.children.remove(&child_index),
            "G{} is not a positive child of G{}",
            child_index,
            self.index()
        );
        self.gate_children.remove(&child_index);
        let parent_index = self.index();
        child_gate
            .borrow_mut()
            .base_mut()
            .remove_parent(parent_index);

        let grandchildren: Vec<(i32, Node)> = {
            let child = child_gate.borrow();
            child
                .children
                .iter()
                .map(|&index| (index, child.child_node(index)))
                .collect()
        };
        for (index, node) in grandchildren {
            if self.add_child(index, node) {
                return true;
            }
        }
        false
    }

    /// Swaps a NULL child gate for its single grandchild, composing the
    /// edge signs.
    ///
    /// Returns true iff this gate became constant.
    pub fn join_null_gate(&mut self, index: i32) -> bool {
        assert!(index != 0, "Child index must not be zero");
        debug!("G{}: joining NULL child {}", self.index(), index);
        let null_gate = self
            .gate_children
            .remove(&index)
            .unwrap_or_else(|| panic!("No gate child {} in G{}", index, self.base.index()));
        self.children.remove(&index);
        let parent_index = self.index();
        null_gate.borrow_mut().base_mut().remove_parent(parent_index);

        let (grandchild, node) = {
            let null = null_gate.borrow();
            assert_eq!(null.operator, Operator::Null, "Expected a NULL gate");
            assert_eq!(null.children.len(), 1, "NULL gate must have one child");
            let grandchild = *null.children.iter().next().unwrap();
            (grandchild, null.child_node(grandchild))
        };
        let signed = if index > 0 { grandchild } else { -grandchild };
        self.add_child(signed, node)
    }

    /// Copies all children of another gate into this empty gate.
    pub fn copy_children(&mut self, gate: &GateRef) {
        assert!(self.children.is_empty(), "The gate already has children");
        let children: Vec<(i32, Node)> = {
            let source = gate.borrow();
            source
                .children
                .iter()
                .map(|&index| (index, source.child_node(index)))
                .collect()
        };
        for (index, node) in children {
            let constant = self.add_child(index, node);
            assert!(!constant, "A copy cannot collapse");
        }
    }

    /// Detaches a child edge, scrubbing the parent back-reference.
    pub fn erase_child(&mut self, index: i32) {
        assert!(index != 0, "Child index must not be zero");
        assert!(
            self.children.remove(&index),
            "No child {} in G{}",
            index,
            self.base.index()
        );
        let parent_index = self.base.index();
        if let Some(gate) = self.gate_children.remove(&index) {
            gate.borrow_mut().base_mut().remove_parent(parent_index);
        } else if let Some(variable) = self.variable_children.remove(&index) {
            variable.borrow_mut().base_mut().remove_parent(parent_index);
        } else {
            let constant = self
                .constant_children
                .remove(&index)
                .unwrap_or_else(|| panic!("No child {} in G{}", index, parent_index));
            constant.borrow_mut().base_mut().remove_parent(parent_index);
        }
    }

    /// Detaches all children.
    pub fn erase_all_children(&mut self) {
        while let Some(&index) = self.children.iter().next_back() {
            self.erase_child(index);
        }
    }

    /// Forces the gate into the constant-false state, clearing children.
    /// Expected to be called at most once.
    pub fn nullify(&mut self) {
        assert_eq!(self.state, State::Normal, "The gate is already constant");
        debug!("G{}: nullified", self.index());
        self.state = State::Null;
        self.erase_all_children();
    }

    /// Forces the gate into the constant-true state, clearing children.
    /// Expected to be called at most once.
    pub fn make_unity(&mut self) {
        assert_eq!(self.state, State::Normal, "The gate is already constant");
        debug!("G{}: made unity", self.index());
        self.state = State::Unity;
        self.erase_all_children();
    }

    /// Registers the failure of one child for event-by-event propagation.
    ///
    /// Sets the optimization value to 1 once enough children have failed
    /// for the gate's logic. The existence of the failed child is not
    /// checked.
    pub fn child_failed(&mut self) {
        if self.base.opti_value() == 1 {
            return;
        }
        assert_eq!(self.base.opti_value(), 0);
        assert!(self.num_failed_children < self.children.len());
        self.num_failed_children += 1;
        match self.operator {
            Operator::Null | Operator::Or => self.base.set_opti_value(1),
            Operator::And => {
                if self.num_failed_children == self.children.len() {
                    self.base.set_opti_value(1);
                }
            }
            Operator::Atleast => {
                if self.num_failed_children as i32 == self.vote_number {
                    self.base.set_opti_value(1);
                }
            }
            _ => panic!("Failure propagation requires normalized gates"),
        }
    }

    /// Resets the failure value and the failed-children count.
    pub fn reset_children_failure(&mut self) {
        self.num_failed_children = 0;
        self.base.set_opti_value(0);
    }
}

impl Drop for Gate {
    fn drop(&mut self) {
        debug_assert!(
            self.base.parents().is_empty(),
            "Dropping G{} with live parents",
            self.base.index()
        );
        self.erase_all_children();
    }
}

impl fmt::Debug for Gate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Gate")
            .field("index", &self.base.index())
            .field("operator", &self.operator)
            .field("vote_number", &self.vote_number)
            .field("state", &self.state)
            .field("module", &self.module)
            .field("children", &self.children)
            .finish()
    }
}
