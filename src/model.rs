//! The fault-tree model boundary.
//!
//! The loader hands the analysis a typed formula tree rooted in a
//! [`Gate`]. Arguments are gates, basic events, house events, or anonymous
//! sub-formulas. Basic events expose the [`BasicEvent::is_ccf`] hook so
//! that common-cause groups can substitute a member event with its own
//! sub-gate during graph construction.
//!
//! These types carry no analysis state; the indexed Boolean graph is built
//! from them in a single pass and they are only consulted again to map
//! product indices back to event identities.

use std::rc::Rc;

use crate::gate::Operator;

/// A basic event: an independent Boolean variable, e.g. a component
/// failure, with a stable string identifier.
#[derive(Debug)]
pub struct BasicEvent {
    id: String,
    ccf_gate: Option<Rc<Gate>>,
}

impl BasicEvent {
    pub fn new(id: impl Into<String>) -> Rc<Self> {
        Rc::new(Self {
            id: id.into(),
            ccf_gate: None,
        })
    }

    /// Creates a basic event that belongs to a common-cause group and is
    /// represented by the given sub-gate in CCF-aware analyses.
    pub fn with_ccf_gate(id: impl Into<String>, gate: Rc<Gate>) -> Rc<Self> {
        Rc::new(Self {
            id: id.into(),
            ccf_gate: Some(gate),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// True if this event is substituted by a common-cause sub-gate.
    pub fn is_ccf(&self) -> bool {
        self.ccf_gate.is_some()
    }

    pub fn ccf_gate(&self) -> Option<&Rc<Gate>> {
        self.ccf_gate.as_ref()
    }
}

/// A house event: a Boolean constant whose value the analyst fixes.
#[derive(Debug)]
pub struct HouseEvent {
    id: String,
    state: bool,
}

impl HouseEvent {
    pub fn new(id: impl Into<String>, state: bool) -> Rc<Self> {
        Rc::new(Self {
            id: id.into(),
            state,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn state(&self) -> bool {
        self.state
    }
}

/// A named gate of the fault tree.
#[derive(Debug)]
pub struct Gate {
    id: String,
    formula: Formula,
}

impl Gate {
    pub fn new(id: impl Into<String>, formula: Formula) -> Rc<Self> {
        Rc::new(Self {
            id: id.into(),
            formula,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn formula(&self) -> &Formula {
        &self.formula
    }
}

/// A reference to a named model event.
#[derive(Debug, Clone)]
pub enum Event {
    Gate(Rc<Gate>),
    Basic(Rc<BasicEvent>),
    House(Rc<HouseEvent>),
}

impl Event {
    pub fn id(&self) -> &str {
        match self {
            Event::Gate(gate) => gate.id(),
            Event::Basic(event) => event.id(),
            Event::House(event) => event.id(),
        }
    }
}

/// An argument of a formula: a named event or an anonymous sub-formula.
#[derive(Debug)]
pub enum Arg {
    Event(Event),
    Formula(Formula),
}

/// A Boolean formula: an operator over a sequence of arguments, with an
/// optional vote number for ATLEAST logic.
#[derive(Debug)]
pub struct Formula {
    operator: Operator,
    vote_number: Option<i32>,
    arguments: Vec<Arg>,
}

impl Formula {
    pub fn new(operator: Operator) -> Self {
        Self {
            operator,
            vote_number: None,
            arguments: Vec::new(),
        }
    }

    /// Creates an ATLEAST formula with its vote number.
    pub fn vote(vote_number: i32) -> Self {
        Self {
            operator: Operator::Atleast,
            vote_number: Some(vote_number),
            arguments: Vec::new(),
        }
    }

    pub fn operator(&self) -> Operator {
        self.operator
    }

    pub fn vote_number(&self) -> Option<i32> {
        self.vote_number
    }

    pub fn arguments(&self) -> &[Arg] {
        &self.arguments
    }

    pub fn add_argument(&mut self, argument: Arg) {
        self.arguments.push(argument);
    }

    pub fn add_basic_event(&mut self, event: &Rc<BasicEvent>) {
        self.arguments.push(Arg::Event(Event::Basic(event.clone())));
    }

    pub fn add_house_event(&mut self, event: &Rc<HouseEvent>) {
        self.arguments.push(Arg::Event(Event::House(event.clone())));
    }

    pub fn add_gate(&mut self, gate: &Rc<Gate>) {
        self.arguments.push(Arg::Event(Event::Gate(gate.clone())));
    }

    pub fn add_formula(&mut self, formula: Formula) {
        self.arguments.push(Arg::Formula(formula));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_formula_arguments() {
        let pump = BasicEvent::new("pump");
        let mut formula = Formula::new(Operator::And);
        formula.add_basic_event(&pump);
        let mut inner = Formula::new(Operator::Not);
        inner.add_basic_event(&pump);
        formula.add_formula(inner);

        assert_eq!(formula.arguments().len(), 2);
        assert_eq!(formula.operator(), Operator::And);
        assert!(formula.vote_number().is_none());
    }

    #[test]
    fn test_vote_formula() {
        let formula = Formula::vote(2);
        assert_eq!(formula.operator(), Operator::Atleast);
        assert_eq!(formula.vote_number(), Some(2));
    }

    #[test]
    fn test_ccf_substitution_hook() {
        let plain = BasicEvent::new("plain");
        assert!(!plain.is_ccf());

        let mut formula = Formula::new(Operator::Or);
        formula.add_basic_event(&plain);
        let sub = Gate::new("ccf-sub", formula);
        let member = BasicEvent::with_ccf_gate("member", sub);
        assert!(member.is_ccf());
        assert_eq!(member.ccf_gate().unwrap().id(), "ccf-sub");
    }
}
