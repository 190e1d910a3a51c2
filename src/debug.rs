//! Shorthand textual form of the graph for diagnostics.
//!
//! Gates print as `G<index>`, gates that became constant as `GC<index>`,
//! and modules as `GM<index>`; variables print as their signed indices.
//! The format is not stable and is meant for logs and test output only.

use std::collections::HashSet;
use std::fmt;

use crate::gate::{Gate, Operator, State};
use crate::graph::BooleanGraph;
use crate::node::GateRef;

impl fmt::Display for BooleanGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "BooleanGraph(variables = {}, coherent = {}, normal = {})",
            self.num_variables(),
            self.coherent(),
            self.normal()
        )?;
        let mut visited = HashSet::new();
        write_gate(self.root(), f, &mut visited)
    }
}

fn gate_label(gate: &Gate) -> String {
    let prefix = if gate.state() != State::Normal {
        "GC"
    } else if gate.is_module() {
        "GM"
    } else {
        "G"
    };
    format!("{}{}", prefix, gate.index())
}

fn write_gate(gate: &GateRef, f: &mut fmt::Formatter<'_>, visited: &mut HashSet<i32>) -> fmt::Result {
    let g = gate.borrow();
    if !visited.insert(g.index()) {
        return Ok(());
    }
    write!(f, "{}: ", gate_label(&g))?;
    match g.state() {
        State::Null => writeln!(f, "false")?,
        State::Unity => writeln!(f, "true")?,
        State::Normal => {
            write!(f, "{}", g.operator())?;
            if g.operator() == Operator::Atleast {
                write!(f, "/{}", g.vote_number())?;
            }
            write!(f, "[")?;
            let mut first = true;
            for &index in g.children() {
                if !first {
                    write!(f, ", ")?;
                }
                first = false;
                if let Some(child) = g.gate_children().get(&index) {
                    if index < 0 {
                        write!(f, "-")?;
                    }
                    write!(f, "{}", gate_label(&child.borrow()))?;
                } else if let Some(constant) = g.constant_children().get(&index) {
                    let sign = if index < 0 { "-" } else { "" };
                    write!(f, "{}C{}", sign, constant.borrow().index())?;
                } else {
                    write!(f, "{}", index)?;
                }
            }
            writeln!(f, "]")?;
        }
    }
    let children: Vec<GateRef> = g.gate_children().values().cloned().collect();
    drop(g);
    for child in children {
        write_gate(&child, f, visited)?;
    }
    Ok(())
}
