// Copyright 2023-2024 The Regents of the University of California
// Copyright 2024-2025 Cornell University
// released under BSD 3-Clause License
// author: Kevin Laeufer <laeufer@cornell.edu>

//! Read-only JSON projection of the scope tree for the waveform viewer.
//!
//! Scopes become `{"name", "type": {"name": "struct"}, "children": [..]}`
//! nodes with children in declaration order, variables become leaves carrying
//! their value-change series. Aliases are emitted as separate leaves, each
//! rendering the shared series, so a viewer can show every declared name.

use crate::hierarchy::{ScopeOrVarRef, ScopeRef, ScopeTree, VarRef};
use serde_json::{json, Value};

impl ScopeTree {
    /// Serializes the whole tree starting at the `root` scope.
    pub fn to_json(&self) -> Value {
        self.scope_to_json(self.root_ref())
    }

    fn scope_to_json(&self, id: ScopeRef) -> Value {
        let scope = &self[id];
        let children: Vec<Value> = scope
            .items()
            .map(|item| match item {
                ScopeOrVarRef::Scope(s) => self.scope_to_json(s),
                ScopeOrVarRef::Var(v) => self.var_to_json(v),
            })
            .collect();
        json!({
            "name": scope.name(),
            "type": {"name": "struct"},
            "children": children,
        })
    }

    fn var_to_json(&self, id: VarRef) -> Value {
        let var = &self[id];
        let data: Vec<Value> = self
            .signal(var.signal_ref())
            .changes()
            .iter()
            .map(|(time, value)| json!([time, value]))
            .collect();
        json!({
            "name": var.name(),
            "type": {"width": var.width(), "name": var.kind().as_str()},
            "data": data,
        })
    }
}
