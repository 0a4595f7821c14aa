//! Session variable schema and storage (§4.6). The schema is derived once
//! per scenario (at benchmark-build time, conceptually) by collecting every
//! variable name declared on the scenario; the table itself is a flat
//! `Vec<Option<Value>>` indexed by schema slot, so steady-state access is a
//! vector index rather than a hash lookup once the slot is known.

use ahash::AHashMap;
use volley_common::{VarType, VariableDecl, Value};

/// Maps declared variable names to table slots for one scenario.
#[derive(Debug, Default)]
pub struct VariableSchema {
    slots: AHashMap<String, usize>,
    types: Vec<VarType>,
}

impl VariableSchema {
    pub fn new(decls: &[VariableDecl]) -> Self {
        let mut slots = AHashMap::with_capacity(decls.len());
        let mut types = Vec::with_capacity(decls.len());
        for (idx, decl) in decls.iter().enumerate() {
            slots.insert(decl.name.clone(), idx);
            types.push(decl.var_type);
        }
        Self { slots, types }
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    pub fn slot(&self, name: &str) -> Option<usize> {
        self.slots.get(name).copied()
    }
}

/// Per-session variable storage, reset between acquisitions of the same
/// pooled session object by possibly-different scenarios.
#[derive(Debug, Default)]
pub struct VariableTable {
    values: Vec<Option<Value>>,
}

impl VariableTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resize and clear the table to match `schema`. Called once per
    /// session acquisition, never mid-sequence.
    pub fn reset(&mut self, schema: &VariableSchema) {
        self.values.clear();
        self.values.resize_with(schema.len(), || None);
    }

    pub fn get(&self, schema: &VariableSchema, name: &str) -> Option<Value> {
        schema.slot(name).and_then(|i| self.values[i].clone())
    }

    pub fn set(&mut self, schema: &VariableSchema, name: &str, value: Value) {
        if let Some(i) = schema.slot(name) {
            self.values[i] = Some(value);
        }
    }

    pub fn is_set(&self, schema: &VariableSchema, name: &str) -> bool {
        schema.slot(name).is_some_and(|i| self.values[i].is_some())
    }

    pub fn unset(&mut self, schema: &VariableSchema, name: &str) {
        if let Some(i) = schema.slot(name) {
            self.values[i] = None;
        }
    }

    pub fn get_int(&self, schema: &VariableSchema, name: &str) -> Option<i64> {
        self.get(schema, name).and_then(|v| v.as_int())
    }

    pub fn set_int(&mut self, schema: &VariableSchema, name: &str, value: i64) {
        self.set(schema, name, Value::Int(value));
    }

    /// Whether every slot is unset, an invariant release-to-pool checks
    /// (§8: "For every session returned to the pool, its variable table...
    /// [is] empty").
    pub fn is_empty(&self) -> bool {
        self.values.iter().all(|v| v.is_none())
    }

    pub fn clear(&mut self) {
        for v in self.values.iter_mut() {
            *v = None;
        }
    }
}
