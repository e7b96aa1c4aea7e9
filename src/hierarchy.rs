// Copyright 2023-2024 The Regents of the University of California
// Copyright 2024-2025 Cornell University
// released under BSD 3-Clause License
// author: Kevin Laeufer <laeufer@cornell.edu>

use crate::signals::Signal;
use rustc_hash::FxHashMap;
use std::num::NonZeroU32;
use std::ops::Index;

#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde1", derive(serde::Serialize, serde::Deserialize))]
pub struct Timescale {
    pub factor: u32,
    pub unit: TimescaleUnit,
}

impl Timescale {
    pub fn new(factor: u32, unit: TimescaleUnit) -> Self {
        Timescale { factor, unit }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde1", derive(serde::Serialize, serde::Deserialize))]
pub enum TimescaleUnit {
    FemtoSeconds,
    PicoSeconds,
    NanoSeconds,
    MicroSeconds,
    MilliSeconds,
    Seconds,
    Unknown,
}

impl TimescaleUnit {
    pub fn to_exponent(&self) -> Option<i8> {
        match &self {
            TimescaleUnit::FemtoSeconds => Some(-15),
            TimescaleUnit::PicoSeconds => Some(-12),
            TimescaleUnit::NanoSeconds => Some(-9),
            TimescaleUnit::MicroSeconds => Some(-6),
            TimescaleUnit::MilliSeconds => Some(-3),
            TimescaleUnit::Seconds => Some(0),
            TimescaleUnit::Unknown => None,
        }
    }
}

fn convert_timescale_unit(name: &str) -> TimescaleUnit {
    match name {
        "fs" => TimescaleUnit::FemtoSeconds,
        "ps" => TimescaleUnit::PicoSeconds,
        "ns" => TimescaleUnit::NanoSeconds,
        "us" => TimescaleUnit::MicroSeconds,
        "ms" => TimescaleUnit::MilliSeconds,
        "s" => TimescaleUnit::Seconds,
        _ => TimescaleUnit::Unknown,
    }
}

/// Parses the free text stored for `$timescale`, e.g. `1ns` or `10 ps`.
fn parse_timescale(raw: &str) -> Option<Timescale> {
    let tokens: Vec<&str> = raw.split(' ').filter(|t| !t.is_empty()).collect();
    let (factor, unit) = match tokens.as_slice() {
        [single] => match single.find(|c: char| !c.is_ascii_digit()) {
            None => (*single, ""),
            Some(pos) => single.split_at(pos),
        },
        [factor, unit] => (*factor, *unit),
        _ => return None,
    };
    let factor = factor.parse::<u32>().ok()?;
    Some(Timescale::new(factor, convert_timescale_unit(unit)))
}

/// Uniquely identifies a scope in the tree.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "serde1", derive(serde::Serialize, serde::Deserialize))]
pub struct ScopeRef(NonZeroU32);

impl ScopeRef {
    #[inline]
    pub fn from_index(index: usize) -> Option<Self> {
        NonZeroU32::new(index as u32 + 1).map(Self)
    }

    #[inline]
    pub fn index(&self) -> usize {
        (self.0.get() - 1) as usize
    }
}

/// Uniquely identifies a variable declaration in the tree.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "serde1", derive(serde::Serialize, serde::Deserialize))]
pub struct VarRef(NonZeroU32);

impl VarRef {
    #[inline]
    pub fn from_index(index: usize) -> Option<Self> {
        NonZeroU32::new(index as u32 + 1).map(Self)
    }

    #[inline]
    pub fn index(&self) -> usize {
        (self.0.get() - 1) as usize
    }
}

/// Identifies the value-change series of a unique VCD identifier. Variable
/// declarations that alias the same identifier share one `SignalRef`.
#[derive(Debug, Clone, Copy, Eq, Hash, PartialEq, PartialOrd, Ord)]
#[cfg_attr(feature = "serde1", derive(serde::Serialize, serde::Deserialize))]
pub struct SignalRef(NonZeroU32);

impl SignalRef {
    #[inline]
    pub fn from_index(index: usize) -> Option<Self> {
        NonZeroU32::new(index as u32 + 1).map(Self)
    }

    #[inline]
    pub fn index(&self) -> usize {
        (self.0.get() - 1) as usize
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
#[cfg_attr(feature = "serde1", derive(serde::Serialize, serde::Deserialize))]
pub enum ScopeType {
    Begin,
    Fork,
    Function,
    Module,
    Task,
    /// Only used for the synthetic root scope.
    Root,
}

impl ScopeType {
    /// The scope types accepted after a `$scope` keyword.
    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "begin" => Some(ScopeType::Begin),
            "fork" => Some(ScopeType::Fork),
            "function" => Some(ScopeType::Function),
            "module" => Some(ScopeType::Module),
            "task" => Some(ScopeType::Task),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ScopeType::Begin => "begin",
            ScopeType::Fork => "fork",
            ScopeType::Function => "function",
            ScopeType::Module => "module",
            ScopeType::Task => "task",
            ScopeType::Root => "root",
        }
    }
}

/// Variable type as used by the waveform viewer.
///
/// `Enum` and `Array` are viewer extensions that do not appear in raw VCD.
/// Any var type other than the known ones is carried verbatim in `Other`,
/// since simulators declare `reg`, `integer`, etc. and none of these are
/// errors.
#[derive(Debug, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "serde1", derive(serde::Serialize, serde::Deserialize))]
pub enum SignalKind {
    Wire,
    Real,
    Enum,
    Array,
    Other(String),
}

impl SignalKind {
    pub fn from_token(token: &str) -> Self {
        match token {
            "wire" => SignalKind::Wire,
            "real" => SignalKind::Real,
            "enum" => SignalKind::Enum,
            "array" => SignalKind::Array,
            other => SignalKind::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            SignalKind::Wire => "wire",
            SignalKind::Real => "real",
            SignalKind::Enum => "enum",
            SignalKind::Array => "array",
            SignalKind::Other(other) => other,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde1", derive(serde::Serialize, serde::Deserialize))]
pub enum ScopeOrVarRef {
    Scope(ScopeRef),
    Var(VarRef),
}

#[derive(Debug, Clone, Copy)]
pub enum ScopeOrVar<'a> {
    Scope(&'a Scope),
    Var(&'a Var),
}

const SCOPE_SEPARATOR: char = '.';

#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde1", derive(serde::Serialize, serde::Deserialize))]
pub struct Var {
    name: String,
    kind: SignalKind,
    width: u32,
    signal: SignalRef,
    parent: ScopeRef,
}

impl Var {
    /// Local name of the variable.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> &SignalKind {
        &self.kind
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn signal_ref(&self) -> SignalRef {
        self.signal
    }

    pub fn parent(&self) -> ScopeRef {
        self.parent
    }

    /// Full hierarchical name of the variable, including the `root` prefix.
    pub fn full_name(&self, tree: &ScopeTree) -> String {
        let mut out = tree[self.parent].full_name(tree);
        out.push(SCOPE_SEPARATOR);
        out.push_str(&self.name);
        out
    }
}

#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde1", derive(serde::Serialize, serde::Deserialize))]
pub struct Scope {
    name: String,
    tpe: ScopeType,
    parent: Option<ScopeRef>,
    /// children in declaration order, this order is preserved by the JSON view
    items: Vec<ScopeOrVarRef>,
}

impl Scope {
    /// Local name of the scope.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn scope_type(&self) -> ScopeType {
        self.tpe
    }

    pub fn parent(&self) -> Option<ScopeRef> {
        self.parent
    }

    /// Full hierarchical name of the scope.
    pub fn full_name(&self, tree: &ScopeTree) -> String {
        let mut parents = Vec::new();
        let mut parent = self.parent;
        while let Some(id) = parent {
            parents.push(id);
            parent = tree[id].parent;
        }
        let mut out = String::with_capacity((parents.len() + 1) * 5);
        for parent_id in parents.iter().rev() {
            out.push_str(tree[*parent_id].name());
            out.push(SCOPE_SEPARATOR);
        }
        out.push_str(&self.name);
        out
    }

    /// Returns an iterator over all child scopes and variables in declaration order.
    pub fn items(&self) -> impl Iterator<Item = ScopeOrVarRef> + '_ {
        self.items.iter().copied()
    }

    pub fn scopes(&self) -> impl Iterator<Item = ScopeRef> + '_ {
        self.items().filter_map(|i| match i {
            ScopeOrVarRef::Scope(s) => Some(s),
            ScopeOrVarRef::Var(_) => None,
        })
    }

    pub fn vars(&self) -> impl Iterator<Item = VarRef> + '_ {
        self.items().filter_map(|i| match i {
            ScopeOrVarRef::Scope(_) => None,
            ScopeOrVarRef::Var(v) => Some(v),
        })
    }
}

#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde1", derive(serde::Serialize, serde::Deserialize))]
struct ScopeTreeMetaData {
    /// free text of the `$date`, `$version` and `$timescale` declarations
    date: String,
    version: String,
    timescale: String,
}

/// Hierarchical signal scope tree of a VCD trace, rooted at a synthetic scope
/// named `root`.
///
/// Scopes and variables live in arenas and reference each other through
/// [`ScopeRef`] / [`VarRef`] indices; the value-change series are indexed by
/// [`SignalRef`].
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde1", derive(serde::Serialize, serde::Deserialize))]
pub struct ScopeTree {
    scopes: Vec<Scope>,
    vars: Vec<Var>,
    signals: Vec<Signal>,
    /// canonical declaration of each unique signal
    signal_to_var: Vec<Option<VarRef>>,
    meta: ScopeTreeMetaData,
}

impl ScopeTree {
    pub fn root_ref(&self) -> ScopeRef {
        ScopeRef::from_index(0).unwrap()
    }

    pub fn root(&self) -> &Scope {
        &self.scopes[0]
    }

    pub fn signal(&self, id: SignalRef) -> &Signal {
        &self.signals[id.index()]
    }

    pub fn num_unique_signals(&self) -> usize {
        self.signals.len()
    }

    /// The first declaration that registered the identifier behind `id`.
    pub fn canonical_var(&self, id: SignalRef) -> Option<VarRef> {
        self.signal_to_var.get(id.index()).copied().flatten()
    }

    /// Returns an iterator over all variables (at all levels).
    pub fn iter_vars(&self) -> std::slice::Iter<'_, Var> {
        self.vars.iter()
    }

    /// Returns an iterator over all scopes, starting with the root.
    pub fn iter_scopes(&self) -> std::slice::Iter<'_, Scope> {
        self.scopes.iter()
    }

    pub fn get_item(&self, id: ScopeOrVarRef) -> ScopeOrVar {
        match id {
            ScopeOrVarRef::Scope(id) => ScopeOrVar::Scope(&self[id]),
            ScopeOrVarRef::Var(id) => ScopeOrVar::Var(&self[id]),
        }
    }

    pub fn date(&self) -> &str {
        &self.meta.date
    }

    pub fn version(&self) -> &str {
        &self.meta.version
    }

    /// Free text of the `$timescale` declaration.
    pub fn timescale_str(&self) -> &str {
        &self.meta.timescale
    }

    pub fn timescale(&self) -> Option<Timescale> {
        parse_timescale(&self.meta.timescale)
    }

    /// Finds a scope by its name path below the root.
    pub fn lookup_scope<N: AsRef<str>>(&self, names: &[N]) -> Option<ScopeRef> {
        let prefix = names.first()?.as_ref();
        let mut scope = self.root().scopes().find(|s| self[*s].name() == prefix)?;
        for name in names.iter().skip(1) {
            scope = self[scope].scopes().find(|s| self[*s].name() == name.as_ref())?;
        }
        Some(scope)
    }

    /// Finds a variable by its scope path below the root and its name.
    pub fn lookup_var<N: AsRef<str>>(&self, path: &[N], name: &N) -> Option<VarRef> {
        match path {
            [] => self.root().vars().find(|v| self[*v].name() == name.as_ref()),
            scopes => {
                let scope = &self[self.lookup_scope(scopes)?];
                scope.vars().find(|v| self[*v].name() == name.as_ref())
            }
        }
    }
}

impl Index<VarRef> for ScopeTree {
    type Output = Var;

    fn index(&self, index: VarRef) -> &Self::Output {
        &self.vars[index.index()]
    }
}

impl Index<ScopeRef> for ScopeTree {
    type Output = Scope;

    fn index(&self, index: ScopeRef) -> &Self::Output {
        &self.scopes[index.index()]
    }
}

/// Constructs a [`ScopeTree`] while the declaration section is parsed.
///
/// Keeps a scope stack as the cursor and a per-scope name map in order to
/// detect duplicates and to merge reopened scopes. The name maps are dropped
/// once the tree is finished.
pub struct ScopeTreeBuilder {
    scopes: Vec<Scope>,
    vars: Vec<Var>,
    children: Vec<FxHashMap<String, ScopeOrVarRef>>,
    scope_stack: Vec<ScopeRef>,
    signal_to_var: Vec<Option<VarRef>>,
    meta: ScopeTreeMetaData,
}

impl ScopeTreeBuilder {
    pub fn new() -> Self {
        let root = Scope {
            name: "root".to_string(),
            tpe: ScopeType::Root,
            parent: None,
            items: Vec::new(),
        };
        let root_ref = ScopeRef::from_index(0).unwrap();
        ScopeTreeBuilder {
            scopes: vec![root],
            vars: Vec::new(),
            children: vec![FxHashMap::default()],
            scope_stack: vec![root_ref],
            signal_to_var: Vec::new(),
            meta: ScopeTreeMetaData::default(),
        }
    }

    #[inline]
    pub fn current_scope(&self) -> ScopeRef {
        // the stack always contains at least the root
        *self.scope_stack.last().unwrap()
    }

    /// Looks up a child of the current scope by name.
    pub fn find_child(&self, name: &str) -> Option<ScopeOrVarRef> {
        self.children[self.current_scope().index()].get(name).copied()
    }

    /// Adds a new scope below the cursor and makes it the new cursor.
    /// The caller must have checked that the name is still free.
    pub fn open_scope(&mut self, tpe: ScopeType, name: &str) -> ScopeRef {
        let id = ScopeRef::from_index(self.scopes.len()).unwrap();
        let parent = self.current_scope();
        self.scopes.push(Scope {
            name: name.to_string(),
            tpe,
            parent: Some(parent),
            items: Vec::new(),
        });
        self.children.push(FxHashMap::default());
        self.scopes[parent.index()].items.push(ScopeOrVarRef::Scope(id));
        self.children[parent.index()].insert(name.to_string(), ScopeOrVarRef::Scope(id));
        self.scope_stack.push(id);
        id
    }

    /// Moves the cursor into an existing scope. Used to merge reopened scopes:
    /// new declarations are appended to the children recorded earlier.
    pub fn reenter_scope(&mut self, scope: ScopeRef) {
        self.scope_stack.push(scope);
    }

    /// Moves the cursor to the parent scope. Returns `false` if the cursor is
    /// already at the root.
    pub fn pop_scope(&mut self) -> bool {
        if self.scope_stack.len() > 1 {
            self.scope_stack.pop();
            true
        } else {
            false
        }
    }

    /// Adds a variable declaration below the cursor.
    /// The caller must have checked that the name is still free.
    pub fn add_var(&mut self, name: &str, kind: SignalKind, width: u32, signal: SignalRef) -> VarRef {
        let id = VarRef::from_index(self.vars.len()).unwrap();
        let parent = self.current_scope();
        self.vars.push(Var {
            name: name.to_string(),
            kind,
            width,
            signal,
            parent,
        });
        self.scopes[parent.index()].items.push(ScopeOrVarRef::Var(id));
        self.children[parent.index()].insert(name.to_string(), ScopeOrVarRef::Var(id));
        let handle_idx = signal.index();
        if self.signal_to_var.len() <= handle_idx {
            self.signal_to_var.resize(handle_idx + 1, None);
        }
        // only the canonical declaration is recorded
        if self.signal_to_var[handle_idx].is_none() {
            self.signal_to_var[handle_idx] = Some(id);
        }
        id
    }

    /// Name path of the cursor, used in error messages.
    pub fn current_scope_path(&self) -> String {
        let mut names = Vec::new();
        let mut cursor = Some(self.current_scope());
        while let Some(id) = cursor {
            let scope = &self.scopes[id.index()];
            names.push(scope.name.as_str());
            cursor = scope.parent;
        }
        names.reverse();
        names.join(".")
    }

    pub fn set_date(&mut self, value: String) {
        self.meta.date = value;
    }

    pub fn set_version(&mut self, value: String) {
        self.meta.version = value;
    }

    pub fn set_timescale(&mut self, value: String) {
        self.meta.timescale = value;
    }

    pub fn finish(mut self, signals: Vec<Signal>) -> ScopeTree {
        debug_assert_eq!(self.signal_to_var.len(), signals.len());
        self.scopes.shrink_to_fit();
        self.vars.shrink_to_fit();
        ScopeTree {
            scopes: self.scopes,
            vars: self.vars,
            signals,
            signal_to_var: self.signal_to_var,
            meta: self.meta,
        }
    }
}

impl Default for ScopeTreeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sizes() {
        // the NonZero reference types allow for zero cost optioning
        assert_eq!(std::mem::size_of::<Option<ScopeRef>>(), 4);
        assert_eq!(std::mem::size_of::<ScopeOrVarRef>(), 8);
    }

    #[test]
    fn test_scope_merge_and_paths() {
        let mut b = ScopeTreeBuilder::new();
        let top = b.open_scope(ScopeType::Module, "top");
        let sig = SignalRef::from_index(0).unwrap();
        b.add_var("x", SignalKind::Wire, 1, sig);
        assert_eq!(b.current_scope_path(), "root.top");
        assert!(b.pop_scope());

        // reopening `top` merges into the existing scope
        assert_eq!(b.find_child("top"), Some(ScopeOrVarRef::Scope(top)));
        b.reenter_scope(top);
        b.add_var("y", SignalKind::Wire, 8, SignalRef::from_index(1).unwrap());
        assert!(b.pop_scope());
        // popping the root is not possible
        assert!(!b.pop_scope());

        let tree = b.finish(vec![Signal::default(), Signal::default()]);
        assert_eq!(tree.root().scopes().count(), 1);
        let top = &tree[tree.lookup_scope(&["top"]).unwrap()];
        let names: Vec<_> = top.vars().map(|v| tree[v].name().to_string()).collect();
        assert_eq!(names, ["x", "y"]);
        let x = tree.lookup_var(&["top"], &"x").unwrap();
        assert_eq!(tree[x].full_name(&tree), "root.top.x");
        assert_eq!(tree.canonical_var(sig), Some(x));
    }

    #[test]
    fn test_parse_timescale() {
        assert_eq!(
            parse_timescale("1ns"),
            Some(Timescale::new(1, TimescaleUnit::NanoSeconds))
        );
        assert_eq!(
            parse_timescale("10 ps"),
            Some(Timescale::new(10, TimescaleUnit::PicoSeconds))
        );
        assert_eq!(
            parse_timescale("100 s"),
            Some(Timescale::new(100, TimescaleUnit::Seconds))
        );
        assert_eq!(
            parse_timescale("7 lightyears"),
            Some(Timescale::new(7, TimescaleUnit::Unknown))
        );
        assert_eq!(parse_timescale(""), None);
        assert_eq!(parse_timescale("ns"), None);
    }
}
