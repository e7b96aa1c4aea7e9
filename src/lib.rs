// Copyright 2023-2024 The Regents of the University of California
// Copyright 2024-2025 Cornell University
// released under BSD 3-Clause License
// author: Kevin Laeufer <laeufer@cornell.edu>

//! Parses Value Change Dump (VCD) traces into a hierarchical signal scope
//! tree with per-signal, time-ordered value-change series, plus a JSON
//! projection of that tree for waveform viewers.

mod hierarchy;
mod json;
mod signals;
mod tokens;
mod vcd;

/// Cargo.toml version of this library.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub use hierarchy::{
    Scope, ScopeOrVar, ScopeOrVarRef, ScopeRef, ScopeTree, ScopeType, SignalKind, SignalRef,
    Timescale, TimescaleUnit, Var, VarRef,
};
pub use signals::{Signal, Time};
pub use vcd::{
    parse, parse_with_diagnostics, Diagnostic, DiagnosticSink, LogDiagnostics, Result,
    VcdParseError,
};
