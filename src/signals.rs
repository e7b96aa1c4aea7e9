// Copyright 2023-2024 The Regents of the University of California
// Copyright 2024-2025 Cornell University
// released under BSD 3-Clause License
// author: Kevin Laeufer <laeufer@cornell.edu>

pub type Time = u64;

/// Time ordered value-change series of a unique VCD identifier.
///
/// All variable declarations that alias the same identifier point to the same
/// `Signal`, thus a change applied through one alias is observable through all
/// of them. Values are kept verbatim as they appear in the trace.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde1", derive(serde::Serialize, serde::Deserialize))]
pub struct Signal {
    changes: Vec<(Time, String)>,
}

impl Signal {
    pub fn changes(&self) -> &[(Time, String)] {
        &self.changes
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    /// Time of the last recorded change.
    pub fn last_time(&self) -> Option<Time> {
        self.changes.last().map(|(time, _)| *time)
    }

    pub(crate) fn push_change(&mut self, time: Time, value: String) {
        self.changes.push((time, value));
    }
}
