// Copyright 2023-2024 The Regents of the University of California
// Copyright 2024-2025 Cornell University
// released under BSD 3-Clause License
// author: Kevin Laeufer <laeufer@cornell.edu>

use crate::hierarchy::{ScopeOrVarRef, ScopeTreeBuilder, ScopeType, SignalKind, SignalRef};
use crate::signals::{Signal, Time};
use crate::tokens::{Token, Tokenizer};
use rustc_hash::FxHashMap;

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum VcdParseError {
    #[error("[vcd] line {0}: expected a declaration keyword, got `{1}`")]
    ExpectedDeclarationKeyword(u32, String),
    #[error("[vcd] line {0}: unknown or invalid command: `{1}`")]
    UnknownCommand(u32, String),
    #[error("[vcd] line {0}: missing `$end` for `{1}`")]
    MissingEnd(u32, String),
    #[error("[vcd] line {0}: expected `$end`, got `{1}`")]
    ExpectedEnd(u32, String),
    #[error("[vcd] line {0}: `{1}` is not a valid scope type")]
    UnknownScopeType(u32, String),
    #[error("[vcd] line {0}: `$upscope` without an enclosing scope")]
    UpScopeWithoutParent(u32),
    #[error("[vcd] line {0}: duplicated id `{1}` in scope `{2}`")]
    DuplicateName(u32, String, String),
    #[error("[vcd] line {0}: `{1}` is a variable and cannot be reopened as a scope")]
    ScopeRedeclaresVar(u32, String),
    #[error("[vcd] line {0}: unexpected number of tokens for `$var`: `{1}`")]
    VarUnexpectedNumberOfTokens(u32, String),
    #[error("[vcd] line {0}: failed to parse width `{1}` for variable `{2}`")]
    VarWidthParsing(u32, String, String),
    #[error("[vcd] line {0}: failed to parse time `{1}`")]
    TimeParsing(u32, String),
    #[error("[vcd] line {0}: expected an identifier after the value `{1}`")]
    MissingIdentifier(u32, String),
    #[error("[vcd] line {0}: `$end` before `$enddefinitions`")]
    DanglingEnd(u32),
    #[error("[vcd] reached the end of the input before `$enddefinitions`")]
    MissingEndOfDeclarations,
}

pub type Result<T> = std::result::Result<T, VcdParseError>;

/// A recoverable problem encountered in the value-change section.
///
/// Soft errors are reported through a [`DiagnosticSink`] and never abort the
/// parse or corrupt previously collected data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Diagnostic {
    /// A value change referenced an identifier that was never declared.
    UnknownIdentifier { line: u32, id: String },
    /// A `#` marker moved the simulation time backwards.
    NonMonotonicTime { line: u32, from: Time, to: Time },
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Diagnostic::UnknownIdentifier { line, id } => {
                write!(f, "[vcd] line {line}: unknown identifier `{id}`")
            }
            Diagnostic::NonMonotonicTime { line, from, to } => {
                write!(f, "[vcd] line {line}: time moves backwards from {from} to {to}")
            }
        }
    }
}

pub trait DiagnosticSink {
    fn report(&mut self, diagnostic: Diagnostic);
}

/// Accumulates diagnostics for later inspection.
impl DiagnosticSink for Vec<Diagnostic> {
    fn report(&mut self, diagnostic: Diagnostic) {
        self.push(diagnostic);
    }
}

/// The default sink which forwards every diagnostic to [`log::warn!`].
pub struct LogDiagnostics;

impl DiagnosticSink for LogDiagnostics {
    fn report(&mut self, diagnostic: Diagnostic) {
        log::warn!("{diagnostic}");
    }
}

/// Parses a complete VCD trace into a [`crate::ScopeTree`], logging soft
/// errors through the [`log`] crate.
pub fn parse(input: &str) -> Result<crate::ScopeTree> {
    parse_with_diagnostics(input, &mut LogDiagnostics)
}

/// Parses a complete VCD trace, reporting soft errors to the supplied sink.
pub fn parse_with_diagnostics(
    input: &str,
    diagnostics: &mut impl DiagnosticSink,
) -> Result<crate::ScopeTree> {
    let parser = VcdParser {
        tokens: Tokenizer::new(input),
        builder: ScopeTreeBuilder::new(),
        signals: Vec::new(),
        id_to_signal: FxHashMap::default(),
        now: 0,
        diag: diagnostics,
    };
    parser.parse()
}

/// State of one parse invocation: the shared token cursor, the tree under
/// construction, the current simulation time and the identifier maps.
struct VcdParser<'a, 'd, D: DiagnosticSink> {
    tokens: Tokenizer<'a>,
    builder: ScopeTreeBuilder,
    /// value-change series indexed by [`SignalRef`], attached to the tree at the end
    signals: Vec<Signal>,
    /// VCD identifier to its canonical signal, keys borrow from the input
    id_to_signal: FxHashMap<&'a str, SignalRef>,
    now: Time,
    diag: &'d mut D,
}

impl<'a, 'd, D: DiagnosticSink> VcdParser<'a, 'd, D> {
    fn parse(mut self) -> Result<crate::ScopeTree> {
        self.parse_declarations()?;
        self.parse_changes()?;
        Ok(self.builder.finish(self.signals))
    }

    /// Declaration phase: every token must start a recognized keyword until
    /// `$enddefinitions` hands control to the value-change processor.
    fn parse_declarations(&mut self) -> Result<()> {
        loop {
            let token = self
                .tokens
                .next()
                .ok_or(VcdParseError::MissingEndOfDeclarations)?;
            match token.word {
                "$comment" => self.drop_until_end(&token)?,
                "$date" | "$version" | "$timescale" => self.save_declaration(&token)?,
                "$scope" => self.parse_scope(&token)?,
                "$upscope" => self.parse_upscope(&token)?,
                "$var" => self.parse_var(&token)?,
                "$enddefinitions" => {
                    self.drop_until_end(&token)?;
                    return Ok(());
                }
                "$end" => return Err(VcdParseError::DanglingEnd(token.line)),
                word if word.starts_with('$') => {
                    return Err(VcdParseError::UnknownCommand(token.line, word.to_string()))
                }
                word => {
                    return Err(VcdParseError::ExpectedDeclarationKeyword(
                        token.line,
                        word.to_string(),
                    ))
                }
            }
        }
    }

    /// Single forward pass over the simulation section, dispatching on the
    /// first character of each token.
    fn parse_changes(&mut self) -> Result<()> {
        while let Some(token) = self.tokens.next() {
            match token.word.as_bytes()[0] {
                b'#' => self.set_now(&token)?,
                b'$' => match token.word {
                    "$dumpall" | "$dumpoff" | "$dumpon" | "$dumpvars" => {
                        self.parse_value_change_list()?
                    }
                    "$comment" => self.drop_until_end(&token)?,
                    // confirms that the definitions have already ended
                    "$end" => {}
                    word => {
                        return Err(VcdParseError::UnknownCommand(token.line, word.to_string()))
                    }
                },
                _ => self.parse_value_change(token)?,
            }
        }
        Ok(())
    }

    /// Drains the value changes of a `$dumpall`/`$dumpoff`/`$dumpon`/`$dumpvars`
    /// block. Time markers are allowed inside and some dialects omit the
    /// terminating `$end` at the end of the input.
    fn parse_value_change_list(&mut self) -> Result<()> {
        while let Some(token) = self.tokens.next() {
            if token.word.starts_with('$') {
                if token.word == "$end" {
                    return Ok(());
                }
                return Err(VcdParseError::ExpectedEnd(
                    token.line,
                    token.word.to_string(),
                ));
            }
            self.parse_value_change(token)?;
        }
        Ok(())
    }

    /// Applies a single value change. Vector and string values carry the
    /// identifier in the following token, 1-bit values carry it in the same
    /// token right after the value character.
    fn parse_value_change(&mut self, token: Token<'a>) -> Result<()> {
        let (value, id) = match token.word.as_bytes()[0] {
            b'b' | b'B' | b'r' | b'R' => (token.word, self.pop_identifier(&token)?),
            b's' | b'S' => (&token.word[1..], self.pop_identifier(&token)?),
            // some dialects omit the `$end` of a dump block, so a time marker
            // inside a value-change list is a time update and not an error
            b'#' => return self.set_now(&token),
            _ => {
                let split = token.word.chars().next().map(char::len_utf8).unwrap_or(0);
                (&token.word[..split], &token.word[split..])
            }
        };
        match self.id_to_signal.get(id) {
            Some(signal) => {
                self.signals[signal.index()].push_change(self.now, value.to_string());
            }
            // soft failure: report and keep parsing
            None => self.diag.report(Diagnostic::UnknownIdentifier {
                line: token.line,
                id: id.to_string(),
            }),
        }
        Ok(())
    }

    fn pop_identifier(&mut self, value: &Token<'a>) -> Result<&'a str> {
        match self.tokens.next() {
            Some(token) => Ok(token.word),
            None => Err(VcdParseError::MissingIdentifier(
                value.line,
                value.word.to_string(),
            )),
        }
    }

    /// Updates the simulation time from a `#<time>` marker. Following the
    /// float fallback of other VCD readers, a fractional representation of an
    /// integer (`#8.0`) is accepted while a true fraction (`#1.5`) is not.
    fn set_now(&mut self, token: &Token<'a>) -> Result<()> {
        let digits = &token.word[1..];
        let value = match digits.parse::<Time>() {
            Ok(value) => value,
            Err(_) => match digits.parse::<f64>() {
                Ok(value) if value.fract() == 0.0 && value >= 0.0 => value as Time,
                _ => {
                    return Err(VcdParseError::TimeParsing(
                        token.line,
                        token.word.to_string(),
                    ))
                }
            },
        };
        if value < self.now {
            self.diag.report(Diagnostic::NonMonotonicTime {
                line: token.line,
                from: self.now,
                to: value,
            });
        }
        self.now = value;
        Ok(())
    }

    /// `$scope <type> <name> $end`: pushes a new child scope, or re-enters an
    /// existing scope of the same name so that reopened scopes merge.
    fn parse_scope(&mut self, keyword: &Token<'a>) -> Result<()> {
        let tpe_token = self.pop_word(keyword)?;
        let tpe = ScopeType::from_token(tpe_token.word).ok_or_else(|| {
            VcdParseError::UnknownScopeType(tpe_token.line, tpe_token.word.to_string())
        })?;
        let name_token = self.pop_word(keyword)?;
        self.pop_end(keyword)?;
        match self.builder.find_child(name_token.word) {
            Some(ScopeOrVarRef::Scope(existing)) => self.builder.reenter_scope(existing),
            Some(ScopeOrVarRef::Var(_)) => {
                return Err(VcdParseError::ScopeRedeclaresVar(
                    name_token.line,
                    name_token.word.to_string(),
                ))
            }
            None => {
                self.builder.open_scope(tpe, name_token.word);
            }
        }
        Ok(())
    }

    fn parse_upscope(&mut self, keyword: &Token<'a>) -> Result<()> {
        if !self.builder.pop_scope() {
            return Err(VcdParseError::UpScopeWithoutParent(keyword.line));
        }
        self.pop_end(keyword)
    }

    /// `$var <type> <width> <id> <reference> ... $end`: the first four tokens
    /// are positional, trailing tokens like bit-range annotations are ignored.
    fn parse_var(&mut self, keyword: &Token<'a>) -> Result<()> {
        let body = self.words_until_end(keyword)?;
        if body.len() < 4 {
            return Err(VcdParseError::VarUnexpectedNumberOfTokens(
                keyword.line,
                body.join(" "),
            ));
        }
        let (tpe, width_str, id, reference) = (body[0], body[1], body[2], body[3]);
        let width = width_str.parse::<u32>().map_err(|_| {
            VcdParseError::VarWidthParsing(
                keyword.line,
                width_str.to_string(),
                reference.to_string(),
            )
        })?;
        if self.builder.find_child(reference).is_some() {
            return Err(VcdParseError::DuplicateName(
                keyword.line,
                reference.to_string(),
                self.builder.current_scope_path(),
            ));
        }
        // an already known id makes this declaration an alias of the
        // canonical one, sharing its value-change series
        let signal = match self.id_to_signal.get(id) {
            Some(signal) => *signal,
            None => {
                let signal = SignalRef::from_index(self.signals.len()).unwrap();
                self.signals.push(Signal::default());
                self.id_to_signal.insert(id, signal);
                signal
            }
        };
        self.builder
            .add_var(reference, SignalKind::from_token(tpe), width, signal);
        Ok(())
    }

    /// `$date`/`$version`/`$timescale`: stores the tokens up to `$end` joined
    /// with single spaces under the keyword.
    fn save_declaration(&mut self, keyword: &Token<'a>) -> Result<()> {
        let value = self.words_until_end(keyword)?.join(" ");
        match keyword.word {
            "$date" => self.builder.set_date(value),
            "$version" => self.builder.set_version(value),
            "$timescale" => self.builder.set_timescale(value),
            other => unreachable!("not a property declaration: {other}"),
        }
        Ok(())
    }

    /// Collects the words of the current command up to the literal `$end`.
    fn words_until_end(&mut self, keyword: &Token<'a>) -> Result<Vec<&'a str>> {
        let mut words = Vec::new();
        for token in self.tokens.by_ref() {
            if token.word == "$end" {
                return Ok(words);
            }
            words.push(token.word);
        }
        Err(VcdParseError::MissingEnd(
            keyword.line,
            keyword.word.to_string(),
        ))
    }

    fn drop_until_end(&mut self, keyword: &Token<'a>) -> Result<()> {
        for token in self.tokens.by_ref() {
            if token.word == "$end" {
                return Ok(());
            }
        }
        Err(VcdParseError::MissingEnd(
            keyword.line,
            keyword.word.to_string(),
        ))
    }

    fn pop_word(&mut self, keyword: &Token<'a>) -> Result<Token<'a>> {
        self.tokens.next().ok_or_else(|| {
            VcdParseError::MissingEnd(keyword.line, keyword.word.to_string())
        })
    }

    fn pop_end(&mut self, keyword: &Token<'a>) -> Result<()> {
        let token = self.pop_word(keyword)?;
        if token.word == "$end" {
            Ok(())
        } else {
            Err(VcdParseError::ExpectedEnd(token.line, token.word.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn changes(tree: &crate::ScopeTree, path: &[&str], name: &str) -> Vec<(Time, String)> {
        let var = &tree[tree.lookup_var(path, &name).unwrap()];
        tree.signal(var.signal_ref()).changes().to_vec()
    }

    #[test]
    fn test_value_change_classification() {
        let input = "$scope module top $end
$var wire 1 ! a $end
$var wire 8 \" b $end
$var real 64 # c $end
$var string 0 $ d $end
$enddefinitions $end
#0
1!
b10100110 \"
r1.5 #
sHELLO $
#10
x!
";
        let tree = parse(input).unwrap();
        assert_eq!(
            changes(&tree, &["top"], "a"),
            [(0, "1".to_string()), (10, "x".to_string())]
        );
        // vector values keep their prefix, string values lose it
        assert_eq!(changes(&tree, &["top"], "b"), [(0, "b10100110".to_string())]);
        assert_eq!(changes(&tree, &["top"], "c"), [(0, "r1.5".to_string())]);
        assert_eq!(changes(&tree, &["top"], "d"), [(0, "HELLO".to_string())]);
    }

    #[test]
    fn test_unknown_identifier_is_soft() {
        let input = "$scope module top $end
$var wire 1 ! a $end
$enddefinitions $end
#0
1!
1?
#4
0!
";
        let mut diagnostics = Vec::new();
        let tree = parse_with_diagnostics(input, &mut diagnostics).unwrap();
        assert_eq!(
            diagnostics,
            [Diagnostic::UnknownIdentifier {
                line: 5,
                id: "?".to_string()
            }]
        );
        // data collected before and after the bad token is unaffected
        assert_eq!(
            changes(&tree, &["top"], "a"),
            [(0, "1".to_string()), (4, "0".to_string())]
        );
    }

    #[test]
    fn test_non_monotonic_time_diagnostic() {
        let input = "$enddefinitions $end #5 #3";
        let mut diagnostics = Vec::new();
        parse_with_diagnostics(input, &mut diagnostics).unwrap();
        assert_eq!(
            diagnostics,
            [Diagnostic::NonMonotonicTime {
                line: 0,
                from: 5,
                to: 3
            }]
        );
    }

    #[test]
    fn test_time_parsing() {
        // a float representation of an integer time is accepted
        let tree =
            parse("$var wire 1 ! x $end $enddefinitions $end #8.000 1!").unwrap();
        assert_eq!(changes(&tree, &[], "x"), [(8, "1".to_string())]);

        // a true fraction is not
        let err = parse("$enddefinitions $end #1.5").unwrap_err();
        assert!(matches!(err, VcdParseError::TimeParsing(0, _)));
    }

    #[test]
    fn test_missing_identifier_is_fatal() {
        // a vector value at the very end of the input, with no identifier token left
        let err = parse("$var wire 3 ! x $end $enddefinitions $end #0 b101").unwrap_err();
        match err {
            VcdParseError::MissingIdentifier(line, value) => {
                assert_eq!(line, 0);
                assert_eq!(value, "b101");
            }
            other => panic!("expected a missing identifier error, got {other}"),
        }
        // same for a string value
        let err = parse("$var string 0 ! x $end $enddefinitions $end #0 sabc").unwrap_err();
        assert!(matches!(err, VcdParseError::MissingIdentifier(0, _)));
    }

    #[test]
    fn test_dangling_end_in_declarations() {
        let err = parse("$end").unwrap_err();
        assert!(matches!(err, VcdParseError::DanglingEnd(0)));
    }

    #[test]
    fn test_missing_end_terminator() {
        let err = parse("$date 2024").unwrap_err();
        assert!(matches!(err, VcdParseError::MissingEnd(0, _)));
    }

    #[test]
    fn test_declaration_properties() {
        let input = "$date
   Mon Feb 22 19:49:29 2021
$end
$version Verilator $end
$timescale 1ns $end
$enddefinitions $end
";
        let tree = parse(input).unwrap();
        assert_eq!(tree.date(), "Mon Feb 22 19:49:29 2021");
        assert_eq!(tree.version(), "Verilator");
        assert_eq!(tree.timescale_str(), "1ns");
        assert_eq!(
            tree.timescale(),
            Some(crate::Timescale::new(1, crate::TimescaleUnit::NanoSeconds))
        );
    }
}
