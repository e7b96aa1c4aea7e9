// Copyright 2023-2024 The Regents of the University of California
// Copyright 2024-2025 Cornell University
// released under BSD 3-Clause License
// author: Kevin Laeufer <laeufer@cornell.edu>

/// A single space separated word from the input together with the 0-based
/// number of the line it was found on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token<'a> {
    pub line: u32,
    pub word: &'a str,
}

/// Lazily splits the VCD text into [`Token`]s. The stream cannot be restarted;
/// the declaration parser and the value-change processor share a single cursor.
///
/// Lines are separated by CRLF, LFCR, LF or CR. Within a line, words are
/// separated by single space characters and empty words are skipped. The line
/// counter advances for every source line, even if the line yields no tokens.
pub struct Tokenizer<'a> {
    remaining: &'a str,
    words: std::str::Split<'a, char>,
    line: u32,
    next_line_no: u32,
    done: bool,
}

impl<'a> Tokenizer<'a> {
    pub fn new(input: &'a str) -> Self {
        Tokenizer {
            remaining: input,
            words: "".split(' '),
            line: 0,
            next_line_no: 0,
            done: false,
        }
    }

    /// Advances to the next source line. Returns `None` once the input is exhausted.
    fn next_line(&mut self) -> Option<&'a str> {
        if self.done {
            return None;
        }
        self.line = self.next_line_no;
        self.next_line_no += 1;
        let rest = self.remaining;
        match rest.find(['\n', '\r']) {
            Some(pos) => {
                let bytes = rest.as_bytes();
                // CRLF and LFCR count as a single line break
                let sep_len = match (bytes[pos], bytes.get(pos + 1)) {
                    (b'\r', Some(b'\n')) | (b'\n', Some(b'\r')) => 2,
                    _ => 1,
                };
                self.remaining = &rest[pos + sep_len..];
                Some(&rest[..pos])
            }
            None => {
                self.done = true;
                Some(rest)
            }
        }
    }
}

impl<'a> Iterator for Tokenizer<'a> {
    type Item = Token<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            for word in self.words.by_ref() {
                if !word.is_empty() {
                    return Some(Token {
                        line: self.line,
                        word,
                    });
                }
            }
            let line = self.next_line()?;
            self.words = line.split(' ');
        }
    }
}
