//! Streaming tokenizer for the circuit definition language.
//!
//! Reads the whole source up front (the file is small and the scanner needs
//! its lines cached anyway for [`Scanner::format_error`]), then walks it one
//! character at a time with a single-character lookahead.

use std::fs;
use std::io;
use std::path::Path;

use logsim_names::{Keyword, NameId, SharedNames};

/// The kind of token a [`Symbol`] represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolKind {
    Comma,
    Semicolon,
    Colon,
    Arrow,
    Dot,
    Keyword,
    Number,
    Name,
    Eof,
}

/// The payload carried by a `KEYWORD`, `NAME`, or `NUMBER` symbol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SymbolId {
    /// `NAME` or `KEYWORD`: the interned identifier.
    Name(NameId),
    /// `NUMBER`, default context: the parsed integer.
    Integer(i64),
    /// `NUMBER` after a `SWITCH`: the single digit, or the sentinel `2` if
    /// the digit run had more than one digit.
    Bit(u8),
    /// `NUMBER` after a `SIGGEN`: the raw digit string, preserving leading
    /// zeros and any non-binary digits for the device layer to reject.
    Raw(String),
}

/// A tagged token with position information.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Symbol {
    pub kind: SymbolKind,
    pub id: Option<SymbolId>,
    pub line: u32,
    pub column: u32,
}

impl Symbol {
    fn new(kind: SymbolKind, line: u32, column: u32) -> Self {
        Self { kind, id: None, line, column }
    }

    #[must_use]
    pub fn is_eof(&self) -> bool {
        self.kind == SymbolKind::Eof
    }

    /// The `NameId` carried by a `NAME`/`KEYWORD` symbol, if any.
    #[must_use]
    pub fn name_id(&self) -> Option<NameId> {
        match self.id {
            Some(SymbolId::Name(id)) => Some(id),
            _ => None,
        }
    }
}

/// Context that changes how a following digit run is interpreted, set by
/// the most recently scanned `NAME`/`KEYWORD`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PendingContext {
    Siggen,
    Switch,
}

/// Tokenizes a circuit definition source, tracking line/column and caching
/// the source's lines for diagnostic formatting.
pub struct Scanner {
    names: SharedNames,
    chars: Vec<char>,
    index: usize,
    current: Option<char>,
    line: u32,
    column: u32,
    pending_context: Option<PendingContext>,
    lines: Vec<String>,
}

impl Scanner {
    /// Opens `path` and prepares to scan it.
    pub fn new(path: impl AsRef<Path>, names: SharedNames) -> io::Result<Self> {
        let source = fs::read_to_string(path)?;
        Ok(Self::from_source(&source, names))
    }

    /// Builds a scanner directly from in-memory source, primarily for tests.
    #[must_use]
    pub fn from_source(source: &str, names: SharedNames) -> Self {
        let chars: Vec<char> = source.chars().collect();
        let lines: Vec<String> = source.lines().map(str::to_string).collect();
        let mut scanner = Self {
            names,
            chars,
            index: 0,
            current: None,
            line: 1,
            column: 1,
            pending_context: None,
            lines,
        };
        scanner.current = scanner.chars.first().copied();
        scanner
    }

    /// Translates the next sequence of characters into a [`Symbol`].
    pub fn next_symbol(&mut self) -> Symbol {
        loop {
            self.skip_horizontal_whitespace();
            match self.current {
                None => return Symbol::new(SymbolKind::Eof, self.line, self.column),
                Some('\n') => {
                    self.advance();
                    continue;
                }
                Some('#') => {
                    self.skip_line_comment();
                    continue;
                }
                Some('/') => {
                    match self.skip_slash() {
                        SlashOutcome::ResumeScanning => continue,
                        SlashOutcome::Eof => return Symbol::new(SymbolKind::Eof, self.line, self.column),
                    }
                }
                Some(c) if c.is_alphabetic() => return self.scan_name(),
                Some(c) if c.is_ascii_digit() => return self.scan_number(),
                Some(';') => return self.single_char_symbol(SymbolKind::Semicolon),
                Some('>') => return self.single_char_symbol(SymbolKind::Arrow),
                Some(',') => return self.single_char_symbol(SymbolKind::Comma),
                Some(':') => return self.single_char_symbol(SymbolKind::Colon),
                Some('.') => return self.single_char_symbol(SymbolKind::Dot),
                Some(c) => {
                    log::trace!("skipping invalid character {c:?} at {}:{}", self.line, self.column);
                    self.advance();
                    continue;
                }
            }
        }
    }

    /// Renders the source line containing `symbol`, with a caret pointing at
    /// its first character.
    #[must_use]
    pub fn format_error(&self, symbol: &Symbol) -> String {
        let line = self
            .lines
            .get(symbol.line.saturating_sub(1) as usize)
            .map(String::as_str)
            .unwrap_or("");
        let padding = " ".repeat(symbol.column.saturating_sub(1) as usize);
        format!("{line}\n{padding}^")
    }

    fn single_char_symbol(&mut self, kind: SymbolKind) -> Symbol {
        let symbol = Symbol::new(kind, self.line, self.column);
        self.pending_context = None;
        self.advance();
        symbol
    }

    fn scan_name(&mut self) -> Symbol {
        let line = self.line;
        let column = self.column;
        let mut name = String::new();
        while let Some(c) = self.current {
            if c.is_alphanumeric() {
                name.push(c);
                self.advance();
            } else {
                break;
            }
        }

        let mut names = self.names.borrow_mut();
        let id = names.intern(&name);
        let keyword = names.as_keyword(id);
        drop(names);

        self.pending_context = match keyword {
            Some(Keyword::Siggen) => Some(PendingContext::Siggen),
            Some(Keyword::Switch) => Some(PendingContext::Switch),
            _ => None,
        };

        let kind = if keyword.is_some() { SymbolKind::Keyword } else { SymbolKind::Name };
        let mut symbol = Symbol::new(kind, line, column);
        symbol.id = Some(SymbolId::Name(id));
        symbol
    }

    fn scan_number(&mut self) -> Symbol {
        let line = self.line;
        let column = self.column;
        let mut digits = String::new();
        while let Some(c) = self.current {
            if c.is_ascii_digit() {
                digits.push(c);
                self.advance();
            } else {
                break;
            }
        }

        let id = match self.pending_context {
            Some(PendingContext::Siggen) => SymbolId::Raw(digits),
            Some(PendingContext::Switch) => {
                let bit = if digits.len() > 1 {
                    2
                } else {
                    digits.parse::<u8>().unwrap_or(2)
                };
                SymbolId::Bit(bit)
            }
            None => SymbolId::Integer(digits.parse::<i64>().unwrap_or(i64::MAX)),
        };

        let mut symbol = Symbol::new(SymbolKind::Number, line, column);
        symbol.id = Some(id);
        symbol
    }

    fn skip_horizontal_whitespace(&mut self) {
        while matches!(self.current, Some(' ' | '\t')) {
            self.advance();
        }
    }

    fn skip_line_comment(&mut self) {
        while !matches!(self.current, None | Some('\n')) {
            self.advance();
        }
    }

    /// Handles a `/` seen outside a name/number: either the start of a
    /// `/* ... */` block comment, or an invalid bare slash to be skipped.
    fn skip_slash(&mut self) -> SlashOutcome {
        self.advance(); // consume '/'
        if self.current != Some('*') {
            // Bare slash: invalid character, already consumed. Retry.
            return SlashOutcome::ResumeScanning;
        }
        self.advance(); // consume '*'
        loop {
            match self.current {
                None => return SlashOutcome::Eof,
                Some('*') => {
                    self.advance();
                    if self.current == Some('/') {
                        self.advance();
                        return SlashOutcome::ResumeScanning;
                    }
                }
                Some(_) => self.advance(),
            }
        }
    }

    /// Moves to the next character, updating line/column. Tabs count as 4
    /// columns; newlines reset the column and advance the line.
    fn advance(&mut self) {
        match self.current {
            Some('\n') => {
                self.line += 1;
                self.column = 1;
            }
            Some('\t') => self.column += 4,
            Some(_) => self.column += 1,
            None => {}
        }
        self.index += 1;
        self.current = self.chars.get(self.index).copied();
    }
}

enum SlashOutcome {
    ResumeScanning,
    Eof,
}

#[cfg(test)]
mod tests {
    use super::*;
    use logsim_names::NameTable;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn scanner(source: &str) -> Scanner {
        let names = Rc::new(RefCell::new(NameTable::new()));
        Scanner::from_source(source, names)
    }

    fn all_kinds(source: &str) -> Vec<SymbolKind> {
        let mut scanner = scanner(source);
        let mut kinds = Vec::new();
        loop {
            let symbol = scanner.next_symbol();
            let is_eof = symbol.is_eof();
            kinds.push(symbol.kind);
            if is_eof {
                break;
            }
        }
        kinds
    }

    #[test]
    fn tokenizes_punctuation() {
        let kinds = all_kinds(", ; : > .");
        assert_eq!(
            kinds,
            vec![
                SymbolKind::Comma,
                SymbolKind::Semicolon,
                SymbolKind::Colon,
                SymbolKind::Arrow,
                SymbolKind::Dot,
                SymbolKind::Eof,
            ]
        );
    }

    #[test]
    fn recognises_keywords_and_names() {
        let mut scanner = scanner("DEVICES D1 AND");
        let devices = scanner.next_symbol();
        assert_eq!(devices.kind, SymbolKind::Keyword);
        let d1 = scanner.next_symbol();
        assert_eq!(d1.kind, SymbolKind::Name);
        let and = scanner.next_symbol();
        assert_eq!(and.kind, SymbolKind::Keyword);
    }

    #[test]
    fn line_comment_is_skipped() {
        let kinds = all_kinds("DEVICES # a trailing comment\nEND");
        assert_eq!(kinds, vec![SymbolKind::Keyword, SymbolKind::Keyword, SymbolKind::Eof]);
    }

    #[test]
    fn block_comment_is_skipped() {
        let kinds = all_kinds("DEVICES /* spans\nlines */ END");
        assert_eq!(kinds, vec![SymbolKind::Keyword, SymbolKind::Keyword, SymbolKind::Eof]);
    }

    #[test]
    fn unterminated_block_comment_yields_eof() {
        let kinds = all_kinds("DEVICES /* never closed");
        assert_eq!(kinds, vec![SymbolKind::Keyword, SymbolKind::Eof]);
    }

    #[test]
    fn bare_slash_is_skipped_as_invalid() {
        let kinds = all_kinds("DEVICES / END");
        assert_eq!(kinds, vec![SymbolKind::Keyword, SymbolKind::Keyword, SymbolKind::Eof]);
    }

    #[test]
    fn default_number_context_parses_integer() {
        let mut scanner = scanner("AND 4");
        let _ = scanner.next_symbol();
        let number = scanner.next_symbol();
        assert_eq!(number.id, Some(SymbolId::Integer(4)));
    }

    #[test]
    fn switch_context_flags_multidigit_as_sentinel() {
        let mut scanner = scanner("SWITCH 12");
        let _ = scanner.next_symbol();
        let number = scanner.next_symbol();
        assert_eq!(number.id, Some(SymbolId::Bit(2)));
    }

    #[test]
    fn switch_context_single_digit_is_itself() {
        let mut scanner = scanner("SWITCH 1");
        let _ = scanner.next_symbol();
        let number = scanner.next_symbol();
        assert_eq!(number.id, Some(SymbolId::Bit(1)));
    }

    #[test]
    fn siggen_context_preserves_leading_zeros() {
        let mut scanner = scanner("SIGGEN 0011");
        let _ = scanner.next_symbol();
        let number = scanner.next_symbol();
        assert_eq!(number.id, Some(SymbolId::Raw("0011".to_string())));
    }

    #[test]
    fn tracks_line_and_column() {
        let mut scanner = scanner("DEVICES\n  D1");
        let devices = scanner.next_symbol();
        assert_eq!((devices.line, devices.column), (1, 1));
        let d1 = scanner.next_symbol();
        assert_eq!((d1.line, d1.column), (2, 3));
    }

    #[test]
    fn tab_advances_column_by_four() {
        let mut scanner = scanner("\tD1");
        let d1 = scanner.next_symbol();
        assert_eq!(d1.column, 5);
    }

    #[test]
    fn format_error_places_caret_under_symbol() {
        let mut scanner = scanner("DEVICES D2:DTYPE 3,\nEND");
        // Walk to the NUMBER token for the stray "3".
        for _ in 0..4 {
            scanner.next_symbol();
        }
        let number = scanner.next_symbol();
        let rendered = scanner.format_error(&number);
        assert_eq!(rendered, "DEVICES D2:DTYPE 3,\n                  ^");
    }
}
