//! Line-oriented scanner that extracts call sites and top-level definitions.
//!
//! Every line is first classified (comment, `class` header, top-level
//! `function` header, ordinary code). Ordinary code is then fed character by
//! character through a three-state automaton:
//!
//! ```text
//! Normal --(ident start after pre-symbol)--> StartMemorize
//! StartMemorize --(ident char)--> StartMemorize
//! StartMemorize --('(')--> StopMemorize --(emit)--> Normal
//! StartMemorize --(anything else)--> Normal
//! ```
//!
//! The scanner never fails; malformed input only degrades classification.

use std::sync::OnceLock;

use regex::Regex;

use crate::table::{is_identifier_char, is_identifier_start, is_valid_function_name};

const COMMENT_MARKERS: [&str; 4] = ["/**", "/*", "*", "//"];
const PRE_SYMBOLS: [char; 8] = [' ', '\t', '\n', '\r', '(', '!', '@', '&'];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LexState {
    Normal,
    StartMemorize,
    StopMemorize,
}

/// What the automaton does with a single character.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Ignore,
    Begin,
    Extend,
    Close,
    Abort,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanEvent {
    Call(String),
    Definition { name: String, line: usize },
}

/// Whether `prev` (None at the start of a line) may precede a captured identifier.
pub fn accepts_pre_symbol(prev: Option<char>) -> bool {
    prev.map_or(true, |ch| PRE_SYMBOLS.contains(&ch))
}

/// Pure transition function of the capture automaton.
pub fn transition(state: LexState, ch: char, prev: Option<char>) -> Transition {
    match state {
        LexState::Normal if is_identifier_start(ch) && accepts_pre_symbol(prev) => {
            Transition::Begin
        }
        LexState::Normal => Transition::Ignore,
        LexState::StartMemorize if is_identifier_char(ch) => Transition::Extend,
        LexState::StartMemorize if ch == '(' => Transition::Close,
        LexState::StartMemorize => Transition::Abort,
        // Settled by the scanner before the next character is read.
        LexState::StopMemorize => Transition::Ignore,
    }
}

/// Brace depth of the enclosing class bodies. Zero means top level.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ClassScope {
    depth: i32,
}

impl ClassScope {
    pub fn enter_class(&mut self) {
        self.depth = self.depth.max(1);
    }

    /// Braces only count once a class line has raised the depth.
    pub fn observe(&mut self, ch: char) {
        if self.depth == 0 {
            return;
        }
        match ch {
            '{' => self.depth += 1,
            '}' => self.depth -= 1,
            _ => {}
        }
    }

    pub fn is_top_level(&self) -> bool {
        self.depth == 0
    }

    #[cfg(test)]
    pub fn depth(&self) -> i32 {
        self.depth
    }
}

/// Per-file scan state. Create one per file; never share between files.
#[derive(Debug)]
pub struct LineScanner {
    state: LexState,
    buffer: String,
    class_scope: ClassScope,
}

impl Default for LineScanner {
    fn default() -> Self {
        Self::new()
    }
}

fn definition_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"function\s+&?([A-Za-z_][A-Za-z0-9_]*)\s*\(")
            .expect("definition pattern is a valid regex")
    })
}

/// True when `trimmed` starts with `keyword` as a whole word.
fn starts_with_keyword(trimmed: &str, keyword: &str) -> bool {
    trimmed
        .strip_prefix(keyword)
        .map(|rest| !rest.starts_with(is_identifier_char))
        .unwrap_or(false)
}

fn is_comment_line(trimmed: &str) -> bool {
    COMMENT_MARKERS
        .iter()
        .any(|marker| trimmed.starts_with(marker))
}

/// Name declared by a `function name(` header, if any. When a line declares
/// several functions the last one wins.
pub fn extract_definition(line: &str) -> Option<&str> {
    definition_regex()
        .captures_iter(line)
        .last()
        .and_then(|caps| caps.get(1))
        .map(|name| name.as_str())
}

impl LineScanner {
    pub fn new() -> Self {
        LineScanner {
            state: LexState::Normal,
            buffer: String::new(),
            class_scope: ClassScope::default(),
        }
    }

    #[cfg(test)]
    pub fn state(&self) -> LexState {
        self.state
    }

    #[cfg(test)]
    pub fn class_scope(&self) -> ClassScope {
        self.class_scope
    }

    /// Scans one line (without its terminator) and appends any events found.
    pub fn scan_line(&mut self, line: &str, line_no: usize, events: &mut Vec<ScanEvent>) {
        let trimmed = line.trim();
        if is_comment_line(trimmed) {
            return;
        }
        if starts_with_keyword(trimmed, "class") {
            self.class_scope.enter_class();
            return;
        }
        if starts_with_keyword(trimmed, "function") && self.class_scope.is_top_level() {
            if let Some(name) = extract_definition(trimmed) {
                events.push(ScanEvent::Definition {
                    name: name.to_string(),
                    line: line_no,
                });
            }
            return;
        }

        let mut prev = None;
        for ch in line.chars() {
            self.class_scope.observe(ch);
            self.step(ch, prev, events);
            prev = Some(ch);
        }
        // Identifiers never span lines.
        if self.state == LexState::StartMemorize {
            self.reset();
        }
    }

    fn step(&mut self, ch: char, prev: Option<char>, events: &mut Vec<ScanEvent>) {
        match transition(self.state, ch, prev) {
            Transition::Ignore => {}
            Transition::Begin => {
                self.buffer.push(ch);
                self.state = LexState::StartMemorize;
            }
            Transition::Extend => self.buffer.push(ch),
            Transition::Close => self.state = LexState::StopMemorize,
            Transition::Abort => self.reset(),
        }
        if self.state == LexState::StopMemorize {
            if is_valid_function_name(&self.buffer) {
                events.push(ScanEvent::Call(std::mem::take(&mut self.buffer)));
            }
            self.reset();
        }
    }

    fn reset(&mut self) {
        self.buffer.clear();
        self.state = LexState::Normal;
    }
}
