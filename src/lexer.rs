// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::*;
use core::cmp;
use core::fmt::{self, Debug, Formatter};
use core::iter::Peekable;
use core::str::CharIndices;

use anyhow::{anyhow, bail, Result};

#[derive(Clone)]
struct SourceInternal {
    pub file: String,
    pub contents: String,
    pub lines: Vec<(u32, u32)>,
}

/// A named piece of configuration text.
#[derive(Clone)]
pub struct Source {
    src: Rc<SourceInternal>,
}

impl cmp::PartialEq for Source {
    fn eq(&self, other: &Source) -> bool {
        Rc::ptr_eq(&self.src, &other.src)
    }
}

impl cmp::Eq for Source {}

impl Debug for Source {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        self.src.file.fmt(f)
    }
}

impl Source {
    pub fn from_contents(file: String, contents: String) -> Result<Source> {
        // Account for rows, cols possibly starting at 1, EOF etc.
        let max_size = u32::MAX as usize - 2;
        if contents.len() > max_size {
            bail!("{file} exceeds maximum allowed configuration file size {max_size}");
        }
        let mut lines = vec![];
        let mut prev_ch = ' ';
        let mut prev_pos = 0u32;
        let mut start = 0u32;
        for (i, ch) in contents.char_indices() {
            if ch == '\n' {
                let end = match prev_ch {
                    '\r' => prev_pos,
                    _ => i as u32,
                };
                lines.push((start, end));
                start = i as u32 + 1;
            }
            prev_ch = ch;
            prev_pos = i as u32;
        }

        if (start as usize) < contents.len() {
            lines.push((start, contents.len() as u32));
        } else if contents.is_empty() {
            lines.push((0, 0));
        } else {
            let s = (contents.len() - 1) as u32;
            lines.push((s, s));
        }
        Ok(Self {
            src: Rc::new(SourceInternal {
                file,
                contents,
                lines,
            }),
        })
    }

    pub fn from_file<P: AsRef<std::path::Path>>(path: P) -> Result<Source> {
        let contents = match std::fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) => bail!("Failed to read {}. {e}", path.as_ref().display()),
        };
        Self::from_contents(path.as_ref().to_string_lossy().to_string(), contents)
    }

    pub fn file(&self) -> &String {
        &self.src.file
    }

    pub fn contents(&self) -> &String {
        &self.src.contents
    }

    pub fn line(&self, idx: u32) -> &str {
        let idx = idx as usize;
        if idx < self.src.lines.len() {
            let (start, end) = self.src.lines[idx];
            &self.src.contents[start as usize..end as usize]
        } else {
            ""
        }
    }

    /// Line and column (both 1-based) of a byte offset.
    pub fn position(&self, offset: u32) -> (u32, u32) {
        let idx = self
            .src
            .lines
            .partition_point(|(start, _)| *start <= offset)
            .max(1)
            - 1;
        let (start, _) = self.src.lines[idx];
        let prefix = &self.src.contents[start as usize..offset as usize];
        (idx as u32 + 1, prefix.chars().count() as u32 + 1)
    }

    pub fn message(&self, line: u32, col: u32, kind: &str, msg: &str) -> String {
        if line as usize > self.src.lines.len() {
            return format!("{}: invalid line {} specified", self.src.file, line);
        }

        let line_str = format!("{line}");
        let line_num_width = line_str.len() + 1;
        let col_spaces = col.max(1) as usize - 1;

        format!(
            "\n--> {}:{}:{}\n{:<line_num_width$}|\n\
		{:<line_num_width$}| {}\n\
		{:<line_num_width$}| {:<col_spaces$}^\n\
		{}: {}",
            self.src.file,
            line,
            col,
            "",
            line,
            self.line(line - 1),
            "",
            "",
            kind,
            msg
        )
    }

    pub fn error(&self, line: u32, col: u32, msg: &str) -> anyhow::Error {
        anyhow!(self.message(line, col, "error", msg))
    }
}

/// A range of source text. Used as the subject of diagnostics.
#[derive(Clone)]
pub struct Span {
    pub source: Source,
    pub line: u32,
    pub col: u32,
    pub start: u32,
    pub end: u32,
}

impl Span {
    pub fn text(&self) -> &str {
        &self.source.contents()[self.start as usize..self.end as usize]
    }

    pub fn message(&self, kind: &str, msg: &str) -> String {
        self.source.message(self.line, self.col, kind, msg)
    }

    pub fn error(&self, msg: &str) -> anyhow::Error {
        self.source.error(self.line, self.col, msg)
    }

    /// Smallest span covering both `self` and `other`.
    pub fn to(&self, other: &Span) -> Span {
        Span {
            source: self.source.clone(),
            line: self.line,
            col: self.col,
            start: self.start,
            end: other.end.max(self.end),
        }
    }
}

impl cmp::PartialEq for Span {
    fn eq(&self, other: &Span) -> bool {
        self.source == other.source && self.start == other.start && self.end == other.end
    }
}

impl Debug for Span {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        let t = self.text().escape_debug().to_string();
        let max = 32;
        let (txt, trailer) = if t.len() > max {
            (&t[0..max], "...")
        } else {
            (t.as_str(), "")
        };

        f.write_fmt(format_args!(
            "{}:{}:{}:{}, \"{}{}\"",
            self.line, self.col, self.start, self.end, txt, trailer
        ))
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.source.file(), self.line, self.col)
    }
}

#[derive(Debug, PartialEq, Eq, Clone)]
pub enum TokenKind {
    Symbol,
    // Quoted template. The span excludes the quotes.
    String,
    Number,
    Ident,
    Newline,
    Eof,
}

#[derive(Debug, Clone)]
pub struct Token(pub TokenKind, pub Span);

#[derive(Clone)]
pub struct Lexer<'source> {
    source: Source,
    iter: Peekable<CharIndices<'source>>,
    end: usize,
    line: u32,
    col: u32,
}

impl<'source> Lexer<'source> {
    pub fn new(source: &'source Source) -> Self {
        Self {
            source: source.clone(),
            iter: source.contents().char_indices().peekable(),
            end: source.contents().len(),
            line: 1,
            col: 1,
        }
    }

    /// Lexer over the byte range `start..end` of `source`.
    /// Used for the interpolation sequences of templates.
    pub fn new_range(source: &'source Source, start: u32, end: u32) -> Self {
        let mut iter = source.contents().char_indices().peekable();
        while matches!(iter.peek(), Some((idx, _)) if *idx < start as usize) {
            iter.next();
        }
        let (line, col) = source.position(start);
        Self {
            source: source.clone(),
            iter,
            end: end as usize,
            line,
            col,
        }
    }

    fn peek(&mut self) -> (usize, char) {
        match self.iter.peek() {
            Some((index, chr)) if *index < self.end => (*index, *chr),
            _ => (self.end, '\x00'),
        }
    }

    fn peekahead(&mut self, n: usize) -> (usize, char) {
        match self.iter.clone().nth(n) {
            Some((index, chr)) if index < self.end => (index, chr),
            _ => (self.end, '\x00'),
        }
    }

    fn span(&self, line: u32, col: u32, start: usize, end: usize) -> Span {
        Span {
            source: self.source.clone(),
            line,
            col,
            start: start as u32,
            end: end as u32,
        }
    }

    fn read_ident(&mut self) -> Result<Token> {
        let start = self.peek().0;
        let col = self.col;
        loop {
            let ch = self.peek().1;
            if ch.is_alphanumeric() || ch == '_' || ch == '-' {
                self.iter.next();
                self.col += 1;
            } else {
                break;
            }
        }
        let end = self.peek().0;
        Ok(Token(TokenKind::Ident, self.span(self.line, col, start, end)))
    }

    fn read_digits(&mut self) {
        while self.peek().1.is_ascii_digit() {
            self.iter.next();
            self.col += 1;
        }
    }

    fn read_number(&mut self) -> Result<Token> {
        let start = self.peek().0;
        let col = self.col;
        self.read_digits();

        // . must be followed by at least 1 digit.
        if self.peek().1 == '.' && self.peekahead(1).1.is_ascii_digit() {
            self.iter.next();
            self.col += 1;
            self.read_digits();
        }

        let ch = self.peek().1;
        if ch == 'e' || ch == 'E' {
            self.iter.next();
            self.col += 1;
            if matches!(self.peek().1, '+' | '-') {
                self.iter.next();
                self.col += 1;
            }
            if !self.peek().1.is_ascii_digit() {
                return Err(self.source.error(self.line, self.col, "invalid number"));
            }
            self.read_digits();
        }

        let end = self.peek().0;
        let ch = self.peek().1;
        if ch == '_' || ch.is_ascii_alphabetic() {
            return Err(self.source.error(self.line, self.col, "invalid number"));
        }

        Ok(Token(TokenKind::Number, self.span(self.line, col, start, end)))
    }

    // Skips over an interpolation sequence `${ ... }`, including any quoted
    // templates nested in it. The leading `${` has already been consumed.
    fn skip_interpolation(&mut self, line: u32, col: u32) -> Result<()> {
        let mut depth = 1;
        loop {
            let (_, ch) = self.peek();
            match ch {
                '\x00' => return Err(self.source.error(line, col, "unterminated template sequence")),
                '"' => {
                    self.iter.next();
                    self.col += 1;
                    self.skip_quoted(line, col)?;
                    continue;
                }
                '{' => depth += 1,
                '}' => {
                    depth -= 1;
                    if depth == 0 {
                        self.iter.next();
                        self.col += 1;
                        return Ok(());
                    }
                }
                '\n' => return Err(self.source.error(line, col, "unterminated template sequence")),
                _ => (),
            }
            self.iter.next();
            self.col += 1;
        }
    }

    // Skips to (and past) the closing quote of a template whose opening quote
    // has been consumed.
    fn skip_quoted(&mut self, line: u32, col: u32) -> Result<()> {
        loop {
            let (_, ch) = self.peek();
            match ch {
                '"' => {
                    self.iter.next();
                    self.col += 1;
                    return Ok(());
                }
                '\x00' | '\n' => return Err(self.source.error(line, col, "unterminated string")),
                '\\' => {
                    self.iter.next();
                    self.col += 1;
                    if self.peek().1 == '\x00' {
                        return Err(self.source.error(line, col, "unterminated string"));
                    }
                }
                '$' | '%' if self.peekahead(1).1 == ch && self.peekahead(2).1 == '{' => {
                    // Escaped `$${` or `%%{`.
                    self.iter.next();
                    self.iter.next();
                    self.col += 2;
                }
                '$' if self.peekahead(1).1 == '{' => {
                    self.iter.next();
                    self.iter.next();
                    self.col += 2;
                    self.skip_interpolation(self.line, self.col - 2)?;
                    continue;
                }
                _ => (),
            }
            self.iter.next();
            self.col += 1;
        }
    }

    fn read_string(&mut self) -> Result<Token> {
        let (line, col) = (self.line, self.col);
        self.iter.next();
        self.col += 1;
        let start = self.peek().0;
        self.skip_quoted(line, col)?;
        // Exclude the closing quote.
        let end = self.peek().0 - 1;
        Ok(Token(TokenKind::String, self.span(line, col + 1, start, end)))
    }

    fn skip_ws(&mut self) -> Result<()> {
        // A tab is considered 4 space characters.
        'outer: loop {
            match self.peek().1 {
                ' ' => self.col += 1,
                '\t' => self.col += 4,
                '\r' => {
                    if self.peekahead(1).1 != '\n' {
                        return Err(self.source.error(
                            self.line,
                            self.col,
                            "\\r must be followed by \\n",
                        ));
                    }
                }
                '#' => {
                    self.skip_line_comment();
                    continue 'outer;
                }
                '/' if self.peekahead(1).1 == '/' => {
                    self.skip_line_comment();
                    continue 'outer;
                }
                '/' if self.peekahead(1).1 == '*' => {
                    let (line, col) = (self.line, self.col);
                    self.iter.next();
                    self.iter.next();
                    self.col += 2;
                    loop {
                        match self.peek().1 {
                            '\x00' => {
                                return Err(self.source.error(line, col, "unterminated comment"))
                            }
                            '*' if self.peekahead(1).1 == '/' => {
                                self.iter.next();
                                self.iter.next();
                                self.col += 2;
                                continue 'outer;
                            }
                            '\n' => {
                                self.line += 1;
                                self.col = 1;
                            }
                            _ => self.col += 1,
                        }
                        self.iter.next();
                    }
                }
                _ => break,
            }
            self.iter.next();
        }
        Ok(())
    }

    // Line comments stop before the newline so that it is still reported.
    fn skip_line_comment(&mut self) {
        loop {
            match self.peek().1 {
                '\n' | '\x00' => return,
                _ => {
                    self.iter.next();
                }
            }
        }
    }

    pub fn next_token(&mut self) -> Result<Token> {
        self.skip_ws()?;

        let (start, chr) = self.peek();
        let col = self.col;

        match chr {
            '\n' => {
                self.iter.next();
                let tok = Token(TokenKind::Newline, self.span(self.line, col, start, start + 1));
                self.line += 1;
                self.col = 1;
                Ok(tok)
            }
            // Multi-character symbols.
            '=' | '!' | '<' | '>' if self.peekahead(1).1 == '=' => self.read_symbol(2),
            '=' if self.peekahead(1).1 == '>' => self.read_symbol(2),
            '&' if self.peekahead(1).1 == '&' => self.read_symbol(2),
            '|' if self.peekahead(1).1 == '|' => self.read_symbol(2),
            ':' if self.peekahead(1).1 == ':' => self.read_symbol(2),
            '.' if self.peekahead(1).1 == '.' && self.peekahead(2).1 == '.' => self.read_symbol(3),
            '{' | '}' | '[' | ']' | '(' | ')' |
            '+' | '-' | '*' | '/' | '%' |
            '<' | '>' | '=' | '!' | '?' | ':' |
            ',' | '.' => self.read_symbol(1),
            '"' => self.read_string(),
            '\x00' => Ok(Token(TokenKind::Eof, self.span(self.line, col, start, start))),
            _ if chr.is_ascii_digit() => self.read_number(),
            _ if chr.is_alphabetic() || chr == '_' => self.read_ident(),
            _ => Err(self.source.error(self.line, self.col, "invalid character")),
        }
    }

    fn read_symbol(&mut self, len: usize) -> Result<Token> {
        let (start, _) = self.peek();
        let col = self.col;
        for _ in 0..len {
            self.iter.next();
        }
        self.col += len as u32;
        Ok(Token(TokenKind::Symbol, self.span(self.line, col, start, start + len)))
    }
}
