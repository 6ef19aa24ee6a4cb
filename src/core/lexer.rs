// Character-level tokenizer for VM assembly source.
//
// Surface syntax: `$r<n>` registers, `#<n>` immediates, `=<name>` label or
// prototype references, `:<name>:` label declarations, `.<name>` directives,
// `"..."` strings, `,` operand separator, `/* ... */` comments. A statement
// ends at `;` or at the end of a line; strings and comments may span lines.

use std::rc::Rc;

use crate::core::error::{AsmError, AsmErrorKind, Diagnostic, Severity};
use crate::core::token::{SourcePos, Token, TokenKind};
use crate::vm::limits::MAX_REGISTERS;

/// Tokenization result: the token stream plus the source lines kept for
/// diagnostic rendering by later phases.
#[derive(Debug)]
pub struct LexOutput {
    pub tokens: Vec<Token>,
    pub lines: Vec<String>,
}

/// Tokenize a whole input. Stops at the first error.
pub fn tokenize(input_name: &str, source: &str) -> Result<LexOutput, Diagnostic> {
    let mut lexer = Lexer::new(input_name, source);
    lexer.run()?;
    Ok(LexOutput {
        tokens: lexer.tokens,
        lines: lexer.lines.iter().map(|line| line.to_string()).collect(),
    })
}

struct Lexer {
    chars: Vec<char>,
    pos: usize,
    line: u32,
    column: u32,
    file: Rc<str>,
    lines: Vec<Rc<str>>,
    tokens: Vec<Token>,
}

impl Lexer {
    fn new(input_name: &str, source: &str) -> Self {
        Self {
            chars: source.chars().collect(),
            pos: 0,
            line: 1,
            column: 1,
            file: Rc::from(input_name),
            lines: source.lines().map(Rc::from).collect(),
            tokens: Vec::new(),
        }
    }

    fn run(&mut self) -> Result<(), Diagnostic> {
        loop {
            self.skip_white();
            if self.peek().is_none() {
                break;
            }
            let token = self.scan_token()?;
            self.tokens.push(token);
        }

        // A final line without `;` still ends its statement.
        if !matches!(
            self.tokens.last().map(|t| &t.kind),
            None | Some(TokenKind::StatementEnd)
        ) {
            self.push_statement_end();
        }
        Ok(())
    }

    fn scan_token(&mut self) -> Result<Token, Diagnostic> {
        let start = self.here();
        let start_line_text = self.line_text();
        let c = match self.peek() {
            Some(c) => c,
            None => return Err(self.failure(start, "No data left to read")),
        };

        let kind = match c {
            '$' => self.scan_register()?,
            '#' => self.scan_immediate()?,
            '=' => {
                self.bump();
                TokenKind::LabelRef(self.scan_identifier()?)
            }
            '.' => {
                self.bump();
                TokenKind::DirectiveName(self.scan_identifier()?)
            }
            ':' => {
                self.bump();
                let name = self.scan_identifier()?;
                self.expect(':')?;
                TokenKind::LabelDecl(name)
            }
            '"' => self.scan_string()?,
            '/' => self.scan_comment()?,
            ',' => {
                self.bump();
                TokenKind::Comma
            }
            ';' => {
                self.bump();
                TokenKind::StatementEnd
            }
            c if is_ident_start(c) => TokenKind::Identifier(self.scan_identifier()?),
            c => return Err(self.failure(start, format!("Unknown token '{c}'"))),
        };

        Ok(Token {
            kind,
            file: Rc::clone(&self.file),
            start,
            end: self.prev_pos(start),
            raw: self.raw_since(start),
            line_text: start_line_text,
        })
    }

    fn scan_register(&mut self) -> Result<TokenKind, Diagnostic> {
        let start = self.here();
        self.expect('$')?;
        self.expect('r')?;
        let value = self.scan_integer()?;
        if value >= i64::from(MAX_REGISTERS) {
            return Err(self.failure(start, format!("Invalid register '$r{value}'")));
        }
        Ok(TokenKind::Register(value as u16))
    }

    fn scan_immediate(&mut self) -> Result<TokenKind, Diagnostic> {
        self.expect('#')?;
        Ok(TokenKind::Immediate(self.scan_integer()?))
    }

    fn scan_integer(&mut self) -> Result<i64, Diagnostic> {
        let start = self.here();
        if !matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
            return Err(self.failure(start, "Expected 'integer'"));
        }
        let mut value: i64 = 0;
        while let Some(c) = self.peek() {
            if !c.is_ascii_digit() {
                break;
            }
            value = value
                .checked_mul(10)
                .and_then(|v| v.checked_add(i64::from(c as u8 - b'0')))
                .ok_or_else(|| self.failure(start, "Integer is overflowing"))?;
            self.bump();
        }
        Ok(value)
    }

    fn scan_identifier(&mut self) -> Result<String, Diagnostic> {
        let start = self.here();
        if !matches!(self.peek(), Some(c) if is_ident_start(c)) {
            return Err(self.failure(start, "Expected 'identifier'"));
        }
        let mut name = String::new();
        while let Some(c) = self.peek() {
            if !is_ident_char(c) {
                break;
            }
            name.push(c);
            self.bump();
        }
        Ok(name)
    }

    fn scan_string(&mut self) -> Result<TokenKind, Diagnostic> {
        let start = self.here();
        self.expect('"')?;
        let mut text = String::new();
        loop {
            match self.peek() {
                Some('"') => {
                    self.bump();
                    return Ok(TokenKind::Str(text));
                }
                Some(c) => {
                    text.push(c);
                    self.bump();
                }
                None => return Err(self.failure(start, "Unterminated string")),
            }
        }
    }

    fn scan_comment(&mut self) -> Result<TokenKind, Diagnostic> {
        let start = self.here();
        self.expect('/')?;
        if self.peek() != Some('*') {
            return Err(self.failure(start, "Expected multiline comment"));
        }
        self.bump();
        let mut text = String::new();
        loop {
            match self.peek() {
                Some('*') => {
                    self.bump();
                    if self.peek() == Some('/') {
                        self.bump();
                        return Ok(TokenKind::Comment(text));
                    }
                    text.push('*');
                }
                Some(c) => {
                    text.push(c);
                    self.bump();
                }
                None => return Err(self.failure(start, "Unterminated comment")),
            }
        }
    }

    // Skip whitespace between tokens; a newline ends the open statement.
    fn skip_white(&mut self) {
        while let Some(c) = self.peek() {
            if !c.is_whitespace() {
                break;
            }
            if c == '\n'
                && !matches!(
                    self.tokens.last().map(|t| &t.kind),
                    None | Some(TokenKind::StatementEnd)
                )
            {
                self.push_statement_end();
            }
            self.bump();
        }
    }

    fn push_statement_end(&mut self) {
        let pos = self.here();
        self.tokens.push(Token {
            kind: TokenKind::StatementEnd,
            file: Rc::clone(&self.file),
            start: pos,
            end: pos,
            raw: String::new(),
            line_text: self.line_text(),
        });
    }

    fn expect(&mut self, expected: char) -> Result<(), Diagnostic> {
        let start = self.here();
        match self.peek() {
            Some(c) if c == expected => {
                self.bump();
                Ok(())
            }
            Some(c) => Err(self.failure(start, format!("Expected '{expected}' got '{c}'"))),
            None => Err(self.failure(start, format!("Expected '{expected}' got end of input"))),
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn bump(&mut self) {
        if let Some(c) = self.chars.get(self.pos) {
            if *c == '\n' {
                self.line += 1;
                self.column = 1;
            } else {
                self.column += 1;
            }
            self.pos += 1;
        }
    }

    fn here(&self) -> SourcePos {
        SourcePos {
            line: self.line,
            column: self.column,
        }
    }

    // End position of the token just consumed; never before its start.
    fn prev_pos(&self, start: SourcePos) -> SourcePos {
        if self.line == start.line && self.column <= start.column {
            return start;
        }
        if self.column > 1 {
            SourcePos {
                line: self.line,
                column: self.column - 1,
            }
        } else {
            SourcePos {
                line: self.line,
                column: 1,
            }
        }
    }

    fn raw_since(&self, start: SourcePos) -> String {
        // A token spanning lines keeps only its first line as raw text.
        let line = match self.lines.get(start.line as usize - 1) {
            Some(line) => line,
            None => return String::new(),
        };
        if self.line == start.line {
            let begin = start.column as usize - 1;
            let end = (self.column as usize - 1).min(line.chars().count());
            line.chars().skip(begin).take(end.saturating_sub(begin)).collect()
        } else {
            line.chars().skip(start.column as usize - 1).collect()
        }
    }

    fn line_text(&self) -> Rc<str> {
        self.lines
            .get(self.line as usize - 1)
            .cloned()
            .unwrap_or_else(|| Rc::from(""))
    }

    fn failure(&self, pos: SourcePos, msg: impl Into<String>) -> Diagnostic {
        Diagnostic::new(
            pos.line,
            Severity::Error,
            AsmError::new(AsmErrorKind::Lexer, msg),
        )
        .with_column(Some(pos.column as usize))
        .with_file(Some(self.file.to_string()))
        .with_source(Some(self.line_text_at(pos.line)))
    }

    fn line_text_at(&self, line: u32) -> String {
        self.lines
            .get(line as usize - 1)
            .map(|l| l.to_string())
            .unwrap_or_default()
    }
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '$' || c == '.'
}
