use super::token::{Keyword, Token, TokenKind};

/// Tokenizer for Prism source code.
///
/// Produces tokens on demand; the parser keeps a single current-token slot
/// and never buffers further ahead. The tokenizer is total: it never
/// rejects input, and classifies anything it does not recognize as a
/// one-character `Op` token.
pub struct Tokenizer {
    source: Vec<char>,
    current: usize,
    line: usize,
    column: usize,
}

impl Tokenizer {
    /// Create a new tokenizer for the given source code.
    pub fn new(source: &str) -> Self {
        Self {
            source: source.chars().collect(),
            current: 0,
            line: 1,
            column: 1,
        }
    }

    /// Get the next token from the source.
    ///
    /// Returns an `Eof` sentinel once the input is exhausted; calling again
    /// keeps returning `Eof`.
    pub fn next_token(&mut self) -> Token {
        self.skip_whitespace();

        let start_line = self.line;
        let start_column = self.column;

        if self.is_at_end() {
            return Token::new(TokenKind::Eof, String::new(), start_line, start_column);
        }

        let ch = self.advance();

        // Letter-leading run: identifier or keyword.
        if ch.is_ascii_alphabetic() {
            let mut text = String::from(ch);
            while !self.is_at_end() && self.peek().is_ascii_alphanumeric() {
                text.push(self.advance());
            }
            let kind = match Keyword::from_str(&text) {
                Some(keyword) => TokenKind::Keyword(keyword),
                None => TokenKind::Identifier,
            };
            return Token::new(kind, text, start_line, start_column);
        }

        // Digit- or dot-leading run: numeric literal text. The run may be
        // malformed (multiple dots); the parser reports that.
        if ch.is_ascii_digit() || ch == '.' {
            let mut text = String::from(ch);
            while !self.is_at_end() && (self.peek().is_ascii_digit() || self.peek() == '.') {
                text.push(self.advance());
            }
            return Token::new(TokenKind::Number, text, start_line, start_column);
        }

        if ch == ';' {
            return Token::new(TokenKind::Semicolon, ";".to_string(), start_line, start_column);
        }

        Token::new(TokenKind::Op(ch), ch.to_string(), start_line, start_column)
    }

    /// Skip whitespace characters, tracking line/column.
    fn skip_whitespace(&mut self) {
        while !self.is_at_end() && self.peek().is_whitespace() {
            self.advance();
        }
    }

    /// Check if we're at the end of the source.
    fn is_at_end(&self) -> bool {
        self.current >= self.source.len()
    }

    /// Peek at the current character without consuming it.
    fn peek(&self) -> char {
        self.source[self.current]
    }

    /// Advance to the next character.
    fn advance(&mut self) -> char {
        let ch = self.source[self.current];
        self.current += 1;
        if ch == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        ch
    }
}
