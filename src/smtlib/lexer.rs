// Copyright 2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Lexical analysis for SMT-LIB 2 scripts

use crate::error::{ParseError, SourceLocation};

/// Token types for SMT-LIB 2
#[derive(Debug, Clone, PartialEq)]
pub enum TokenType {
    LeftParen,
    RightParen,

    /// Unsigned numeral; negation is spelled `(- n)` in SMT-LIB
    Numeral(i64),

    /// Simple or |quoted| symbol
    Symbol(String),

    /// `:keyword` attribute name
    Keyword(String),

    /// Double-quoted string literal
    StringLit(String),

    Eof,
}

/// A token with its location
#[derive(Debug, Clone)]
pub struct Token {
    pub token_type: TokenType,
    pub location: SourceLocation,
}

impl Token {
    pub fn new(token_type: TokenType, location: SourceLocation) -> Self {
        Self {
            token_type,
            location,
        }
    }
}

/// Characters allowed in simple symbols beyond alphanumerics
fn is_symbol_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || "~!@$%^&*_-+=<>.?/".contains(c)
}

/// Lexer for SMT-LIB 2 input
pub struct Lexer {
    input: Vec<char>,
    position: usize,
    line: usize,
    column: usize,
    file_name: String,
}

impl Lexer {
    pub fn new(input: &str, file_name: String) -> Self {
        Self {
            input: input.chars().collect(),
            position: 0,
            line: 1,
            column: 1,
            file_name,
        }
    }

    fn location(&self) -> SourceLocation {
        SourceLocation::new(self.file_name.clone(), self.line, self.column)
    }

    fn current(&self) -> Option<char> {
        self.input.get(self.position).copied()
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.current();
        if let Some(c) = c {
            self.position += 1;
            if c == '\n' {
                self.line += 1;
                self.column = 1;
            } else {
                self.column += 1;
            }
        }
        c
    }

    fn skip_whitespace_and_comments(&mut self) {
        while let Some(c) = self.current() {
            if c.is_whitespace() {
                self.advance();
            } else if c == ';' {
                while let Some(c) = self.current() {
                    if c == '\n' {
                        break;
                    }
                    self.advance();
                }
            } else {
                break;
            }
        }
    }

    /// Next token, or a located error
    pub fn next_token(&mut self) -> Result<Token, ParseError> {
        self.skip_whitespace_and_comments();
        let location = self.location();

        let c = match self.current() {
            Some(c) => c,
            None => return Ok(Token::new(TokenType::Eof, location)),
        };

        match c {
            '(' => {
                self.advance();
                Ok(Token::new(TokenType::LeftParen, location))
            }
            ')' => {
                self.advance();
                Ok(Token::new(TokenType::RightParen, location))
            }
            '"' => self.read_string(location),
            '|' => self.read_quoted_symbol(location),
            ':' => {
                self.advance();
                let name = self.read_symbol_chars();
                Ok(Token::new(TokenType::Keyword(name), location))
            }
            c if c.is_ascii_digit() => self.read_numeral(location),
            c if is_symbol_char(c) => {
                let name = self.read_symbol_chars();
                Ok(Token::new(TokenType::Symbol(name), location))
            }
            c => Err(ParseError::UnexpectedCharacter {
                character: c,
                location,
            }),
        }
    }

    /// All remaining tokens including the trailing Eof
    pub fn tokenize(&mut self) -> Result<Vec<Token>, ParseError> {
        let mut tokens = Vec::new();
        loop {
            let token = self.next_token()?;
            let done = token.token_type == TokenType::Eof;
            tokens.push(token);
            if done {
                return Ok(tokens);
            }
        }
    }

    fn read_symbol_chars(&mut self) -> String {
        let mut name = String::new();
        while let Some(c) = self.current() {
            if is_symbol_char(c) {
                name.push(c);
                self.advance();
            } else {
                break;
            }
        }
        name
    }

    fn read_numeral(&mut self, location: SourceLocation) -> Result<Token, ParseError> {
        let mut digits = String::new();
        while let Some(c) = self.current() {
            if c.is_ascii_digit() {
                digits.push(c);
                self.advance();
            } else if is_symbol_char(c) {
                // something like 12abc
                digits.push(c);
                self.advance();
                let rest = self.read_symbol_chars();
                return Err(ParseError::InvalidNumber {
                    value: format!("{}{}", digits, rest),
                    location,
                });
            } else {
                break;
            }
        }
        let value = digits.parse::<i64>().map_err(|_| ParseError::InvalidNumber {
            value: digits.clone(),
            location: location.clone(),
        })?;
        Ok(Token::new(TokenType::Numeral(value), location))
    }

    fn read_string(&mut self, location: SourceLocation) -> Result<Token, ParseError> {
        self.advance(); // opening quote
        let mut value = String::new();
        loop {
            match self.advance() {
                None => return Err(ParseError::UnterminatedString { location }),
                Some('"') => {
                    // "" is an escaped quote inside a string literal
                    if self.current() == Some('"') {
                        self.advance();
                        value.push('"');
                    } else {
                        return Ok(Token::new(TokenType::StringLit(value), location));
                    }
                }
                Some(c) => value.push(c),
            }
        }
    }

    fn read_quoted_symbol(&mut self, location: SourceLocation) -> Result<Token, ParseError> {
        self.advance(); // opening bar
        let mut value = String::new();
        loop {
            match self.advance() {
                None => return Err(ParseError::UnterminatedQuotedSymbol { location }),
                Some('|') => return Ok(Token::new(TokenType::Symbol(value), location)),
                Some(c) => value.push(c),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token_types(input: &str) -> Vec<TokenType> {
        let mut lexer = Lexer::new(input, "test.smt2".to_string());
        lexer
            .tokenize()
            .unwrap()
            .into_iter()
            .map(|t| t.token_type)
            .collect()
    }

    #[test]
    fn test_basic_tokens() {
        assert_eq!(
            token_types("(assert (<= x 10))"),
            vec![
                TokenType::LeftParen,
                TokenType::Symbol("assert".to_string()),
                TokenType::LeftParen,
                TokenType::Symbol("<=".to_string()),
                TokenType::Symbol("x".to_string()),
                TokenType::Numeral(10),
                TokenType::RightParen,
                TokenType::RightParen,
                TokenType::Eof,
            ]
        );
    }

    #[test]
    fn test_comments_and_keywords() {
        assert_eq!(
            token_types("; header\n(set-info :status sat)"),
            vec![
                TokenType::LeftParen,
                TokenType::Symbol("set-info".to_string()),
                TokenType::Keyword("status".to_string()),
                TokenType::Symbol("sat".to_string()),
                TokenType::RightParen,
                TokenType::Eof,
            ]
        );
    }

    #[test]
    fn test_quoted_symbol() {
        assert_eq!(
            token_types("|weird name|"),
            vec![TokenType::Symbol("weird name".to_string()), TokenType::Eof]
        );
    }

    #[test]
    fn test_invalid_number() {
        let mut lexer = Lexer::new("12ab", "test.smt2".to_string());
        assert!(matches!(
            lexer.next_token(),
            Err(ParseError::InvalidNumber { .. })
        ));
    }

    #[test]
    fn test_locations_track_lines() {
        let mut lexer = Lexer::new("x\ny", "test.smt2".to_string());
        let first = lexer.next_token().unwrap();
        let second = lexer.next_token().unwrap();
        assert_eq!(first.location.line, 1);
        assert_eq!(second.location.line, 2);
    }
}
