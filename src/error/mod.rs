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

//! Error handling for the MeGASampler engine
//!
//! One error enum per concern, combined into a top-level `SamplerError`

use std::fmt;
use thiserror::Error;

/// Source location information for front-end error reporting
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SourceLocation {
    pub file: String,
    pub line: usize,
    pub column: usize,
}

impl SourceLocation {
    pub fn new(file: String, line: usize, column: usize) -> Self {
        Self { file, line, column }
    }

    pub fn unknown() -> Self {
        Self {
            file: "<unknown>".to_string(),
            line: 0,
            column: 0,
        }
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.file, self.line, self.column)
    }
}

/// SMT-LIB 2 front-end errors (lexer and parser)
#[derive(Error, Debug, Clone)]
pub enum ParseError {
    #[error("Unexpected character '{character}' at {location}")]
    UnexpectedCharacter {
        character: char,
        location: SourceLocation,
    },

    #[error("Unterminated string literal at {location}")]
    UnterminatedString { location: SourceLocation },

    #[error("Unterminated quoted symbol at {location}")]
    UnterminatedQuotedSymbol { location: SourceLocation },

    #[error("Invalid number format '{value}' at {location}")]
    InvalidNumber {
        value: String,
        location: SourceLocation,
    },

    #[error("Unexpected end of input, expected {expected}")]
    UnexpectedEof { expected: String },

    #[error("Unexpected token {found}, expected {expected} at {location}")]
    UnexpectedToken {
        found: String,
        expected: String,
        location: SourceLocation,
    },

    #[error("Unknown symbol '{symbol}' at {location}")]
    UnknownSymbol {
        symbol: String,
        location: SourceLocation,
    },

    #[error("Unsupported sort '{sort}' at {location}: only Int, Bool and (Array Int Int) are handled")]
    UnsupportedSort {
        sort: String,
        location: SourceLocation,
    },

    #[error("Unsupported command '{command}' at {location}")]
    UnsupportedCommand {
        command: String,
        location: SourceLocation,
    },

    #[error("Unsupported operator '{operator}' at {location}")]
    UnsupportedOperator {
        operator: String,
        location: SourceLocation,
    },

    #[error("Sort mismatch at {location}: {reason}")]
    SortMismatch {
        reason: String,
        location: SourceLocation,
    },
}

/// Strengthening failures, caught per literal by the driver
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StrengthenError {
    /// No rewrite rule covers the literal's shape. The literal is skipped;
    /// the box stays sound, only looser.
    #[error("no strengthening rule for literal")]
    NoRuleForStrengthening,

    /// Concrete i64 arithmetic overflowed while computing a bound.
    #[error("overflow while computing a strengthened bound")]
    Overflow,
}

/// Engine-level errors with the dispositions of the error-handling design
#[derive(Error, Debug)]
pub enum SamplerError {
    #[error("Parse error: {source}")]
    Parse {
        #[from]
        source: ParseError,
    },

    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    #[error("Malformed array term '{term}': not a constant array or store chain")]
    MalformedArrayTerm { term: String },

    #[error("No graph edge registered for array equality '{equality}'")]
    MissingArrayEdge { equality: String },

    #[error("Solver executable '{path}' could not be started: {reason}")]
    SolverUnavailable { path: String, reason: String },

    #[error("Solver failure: {reason}")]
    SolverFailure { reason: String },

    #[error("Seed model does not satisfy the formula (at '{literal}')")]
    SeedModelMismatch { literal: String },

    #[error("Overflow while evaluating '{term}'")]
    EvalOverflow { term: String },

    #[error("Expression '{term}' has no {expected} value under the model")]
    SortError { term: String, expected: String },
}
