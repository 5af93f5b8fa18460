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

//! SMT-LIB 2 front end for QF_LIA / QF_ALIA
//!
//! The lexer and S-expression reader are shared between the input-file
//! parser and the solver-response decoder in the oracle module.

pub mod lexer;
pub mod parser;

pub use lexer::{Lexer, Token, TokenType};
pub use parser::{parse_script, parse_sexprs, SExpr, SExprKind, Script};
