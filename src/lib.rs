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

//! MeGASampler
//!
//! A uniform-ish sampler for satisfying assignments of quantifier-free
//! SMT formulas over linear integer arithmetic with arrays. Each epoch
//! takes one solver model, generalizes it into an interval box entailed
//! by the formula, and draws many cheap samples from the box.

pub mod arrays;
pub mod driver;
pub mod error;
pub mod expr;
pub mod implicant;
pub mod interval;
pub mod model;
pub mod oracle;
pub mod preprocess;
pub mod sampling;
pub mod smtlib;
pub mod strengthen;

pub use driver::{MegaSampler, RunStats, SamplerConfig};
pub use error::{ParseError, SamplerError, StrengthenError};
pub use expr::{Expr, Sort};
pub use interval::{Interval, IntervalMap};
pub use oracle::{ConcreteModel, Oracle, SatResult, Z3Oracle};
pub use preprocess::{preprocess, Preprocessed};
