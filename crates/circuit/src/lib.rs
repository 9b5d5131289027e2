// SPDX-License-Identifier: LGPL-3.0-only
//
// This file is provided WITHOUT ANY WARRANTY;
// without even the implied warranty of MERCHANTABILITY
// or FITNESS FOR A PARTICULAR PURPOSE.

mod evaluator;
mod parser;
mod registry;
mod tree;

pub use evaluator::*;
pub use parser::*;
pub use registry::*;
pub use tree::*;
