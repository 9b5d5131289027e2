// SPDX-License-Identifier: LGPL-3.0-only
//
// This file is provided WITHOUT ANY WARRANTY;
// without even the implied warranty of MERCHANTABILITY
// or FITNESS FOR A PARTICULAR PURPOSE.

mod engine;
mod protocol;
mod suite_protocol;

pub use engine::*;
pub use protocol::*;
pub use suite_protocol::*;
