// SPDX-License-Identifier: LGPL-3.0-only
//
// This file is provided WITHOUT ANY WARRANTY;
// without even the implied warranty of MERCHANTABILITY
// or FITNESS FOR A PARTICULAR PURPOSE.

mod courier;
mod delegator;
mod handler;
mod pending;

pub use courier::*;
pub use delegator::*;
pub use handler::*;
pub use pending::*;
