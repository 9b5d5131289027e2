// SPDX-License-Identifier: LGPL-3.0-only
//
// This file is provided WITHOUT ANY WARRANTY;
// without even the implied warranty of MERCHANTABILITY
// or FITNESS FOR A PARTICULAR PURPOSE.

mod aggregation;
mod envelope;
mod error;
mod id;
mod party;
mod request;
mod seed;

pub use aggregation::*;
pub use envelope::*;
pub use error::*;
pub use id::*;
pub use party::*;
pub use request::*;
pub use seed::*;
