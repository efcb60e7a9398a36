// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The down/up entry points (§4.4-§4.9): classify events, route them to
//! the right connection entry, drive delivery.

pub mod down;
pub mod up;
