/*
 * icesmtp - SMTP protocol engine
 * Copyright (C) 2022 viridIT SAS
 *
 * This program is free software: you can redistribute it and/or modify it under
 * the terms of the GNU General Public License as published by the Free Software
 * Foundation, either version 3 of the License, or any later version.
 *
 * This program is distributed in the hope that it will be useful, but WITHOUT
 * ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
 * FOR A PARTICULAR PURPOSE.  See the GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License along with
 * this program. If not, see https://www.gnu.org/licenses/.
 *
*/

//! icesmtp common types
//!
//! The protocol vocabulary shared by the icesmtp crates: reply codes and
//! their wire formatting, the session state taxonomy, resource limits and
//! the ESMTP extension set.

#![doc(html_no_source)]
#![deny(missing_docs)]
#![forbid(unsafe_code)]
//
#![warn(rust_2018_idioms)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(clippy::cargo)]
//
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::std_instead_of_core)]

mod disconnect;
mod extensions;
mod limits;
mod reply;
mod reply_code;
mod state;

pub use disconnect::DisconnectReason;
pub use extensions::Extensions;
pub use limits::SessionLimits;
pub use reply::Reply;
pub use reply_code::{EnhancedCode, ReplyCode};
pub use state::State;
