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

/// The set of ESMTP extensions a session is willing to advertise.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extensions {
    /// STARTTLS (RFC 3207).
    pub starttls: bool,
    /// SIZE (RFC 1870).
    pub size: bool,
    /// 8BITMIME (RFC 6152).
    pub eight_bit_mime: bool,
    /// PIPELINING (RFC 2920).
    pub pipelining: bool,
    /// ENHANCEDSTATUSCODES (RFC 2034).
    pub enhanced_status_codes: bool,
    /// SMTPUTF8 (RFC 6531).
    pub smtputf8: bool,
    /// AUTH (RFC 4954).
    pub auth: bool,
    /// The VRFY command.
    pub vrfy: bool,
    /// The EXPN command.
    pub expn: bool,
    /// The HELP command.
    pub help: bool,
}

impl Default for Extensions {
    fn default() -> Self {
        Self {
            starttls: true,
            size: true,
            eight_bit_mime: true,
            pipelining: true,
            enhanced_status_codes: true,
            smtputf8: false,
            auth: false,
            vrfy: false,
            expn: false,
            help: true,
        }
    }
}

impl Extensions {
    /// An extension set with everything switched off.
    #[must_use]
    pub const fn none() -> Self {
        Self {
            starttls: false,
            size: false,
            eight_bit_mime: false,
            pipelining: false,
            enhanced_status_codes: false,
            smtputf8: false,
            auth: false,
            vrfy: false,
            expn: false,
            help: false,
        }
    }
}
