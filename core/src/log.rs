/*
 * log.rs
 * Copyright (C) 2026 Chris Burdess
 *
 * This file is part of Histofeed, a keep-alive HTTPS feed fetcher.
 *
 * Histofeed is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * Histofeed is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with Histofeed.  If not, see <http://www.gnu.org/licenses/>.
 */

//! Verbosity-gated tracing.
//!
//! Errors always go straight to `tracing::warn!` / `tracing::error!`. Progress chatter goes
//! through `verbose!`, which checks the `Verbosity` carried by the engine or stash before
//! emitting: Normal → info, Verbose → debug, Firehose → trace.

macro_rules! verbose {
    ($verbosity:expr, Normal, $($t:tt)*) => {
        if $verbosity.allows($crate::config::Verbosity::Normal) {
            tracing::info!($($t)*);
        }
    };
    ($verbosity:expr, Verbose, $($t:tt)*) => {
        if $verbosity.allows($crate::config::Verbosity::Verbose) {
            tracing::debug!($($t)*);
        }
    };
    ($verbosity:expr, Firehose, $($t:tt)*) => {
        if $verbosity.allows($crate::config::Verbosity::Firehose) {
            tracing::trace!($($t)*);
        }
    };
}
