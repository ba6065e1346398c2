// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
//! Compiles note sequences into timed YM2151 register writes and plays them
//! through an emulated chip.

pub mod analysis;
pub mod audio;
pub mod chip;
pub mod compiler;
pub mod config;
pub mod events;
pub mod playback;
pub mod session;
pub mod timing;
pub mod util;

#[cfg(test)]
mod testutil;
