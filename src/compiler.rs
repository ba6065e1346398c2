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
//! Turns a score into bus operations in two passes.
//!
//! The first pass produces logical register writes at musical timestamps. The
//! second pass splits each write into its address and data phases, spacing them
//! by the bus settle delay and serializing writes that share a timestamp.

pub mod pass1;
pub mod pass2;

pub use pass1::{compile_pass1, midi_to_key_code, CompileError, Note, Operator, Score, Voice};
pub use pass2::compile_pass2;
