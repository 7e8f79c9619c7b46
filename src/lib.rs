// SPDX-License-Identifier: MIT

pub mod daemon;
pub mod engine;
