// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Command-line front end for the Geti session layer.

pub mod command;
pub mod config;
