// SPDX-License-Identifier: MIT

//! Attribute-logic routing engine
//!
//! Given an AND/OR query tree over team-member attributes, finds the members
//! a booking should be routed to, with an optional fallback tree.

pub mod catalog;
pub mod config;
pub mod error;
pub mod logic;
pub mod routing;
