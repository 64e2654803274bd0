//! cf-logic: the plugin-link expression engine
//!
//! An expression is a flat token list mixing plugin uids and the operators
//! `&` (and), `|` (or), `:` (attach effect) and the `~` uncut prefix.
//! Validated token streams compile into pipelines of nodes; at analysis time
//! the engine yields the next plugin to run given the previous detector's
//! verdict, short-circuiting the way boolean evaluation does.

mod analyzer;
mod link;
mod token;
mod validate;

pub use analyzer::*;
pub use link::*;
pub use token::*;
pub use validate::*;
