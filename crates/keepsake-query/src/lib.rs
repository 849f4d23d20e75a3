//! Predicate queries for Keepsake.
//!
//! A [`Query`] is a list of field predicates. [`filter`] keeps the elements
//! the query matches, [`exclude`] keeps the elements for which every predicate
//! is false. Evaluation is generic over anything implementing [`Queryable`].

pub mod engine;
pub mod predicate;

pub use engine::{exclude, filter, matches, rejects, Queryable};
pub use predicate::{Clause, Match, Predicate, Query};
