//! Core compile and verify workflows for promptgen.
//!
//! This crate ties together header parsing, tool mapping, reference
//! rewriting, and artifact storage into the two end-to-end runs:
//! [`compiler::compile`] and [`verify::verify`].

pub mod assembler;
pub mod compiler;
pub mod pipeline;
pub mod tools;
pub mod verify;
