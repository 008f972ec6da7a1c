//! svndelta: svndiff delta windows and delta-chain combination in Rust.
//!
//! A revision stored as a chain of deltas can be rebuilt by applying each
//! delta in turn, which materializes every intermediate revision. This crate
//! instead composes the windows of the chain into a single window first and
//! applies that once to the base text.
//!
//! The crate provides:
//! - The svndiff window model and wire format (`svndiff`)
//! - Window composition over a splay-tree range index (`combine`)
//! - A chunked chain driver over streamed deltas (`chain`)
//! - A delta generator producing svndiff windows (`generator`)
//! - File-oriented helpers (`io`)
//! - An optional CLI (`cli` feature)
//!
//! # Quick Start
//!
//! ```no_run
//! use svndelta::combine::combine;
//! use svndelta::generator::{self, GeneratorOptions};
//!
//! let r0 = b"AAAA";
//! let r1 = b"AAAAAAAA";
//! let r2 = b"AAAAAAAABBBB";
//!
//! let d1 = generator::generate(r0, r1, GeneratorOptions::default()).unwrap();
//! let d2 = generator::generate(r1, r2, GeneratorOptions::default()).unwrap();
//!
//! // One window per delta here: compose the newer window onto the older one.
//! let combined = combine(&d1[0], &d2[0]).unwrap();
//! assert_eq!(combined.apply(r0).unwrap(), r2);
//! ```

pub mod chain;
pub mod combine;
pub mod error;
pub mod generator;
pub mod io;
pub mod svndiff;

#[cfg(feature = "cli")]
pub mod cli;

pub use chain::DeltaChain;
pub use combine::Combiner;
pub use error::{DeltaError, Result};
pub use svndiff::{DiffWindow, Instruction, InstructionKind, Version};
