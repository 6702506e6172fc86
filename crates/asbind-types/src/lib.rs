//! Memory-level building blocks for binding AssemblyScript modules.
//!
//! This crate knows how managed objects are laid out in a module's linear
//! memory: the allocation header, the runtime type information table, and the
//! encodings of strings, buffers and arrays. It talks to the execution engine
//! only through the [`controller::MemoryController`] trait.

#[macro_use]
mod mac;

pub mod cnf;
pub mod controller;
pub mod err;
pub mod header;
pub mod layout;
pub mod opaque;
pub mod raw;
pub mod rtti;
pub mod sequence;
pub mod transfer;

#[cfg(any(test, feature = "testing"))]
pub mod testing;
