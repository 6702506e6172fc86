//! Host-side bindings for WebAssembly modules built with the AssemblyScript
//! managed runtime.
//!
//! This crate bundles the workspace crates behind a single dependency:
//!
//! - [`types`] holds the memory model: allocation headers, runtime type
//!   information, the string and buffer codecs and opaque handles.
//! - [`runtime`] discovers exported classes, resolves raw results into host
//!   [`Value`]s and drives a module through [`Module`].
//!
//! ```rust,ignore
//! use asbind::prelude::*;
//!
//! let mut module = Module::bind(Controller::from_file("build/release.wasm")?)?;
//! let foo = module.call("getFoo", &[], Some(TypeHint::class("Foo")))?;
//! ```

#[doc(inline)]
pub use asbind_runtime as runtime;
#[doc(inline)]
pub use asbind_types as types;

pub use asbind_runtime::prelude::*;

pub mod prelude {
	pub use asbind_runtime::prelude::*;
}
