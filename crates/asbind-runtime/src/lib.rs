//! Bindings between host values and AssemblyScript modules.
//!
//! A [`Module`](module::Module) wraps any [`MemoryController`] and exposes the
//! module's exports as host-callable functions and classes:
//!
//! ```rust,ignore
//! use asbind_runtime::prelude::*;
//!
//! let controller = Controller::from_file("build/release.wasm")?;
//! let config = BindConfig::default().export("helloworld", TypeHint::Text);
//! let mut module = Module::bind_with(controller, config)?;
//!
//! let greeting = module.call("helloworld", &["peter".into()], None)?;
//! assert_eq!(greeting.as_str(), Some("hello, peter"));
//!
//! let file = module.construct("File", &[])?;
//! file.set(&mut module, "size", 42)?;
//! assert_eq!(file.get(&mut module, "size")?, Value::I32(42));
//! ```
//!
//! [`MemoryController`]: asbind_types::controller::MemoryController

pub mod class;
pub mod config;
#[cfg(feature = "wasmtime")]
pub mod controller;
pub mod hint;
pub mod module;
pub mod proxy;
pub mod resolver;
pub mod value;

pub mod prelude {
	pub use asbind_types::controller::MemoryController;
	pub use asbind_types::err::Error;
	pub use asbind_types::opaque::{Handle, OpaqueValue};

	pub use crate::config::BindConfig;
	#[cfg(feature = "wasmtime")]
	pub use crate::controller::Controller;
	pub use crate::hint::TypeHint;
	pub use crate::module::{Function, Module};
	pub use crate::proxy::ClassProxy;
	pub use crate::value::Value;
}
