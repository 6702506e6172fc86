use std::fmt::Display;

use thiserror::Error;

use crate::raw::{Ptr, ValType};

/// An error raised while moving values across the module boundary.
///
/// Every variant describes a structural mismatch between what the host expects
/// and what the module's memory actually contains. None of them are transient,
/// so a failed call is never retried.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
	/// A read or write fell outside of the module's linear memory
	#[error(
		"Memory access out of bounds: address {address} + length {length} exceeds memory size {memory_size}"
	)]
	MemoryFault {
		address: u64,
		length: u64,
		memory_size: u64,
	},

	/// The runtime type id is not present in the RTTI table
	#[error("Unknown runtime type id {0}")]
	UnknownRuntimeId(u32),

	/// The concrete type of an object is incompatible with the requested type
	#[error("Type mismatch for the object at {address}: expected {expected}, found runtime id {found}")]
	TypeMismatch {
		address: Ptr,
		expected: String,
		found: u32,
	},

	/// Automatic detection could not match the object to any known type
	#[error("Unable to resolve the type of the object at {address} with runtime id {id}")]
	UnresolvedType {
		address: Ptr,
		id: u32,
	},

	/// The handle was never registered with this binding
	#[error("Unknown opaque handle {0}")]
	UnknownOpaqueHandle(i64),

	/// Every positive handle has been handed out by this binding
	#[error("No opaque handles are left in this binding")]
	HandlesExhausted,

	/// The class has no constructor export
	#[error("The class '{0}' has no constructor export and cannot be constructed")]
	NonConstructibleClass(String),

	/// A reference-typed property was read without a usable type
	#[error(
		"The property '{class}.{property}' returned an object of unknown type at {address}, a type hint is required"
	)]
	AmbiguousType {
		class: String,
		property: String,
		address: Ptr,
	},

	/// The value kind cannot be written into module memory
	#[error("Encoding {0} values into module memory is not supported")]
	UnsupportedEncoding(&'static str),

	/// A string in module memory is not valid UTF-16
	#[error("The string at {0} is not valid UTF-16")]
	InvalidText(Ptr),

	/// The module allocator did not return a usable address
	#[error("The module failed to allocate {size} bytes for runtime id {id}")]
	AllocationFailed {
		size: u32,
		id: u32,
	},

	/// The module has no function export with this name
	#[error("The module has no export named '{0}'")]
	UnknownExport(String),

	/// The module exports no members for this class
	#[error("The module has no class named '{0}'")]
	UnknownClass(String),

	/// The class exports no property or method with this name
	#[error("The class '{class}' has no member named '{member}'")]
	UnknownMember {
		class: String,
		member: String,
	},

	/// The property has a getter export but no setter export
	#[error("The property '{class}.{property}' is read-only")]
	ReadOnlyProperty {
		class: String,
		property: String,
	},

	/// The object behind a proxy no longer carries the runtime id it was resolved with
	#[error("The object at {address} changed from runtime id {expected} to {found}")]
	StaleProxy {
		address: Ptr,
		expected: u32,
		found: u32,
	},

	/// The arguments do not fit the export's signature
	#[error("Invalid arguments for '{export}': {reason}")]
	ArgumentMismatch {
		export: String,
		reason: String,
	},

	/// A type hint could not be parsed
	#[error("Invalid type hint '{0}'")]
	InvalidHint(String),

	/// A number was resolved under a type hint that requires an address
	#[error("A {found} value is not an address and cannot be resolved as {hint}")]
	NotAReference {
		hint: String,
		found: ValType,
	},

	/// A constructor export returned the null reference
	#[error("The constructor of '{0}' did not return an object")]
	NullConstruction(String),
}

/// Adds a human readable prefix to an error while keeping its source intact.
///
/// The wrapped error can still be recovered with `anyhow::Error::downcast_ref`.
pub trait PrefixError<T> {
	fn prefix_err<F, S>(self, prefix: F) -> anyhow::Result<T>
	where
		F: FnOnce() -> S,
		S: Display + Send + Sync + 'static;
}

impl<T, E> PrefixError<T> for Result<T, E>
where
	E: Into<anyhow::Error>,
{
	fn prefix_err<F, S>(self, prefix: F) -> anyhow::Result<T>
	where
		F: FnOnce() -> S,
		S: Display + Send + Sync + 'static,
	{
		self.map_err(|e| e.into().context(prefix()))
	}
}

impl<T> PrefixError<T> for Option<T> {
	fn prefix_err<F, S>(self, prefix: F) -> anyhow::Result<T>
	where
		F: FnOnce() -> S,
		S: Display + Send + Sync + 'static,
	{
		self.ok_or_else(|| anyhow::anyhow!("{}", prefix()))
	}
}
