//! Host values that only ever travel through a module as integer tokens.
//!
//! A module cannot hold a reference to a host object, so the host registers
//! the object and passes the returned [`Handle`] instead. When the module
//! hands the integer back it is looked up again, yielding the very same
//! object rather than a copy.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tracing::trace;

use crate::err::Error;
use crate::raw::RawValue;

/// A registered host value. Lookups return the identical allocation.
pub type OpaqueValue = Arc<dyn Any + Send + Sync>;

/// The token a module sees in place of an opaque host value.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Handle(i32);

impl Handle {
	pub fn id(&self) -> i32 {
		self.0
	}

	/// The handle as a plain `i32` call argument.
	pub fn transfer(&self) -> RawValue {
		RawValue::I32(self.0)
	}
}

impl fmt::Display for Handle {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "#{}", self.0)
	}
}

/// Maps handles to host values for the lifetime of one binding.
///
/// Handles are allocated monotonically starting at 1 and are never reused,
/// not even after [`release`](OpaqueRegistry::release).
#[derive(Default)]
pub struct OpaqueRegistry {
	values: HashMap<i32, OpaqueValue>,
	last: i32,
}

impl OpaqueRegistry {
	pub fn new() -> Self {
		Self::default()
	}

	/// Register a host value and return its handle.
	pub fn register(&mut self, value: OpaqueValue) -> Result<Handle, Error> {
		let id = self.last.checked_add(1).ok_or(Error::HandlesExhausted)?;
		self.last = id;
		self.values.insert(id, value);
		trace!(id, "registered opaque value");
		Ok(Handle(id))
	}

	pub fn lookup(&self, handle: Handle) -> Result<OpaqueValue, Error> {
		self.get(handle.0 as i64)
	}

	/// Look up a handle that came back from the module as a raw value.
	pub fn decode(&self, raw: RawValue) -> Result<OpaqueValue, Error> {
		match raw.as_i64() {
			Some(id) => self.get(id),
			None => Err(Error::ArgumentMismatch {
				export: "opaque".to_string(),
				reason: format!("expected an integer handle, found {}", raw.ty()),
			}),
		}
	}

	fn get(&self, id: i64) -> Result<OpaqueValue, Error> {
		i32::try_from(id)
			.ok()
			.and_then(|id| self.values.get(&id))
			.cloned()
			.ok_or(Error::UnknownOpaqueHandle(id))
	}

	/// Drop the registry's reference to a value.
	pub fn release(&mut self, handle: Handle) -> Option<OpaqueValue> {
		self.values.remove(&handle.0)
	}

	pub fn len(&self) -> usize {
		self.values.len()
	}

	pub fn is_empty(&self) -> bool {
		self.values.is_empty()
	}
}

impl fmt::Debug for OpaqueRegistry {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("OpaqueRegistry").field("len", &self.values.len()).field("last", &self.last).finish()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test_log::test]
	fn test_lookup_returns_identical_value() {
		let mut registry = OpaqueRegistry::new();
		let value: OpaqueValue = Arc::new(serde_json::json!({ "name": "peter" }));
		let handle = registry.register(value.clone()).unwrap();
		let found = registry.decode(handle.transfer()).unwrap();
		assert!(Arc::ptr_eq(&value, &found));
		assert_eq!(found.downcast_ref::<serde_json::Value>().unwrap()["name"], "peter");
	}

	#[test_log::test]
	fn test_equal_values_get_distinct_handles() {
		let mut registry = OpaqueRegistry::new();
		let a = registry.register(Arc::new(42_u32)).unwrap();
		let b = registry.register(Arc::new(42_u32)).unwrap();
		assert_ne!(a, b);
		assert_eq!(a.id(), 1);
		assert_eq!(b.id(), 2);
		assert_eq!(registry.len(), 2);
	}

	#[test_log::test]
	fn test_unknown_handle() {
		let registry = OpaqueRegistry::new();
		assert_eq!(registry.decode(RawValue::I32(7)).unwrap_err(), Error::UnknownOpaqueHandle(7));
		assert_eq!(registry.decode(RawValue::I64(1 << 40)).unwrap_err(), Error::UnknownOpaqueHandle(1 << 40));
	}

	#[test_log::test]
	fn test_released_handles_are_not_reused() {
		let mut registry = OpaqueRegistry::new();
		let a = registry.register(Arc::new("a")).unwrap();
		assert!(registry.release(a).is_some());
		assert!(registry.is_empty());
		assert_eq!(registry.lookup(a).unwrap_err(), Error::UnknownOpaqueHandle(1));
		let b = registry.register(Arc::new("b")).unwrap();
		assert_eq!(b.id(), 2);
	}

	mod properties {
		use std::collections::HashSet;

		use proptest::prelude::*;

		use super::*;

		proptest! {
			#[test]
			fn registrations_get_distinct_handles(values in proptest::collection::vec(any::<i64>(), 1..128)) {
				let mut registry = OpaqueRegistry::new();
				let mut seen = HashSet::new();
				for value in values {
					let shared: OpaqueValue = Arc::new(value);
					let handle = registry.register(shared.clone()).unwrap();
					prop_assert!(handle.id() > 0);
					prop_assert!(seen.insert(handle));
					let found = registry.decode(handle.transfer()).unwrap();
					prop_assert!(Arc::ptr_eq(&found, &shared));
				}
			}
		}
	}
}
