//! The runtime type information table exported by a module.
//!
//! The table starts with a `u32` entry count, followed by one 8 byte entry per
//! runtime id holding the type flags and the id of the base class. Ids index
//! directly into the table.

use std::collections::HashSet;
use std::fmt;

use anyhow::Result;
use tracing::{debug, trace};

use crate::controller::MemoryController;
use crate::err::Error;
use crate::layout::{
	ARRAY, ARRAYBUFFERVIEW, MAP, SET, VAL_ALIGN_OFFSET, VAL_FLOAT, VAL_MANAGED, VAL_NULLABLE,
	VAL_SIGNED,
};
use crate::raw::{Ptr, RawValue};

/// The decoded flags of a runtime type.
#[derive(Clone, Copy, Default, Eq, Hash, PartialEq)]
pub struct Flags(u32);

impl Flags {
	pub fn new(bits: u32) -> Self {
		Self(bits)
	}

	pub fn bits(&self) -> u32 {
		self.0
	}

	pub fn has(&self, flag: u32) -> bool {
		self.0 & flag != 0
	}

	pub fn is_array(&self) -> bool {
		self.has(ARRAY)
	}

	pub fn is_view(&self) -> bool {
		self.has(ARRAYBUFFERVIEW)
	}

	/// Whether values of this type hold a sequence of elements.
	pub fn is_sequence(&self) -> bool {
		self.is_array() || self.is_view()
	}

	pub fn is_set(&self) -> bool {
		self.has(SET)
	}

	pub fn is_map(&self) -> bool {
		self.has(MAP)
	}

	/// The log2 size of the element type, or `None` if the type has no elements.
	pub fn value_align(&self) -> Option<u32> {
		let field = (self.0 >> VAL_ALIGN_OFFSET) & 31;
		match field {
			0 => None,
			v => Some(31 - v.leading_zeros()),
		}
	}

	pub fn value_signed(&self) -> bool {
		self.has(VAL_SIGNED)
	}

	pub fn value_float(&self) -> bool {
		self.has(VAL_FLOAT)
	}

	pub fn value_nullable(&self) -> bool {
		self.has(VAL_NULLABLE)
	}

	pub fn value_managed(&self) -> bool {
		self.has(VAL_MANAGED)
	}
}

impl fmt::Debug for Flags {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "Flags({:#x})", self.0)
	}
}

/// One entry of the RTTI table.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct RttiType {
	pub id: u32,
	pub base: Option<u32>,
	pub flags: Flags,
}

/// An immutable copy of the RTTI table, read once when a module is bound.
#[derive(Clone, Debug, Default)]
pub struct RttiRegistry {
	types: Vec<RttiType>,
}

impl RttiRegistry {
	/// A registry for a module built without runtime type information.
	pub fn empty() -> Self {
		Self::default()
	}

	/// Build a registry from explicit entries, indexed by their position.
	pub fn from_types(types: Vec<RttiType>) -> Self {
		Self {
			types,
		}
	}

	/// Read the table located at `base`.
	pub fn build(controller: &dyn MemoryController, base: Ptr) -> Result<Self> {
		let count = controller.read_u32(base)?;
		let mut types = Vec::with_capacity(count.min(4096) as usize);
		for id in 0..count {
			let entry = base.checked_add(id.saturating_mul(8).saturating_add(4))?;
			let flags = controller.read_u32(entry)?;
			let base_id = controller.read_u32(entry.checked_add(4)?)?;
			let ty = RttiType {
				id,
				base: (base_id != 0 && id != 0).then_some(base_id),
				flags: Flags::new(flags),
			};
			trace!(id, ?ty.base, ?ty.flags, "read rtti entry");
			types.push(ty);
		}
		debug!(%base, count, "loaded runtime type information");
		Ok(Self {
			types,
		})
	}

	/// Read the table whose address is stored in the global `export`.
	///
	/// Modules built without runtime type information do not export the
	/// global, in which case the registry is empty.
	pub fn load(controller: &mut dyn MemoryController, export: &str) -> Result<Self> {
		match controller.global(export)? {
			Some(RawValue::I32(base)) => Self::build(controller, Ptr::from(base as u32)),
			Some(other) => anyhow::bail!("The global '{export}' must be an i32, found {}", other.ty()),
			None => {
				debug!(export, "module exports no runtime type information");
				Ok(Self::empty())
			}
		}
	}

	pub fn len(&self) -> usize {
		self.types.len()
	}

	pub fn is_empty(&self) -> bool {
		self.types.is_empty()
	}

	pub fn get(&self, id: u32) -> Option<&RttiType> {
		self.types.get(id as usize)
	}

	pub fn lookup(&self, id: u32) -> Result<&RttiType, Error> {
		self.get(id).ok_or(Error::UnknownRuntimeId(id))
	}

	/// Iterate `id` and then its base classes, nearest first.
	pub fn ancestors(&self, id: u32) -> Ancestors<'_> {
		Ancestors {
			registry: self,
			next: Some(id),
			seen: HashSet::new(),
		}
	}

	/// Returns true if `ancestor` is `candidate` or one of its base classes.
	pub fn is_ancestor(&self, candidate: u32, ancestor: u32) -> bool {
		self.ancestors(candidate).any(|id| id == ancestor)
	}
}

/// Iterator over a runtime id and its base classes.
pub struct Ancestors<'a> {
	registry: &'a RttiRegistry,
	next: Option<u32>,
	seen: HashSet<u32>,
}

impl Iterator for Ancestors<'_> {
	type Item = u32;

	fn next(&mut self) -> Option<u32> {
		let id = self.next.take()?;
		// A malformed table may contain a cycle
		if !self.seen.insert(id) {
			return None;
		}
		self.next = self.registry.get(id).and_then(|t| t.base);
		Some(id)
	}
}

#[cfg(test)]
mod tests {
	use rstest::rstest;

	use super::*;
	use crate::layout::value_align_flag;
	use crate::testing::FakeModule;

	fn registry() -> RttiRegistry {
		// 0: ArrayBuffer, 1: String, 2: ArrayBufferView,
		// 3: Animal, 4: Dog extends Animal, 5: Puppy extends Dog, 6: Car
		let mut module = FakeModule::new().with_rtti(&[
			(0, 0),
			(0, 0),
			(0, 0),
			(0, 0),
			(0, 3),
			(0, 4),
			(0, 0),
		]);
		RttiRegistry::load(&mut module, "__rtti_base").unwrap()
	}

	#[rstest]
	#[case::self_is_ancestor(4, 4, true)]
	#[case::direct_base(4, 3, true)]
	#[case::transitive_base(5, 3, true)]
	#[case::descendant_is_not_ancestor(3, 5, false)]
	#[case::unrelated(6, 3, false)]
	#[case::unknown_id(42, 3, false)]
	fn test_is_ancestor(#[case] candidate: u32, #[case] ancestor: u32, #[case] expected: bool) {
		assert_eq!(registry().is_ancestor(candidate, ancestor), expected);
	}

	#[test_log::test]
	fn test_load() {
		let rtti = registry();
		assert_eq!(rtti.len(), 7);
		assert_eq!(rtti.lookup(5).unwrap().base, Some(4));
		assert_eq!(rtti.lookup(3).unwrap().base, None);
		assert_eq!(rtti.ancestors(5).collect::<Vec<_>>(), vec![5, 4, 3]);
		assert_eq!(rtti.lookup(7), Err(Error::UnknownRuntimeId(7)));
	}

	#[test_log::test]
	fn test_load_without_table() {
		let mut module = FakeModule::new();
		let rtti = RttiRegistry::load(&mut module, "__rtti_base").unwrap();
		assert!(rtti.is_empty());
		assert_eq!(rtti.lookup(1), Err(Error::UnknownRuntimeId(1)));
		assert!(rtti.is_ancestor(9, 9));
	}

	#[test_log::test]
	fn test_cycle_terminates() {
		let rtti = RttiRegistry::from_types(vec![
			RttiType {
				id: 0,
				base: None,
				flags: Flags::default(),
			},
			RttiType {
				id: 1,
				base: Some(2),
				flags: Flags::default(),
			},
			RttiType {
				id: 2,
				base: Some(1),
				flags: Flags::default(),
			},
		]);
		assert!(!rtti.is_ancestor(1, 0));
		assert_eq!(rtti.ancestors(1).count(), 2);
	}

	#[rstest]
	#[case::none(0, None)]
	#[case::byte(value_align_flag(0), Some(0))]
	#[case::int(value_align_flag(2), Some(2))]
	#[case::long(value_align_flag(3) | VAL_SIGNED, Some(3))]
	fn test_value_align(#[case] bits: u32, #[case] expected: Option<u32>) {
		assert_eq!(Flags::new(bits).value_align(), expected);
	}
}
