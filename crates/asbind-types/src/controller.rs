//! Access to a module instance's linear memory and exports.
//!
//! The execution engine is an external collaborator. Everything this crate
//! needs from it is captured by [`MemoryController`]: reading and writing raw
//! bytes, enumerating function exports, reading globals and invoking an export
//! with engine-level values.
//!
//! # Memory Model
//!
//! Linear memory is a contiguous, little-endian byte array. Writes through the
//! controller mutate the module's memory directly and are immediately visible
//! to any module code that runs afterwards. There is no locking: a controller
//! is driven from a single thread and nothing else may touch the memory while
//! a call is in progress.

use anyhow::Result;
use tracing::{trace, warn};

use crate::cnf::{ALLOC_EXPORT, PIN_EXPORT, UNPIN_EXPORT};
use crate::err::Error;
use crate::raw::{Export, Ptr, RawValue, Signature};

/// Access to the memory and exports of one instantiated module.
///
/// # Implementation Notes
///
/// Implementers must:
/// - Fail out-of-range accesses with [`Error::MemoryFault`] (see [`check_bounds`])
/// - Report function exports with their engine signatures
/// - Return `Ok(None)` from [`invoke`](MemoryController::invoke) for exports without results
///
/// # Example
///
/// ```rust,ignore
/// use asbind_types::controller::MemoryController;
///
/// struct MyController {
///     memory: Vec<u8>,
/// }
///
/// impl MemoryController for MyController {
///     fn memory_size(&self) -> u64 {
///         self.memory.len() as u64
///     }
///
///     fn read(&self, ptr: Ptr, len: u32) -> Result<Vec<u8>> {
///         check_bounds(ptr, len, self.memory_size())?;
///         Ok(self.memory[*ptr as usize..(*ptr + len) as usize].to_vec())
///     }
///
///     // ...
/// }
/// ```
pub trait MemoryController {
	/// The current size of linear memory in bytes.
	fn memory_size(&self) -> u64;

	/// Copy `len` bytes starting at `ptr` out of linear memory.
	///
	/// # Errors
	///
	/// Returns [`Error::MemoryFault`] if the range exceeds the memory size.
	fn read(&self, ptr: Ptr, len: u32) -> Result<Vec<u8>>;

	/// Copy `data` into linear memory starting at `ptr`.
	///
	/// # Errors
	///
	/// Returns [`Error::MemoryFault`] if the range exceeds the memory size.
	fn write(&mut self, ptr: Ptr, data: &[u8]) -> Result<()>;

	/// All function exports of the module, in export order.
	fn exports(&self) -> &[Export];

	/// Read an exported global, returning `None` if the module has no such global.
	fn global(&mut self, name: &str) -> Result<Option<RawValue>>;

	/// Invoke a function export.
	///
	/// # Errors
	///
	/// Returns [`Error::UnknownExport`] if the module has no such function, or
	/// the engine error if the call traps.
	fn invoke(&mut self, name: &str, args: &[RawValue]) -> Result<Option<RawValue>>;

	/// The signature of a function export.
	fn signature(&self, name: &str) -> Option<&Signature> {
		self.exports().iter().find(|e| e.name == name).map(|e| &e.signature)
	}

	fn has_export(&self, name: &str) -> bool {
		self.signature(name).is_some()
	}

	fn read_u16(&self, ptr: Ptr) -> Result<u16> {
		let mem = self.read(ptr, 2)?;
		Ok(u16::from_le_bytes(mem[0..2].try_into()?))
	}

	fn read_u32(&self, ptr: Ptr) -> Result<u32> {
		let mem = self.read(ptr, 4)?;
		Ok(u32::from_le_bytes(mem[0..4].try_into()?))
	}

	fn read_i32(&self, ptr: Ptr) -> Result<i32> {
		let mem = self.read(ptr, 4)?;
		Ok(i32::from_le_bytes(mem[0..4].try_into()?))
	}

	fn read_u64(&self, ptr: Ptr) -> Result<u64> {
		let mem = self.read(ptr, 8)?;
		Ok(u64::from_le_bytes(mem[0..8].try_into()?))
	}

	fn read_i64(&self, ptr: Ptr) -> Result<i64> {
		let mem = self.read(ptr, 8)?;
		Ok(i64::from_le_bytes(mem[0..8].try_into()?))
	}

	fn read_f32(&self, ptr: Ptr) -> Result<f32> {
		let mem = self.read(ptr, 4)?;
		Ok(f32::from_le_bytes(mem[0..4].try_into()?))
	}

	fn read_f64(&self, ptr: Ptr) -> Result<f64> {
		let mem = self.read(ptr, 8)?;
		Ok(f64::from_le_bytes(mem[0..8].try_into()?))
	}

	fn write_u32(&mut self, ptr: Ptr, value: u32) -> Result<()> {
		self.write(ptr, &value.to_le_bytes())
	}

	fn write_i32(&mut self, ptr: Ptr, value: i32) -> Result<()> {
		self.write(ptr, &value.to_le_bytes())
	}

	fn write_i64(&mut self, ptr: Ptr, value: i64) -> Result<()> {
		self.write(ptr, &value.to_le_bytes())
	}

	fn write_f32(&mut self, ptr: Ptr, value: f32) -> Result<()> {
		self.write(ptr, &value.to_le_bytes())
	}

	fn write_f64(&mut self, ptr: Ptr, value: f64) -> Result<()> {
		self.write(ptr, &value.to_le_bytes())
	}

	/// Allocate a managed object of `size` payload bytes with runtime type `id`.
	///
	/// The module's allocator writes the allocation header; the payload is
	/// left for the caller to fill.
	fn alloc(&mut self, size: u32, id: u32) -> Result<Ptr> {
		let args = [RawValue::I32(size as i32), RawValue::I32(id as i32)];
		let ptr = match self.invoke(&ALLOC_EXPORT, &args)? {
			Some(RawValue::I32(ptr)) if ptr > 0 => Ptr::from(ptr as u32),
			_ => {
				return Err(Error::AllocationFailed {
					size,
					id,
				}
				.into());
			}
		};
		trace!(%ptr, size, id, "allocated managed object");
		Ok(ptr)
	}

	/// Keep a managed object alive while the host holds its address.
	///
	/// Modules built without an exported runtime have nothing to pin, in which
	/// case this is a no-op.
	fn pin(&mut self, ptr: Ptr) -> Result<()> {
		if self.has_export(&PIN_EXPORT) {
			self.invoke(&PIN_EXPORT, &[ptr.into()])?;
		}
		Ok(())
	}

	/// Release an object previously passed to [`pin`](MemoryController::pin).
	fn unpin(&mut self, ptr: Ptr) -> Result<()> {
		if self.has_export(&UNPIN_EXPORT) {
			self.invoke(&UNPIN_EXPORT, &[ptr.into()])?;
		}
		Ok(())
	}

	/// Unpin every object in `pinned`, even if some of them fail, and return
	/// the first failure.
	fn unpin_all(&mut self, pinned: &[Ptr]) -> Result<()> {
		let mut result = Ok(());
		for ptr in pinned {
			if let Err(e) = self.unpin(*ptr) {
				warn!(%ptr, error = %e, "failed to unpin object");
				if result.is_ok() {
					result = Err(e);
				}
			}
		}
		result
	}
}

/// Fail with [`Error::MemoryFault`] unless `ptr..ptr + len` lies within `memory_size`.
pub fn check_bounds(ptr: Ptr, len: u32, memory_size: u64) -> Result<(), Error> {
	let end = *ptr as u64 + len as u64;
	if end > memory_size {
		return Err(Error::MemoryFault {
			address: *ptr as u64,
			length: len as u64,
			memory_size,
		});
	}
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::raw::ValType;
	use crate::testing::FakeModule;

	#[test_log::test]
	fn test_check_bounds() {
		assert!(check_bounds(Ptr::from(0), 16, 16).is_ok());
		assert!(check_bounds(Ptr::from(12), 4, 16).is_ok());
		assert_eq!(
			check_bounds(Ptr::from(12), 8, 16),
			Err(Error::MemoryFault {
				address: 12,
				length: 8,
				memory_size: 16,
			})
		);
	}

	#[test_log::test]
	fn test_numeric_round_trip() {
		let mut module = FakeModule::new();
		let ptr = module.alloc(24, 5).unwrap();
		module.write_i32(ptr, -7).unwrap();
		module.write_f64(ptr.checked_add(8).unwrap(), 2.5).unwrap();
		module.write_i64(ptr.checked_add(16).unwrap(), i64::MIN).unwrap();
		assert_eq!(module.read_i32(ptr).unwrap(), -7);
		assert_eq!(module.read_u32(ptr).unwrap(), (-7_i32) as u32);
		assert_eq!(module.read_f64(ptr.checked_add(8).unwrap()).unwrap(), 2.5);
		assert_eq!(module.read_i64(ptr.checked_add(16).unwrap()).unwrap(), i64::MIN);
	}

	#[test_log::test]
	fn test_out_of_range_read_is_a_memory_fault() {
		let module = FakeModule::new();
		let size = module.memory_size();
		let err = module.read(Ptr::from(size as u32 - 2), 4).unwrap_err();
		assert!(matches!(err.downcast_ref::<Error>(), Some(Error::MemoryFault { .. })));
	}

	#[test_log::test]
	fn test_pin_without_runtime_exports_is_a_no_op() {
		let mut module = FakeModule::new();
		let ptr = module.alloc(4, 5).unwrap();
		assert!(module.pin(ptr).is_ok());
		assert!(module.unpin(ptr).is_ok());
	}

	#[test_log::test]
	fn test_unpin_all_releases_every_object() {
		let mut module = FakeModule::new()
			.function(&UNPIN_EXPORT, &[ValType::I32], &[], |_, _| anyhow::bail!("collector is busy"));
		let a = module.alloc(4, 5).unwrap();
		let b = module.alloc(4, 5).unwrap();
		let err = module.unpin_all(&[a, b]).unwrap_err();
		assert_eq!(err.to_string(), "collector is busy");
		assert_eq!(module.calls(), &["__new", "__new", "__unpin", "__unpin"]);
	}
}
