//! Moving strings and byte buffers in and out of module memory.
//!
//! # Memory Layout
//!
//! Both types are stored as a single managed object. The payload size is
//! taken from the allocation header:
//! ```text
//! String:      [header, id 1][UTF-16LE code units]
//! ArrayBuffer: [header, id 0][raw bytes]
//! ```

use anyhow::Result;
use tracing::trace;

use crate::cnf::MAX_DECODE_LENGTH;
use crate::controller::MemoryController;
use crate::err::Error;
use crate::header::Header;
use crate::layout::{ARRAYBUFFER_ID, STRING_ID};
use crate::raw::Ptr;

/// A host type with a managed-object representation in module memory.
pub trait Transfer: Sized {
	/// Allocate a managed object in module memory and copy `self` into it.
	fn transfer(self, controller: &mut dyn MemoryController) -> Result<Ptr>;

	/// Copy the managed object at `ptr` out of module memory.
	fn receive(ptr: Ptr, controller: &dyn MemoryController) -> Result<Self>;
}

/// Decode the header at `ptr`, requiring runtime id `expected`.
fn payload(
	controller: &dyn MemoryController,
	ptr: Ptr,
	expected: u32,
	name: &str,
) -> Result<Header> {
	let header = Header::decode(controller, ptr)?;
	if header.id != expected {
		return Err(Error::TypeMismatch {
			address: ptr,
			expected: name.to_string(),
			found: header.id,
		}
		.into());
	}
	if header.size > *MAX_DECODE_LENGTH {
		return Err(Error::MemoryFault {
			address: *ptr as u64,
			length: header.size as u64,
			memory_size: controller.memory_size(),
		}
		.into());
	}
	Ok(header)
}

impl Transfer for String {
	fn transfer(self, controller: &mut dyn MemoryController) -> Result<Ptr> {
		let bytes = self.encode_utf16().flat_map(u16::to_le_bytes).collect::<Vec<u8>>();
		let ptr = controller.alloc(bytes.len() as u32, STRING_ID)?;
		controller.write(ptr, &bytes)?;
		trace!(%ptr, units = bytes.len() / 2, "transferred string");
		Ok(ptr)
	}

	fn receive(ptr: Ptr, controller: &dyn MemoryController) -> Result<Self> {
		let header = payload(controller, ptr, STRING_ID, "String")?;
		let bytes = controller.read(ptr, header.size & !1)?;
		let units = bytes.chunks_exact(2).map(|c| u16::from_le_bytes([c[0], c[1]])).collect::<Vec<_>>();
		Ok(String::from_utf16(&units).map_err(|_| Error::InvalidText(ptr))?)
	}
}

impl Transfer for Vec<u8> {
	fn transfer(self, controller: &mut dyn MemoryController) -> Result<Ptr> {
		let ptr = controller.alloc(self.len() as u32, ARRAYBUFFER_ID)?;
		controller.write(ptr, &self)?;
		trace!(%ptr, len = self.len(), "transferred buffer");
		Ok(ptr)
	}

	fn receive(ptr: Ptr, controller: &dyn MemoryController) -> Result<Self> {
		let header = payload(controller, ptr, ARRAYBUFFER_ID, "ArrayBuffer")?;
		controller.read(ptr, header.size)
	}
}
