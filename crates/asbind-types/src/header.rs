use anyhow::Result;

use crate::controller::MemoryController;
use crate::layout::{HEADER_SIZE, ID_OFFSET, SIZE_OFFSET};
use crate::raw::Ptr;

/// The two allocation header fields this crate interprets.
///
/// The header is written by the module allocator and lives immediately
/// before the object address. Decoding it is only meaningful when the
/// caller already knows the value is an allocator-produced address.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Header {
	/// Payload size in bytes
	pub size: u32,
	/// Runtime type id of the object
	pub id: u32,
}

impl Header {
	pub fn decode(controller: &dyn MemoryController, address: Ptr) -> Result<Self> {
		// An address inside the first header can never be a managed object
		address.checked_sub(HEADER_SIZE)?;
		let id = controller.read_u32(address.checked_sub(ID_OFFSET)?)?;
		let size = controller.read_u32(address.checked_sub(SIZE_OFFSET)?)?;
		Ok(Self {
			size,
			id,
		})
	}

	/// Read only the runtime id of the object at `address`.
	pub fn id_of(controller: &dyn MemoryController, address: Ptr) -> Result<u32> {
		Ok(Self::decode(controller, address)?.id)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::err::Error;
	use crate::testing::FakeModule;

	#[test_log::test]
	fn test_decode_header() {
		let mut module = FakeModule::new();
		let ptr = module.alloc(12, 7).unwrap();
		assert_eq!(
			Header::decode(&module, ptr).unwrap(),
			Header {
				size: 12,
				id: 7
			}
		);
		assert_eq!(Header::id_of(&module, ptr).unwrap(), 7);
	}

	#[test_log::test]
	fn test_address_below_header_is_a_fault() {
		let module = FakeModule::new();
		let err = Header::decode(&module, Ptr::from(4)).unwrap_err();
		assert!(matches!(err.downcast_ref::<Error>(), Some(Error::MemoryFault { .. })));
	}
}
