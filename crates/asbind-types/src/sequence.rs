//! Decoding `Array<T>` and typed arrays out of module memory.
//!
//! # Memory Layout
//!
//! Both shapes share the `ArrayBufferView` fields; `Array<T>` adds a length:
//! ```text
//! +0  buffer      pointer to the backing ArrayBuffer
//! +4  dataStart   pointer to the first element
//! +8  byteLength  size of the element data in bytes
//! +12 length      element count (Array<T> only)
//! ```
//! Elements are stored back to back with a stride of `1 << align` bytes.

use std::fmt;

use anyhow::Result;
use tracing::trace;

use crate::cnf::MAX_DECODE_LENGTH;
use crate::controller::MemoryController;
use crate::err::Error;
use crate::layout::{ARRAY_LENGTH_OFFSET, ARRAYBUFFERVIEW_DATALENGTH_OFFSET, ARRAYBUFFERVIEW_DATASTART_OFFSET};
use crate::raw::{Ptr, RawValue};
use crate::rtti::RttiType;

/// The storage type of a sequence element.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum ElementKind {
	I8,
	U8,
	I16,
	U16,
	I32,
	U32,
	I64,
	U64,
	F32,
	F64,
	/// A reference to another managed object
	Managed,
}

impl ElementKind {
	/// Derive the element kind from the value flags of an RTTI entry.
	pub fn from_rtti(ty: &RttiType) -> Option<Self> {
		let flags = ty.flags;
		if flags.value_managed() {
			return Some(Self::Managed);
		}
		let kind = match (flags.value_align()?, flags.value_float(), flags.value_signed()) {
			(0, false, true) => Self::I8,
			(0, false, false) => Self::U8,
			(1, false, true) => Self::I16,
			(1, false, false) => Self::U16,
			(2, true, _) => Self::F32,
			(2, false, true) => Self::I32,
			(2, false, false) => Self::U32,
			(3, true, _) => Self::F64,
			(3, false, true) => Self::I64,
			(3, false, false) => Self::U64,
			_ => return None,
		};
		Some(kind)
	}

	/// The log2 size of one element.
	pub fn align(&self) -> u32 {
		match self {
			Self::I8 | Self::U8 => 0,
			Self::I16 | Self::U16 => 1,
			Self::I32 | Self::U32 | Self::F32 | Self::Managed => 2,
			Self::I64 | Self::U64 | Self::F64 => 3,
		}
	}

	pub fn size(&self) -> u32 {
		1 << self.align()
	}

	fn decode(&self, bytes: &[u8]) -> Result<Element> {
		let element = match self {
			Self::I8 => Element::Value(RawValue::I32(i8::from_le_bytes(bytes.try_into()?) as i32)),
			Self::U8 => Element::Value(RawValue::I32(u8::from_le_bytes(bytes.try_into()?) as i32)),
			Self::I16 => Element::Value(RawValue::I32(i16::from_le_bytes(bytes.try_into()?) as i32)),
			Self::U16 => Element::Value(RawValue::I32(u16::from_le_bytes(bytes.try_into()?) as i32)),
			Self::I32 => Element::Value(RawValue::I32(i32::from_le_bytes(bytes.try_into()?))),
			// Widened so that values above i32::MAX keep their sign
			Self::U32 => Element::Value(RawValue::I64(u32::from_le_bytes(bytes.try_into()?) as i64)),
			Self::I64 => Element::Value(RawValue::I64(i64::from_le_bytes(bytes.try_into()?))),
			Self::U64 => Element::Value(RawValue::I64(u64::from_le_bytes(bytes.try_into()?) as i64)),
			Self::F32 => Element::Value(RawValue::F32(f32::from_le_bytes(bytes.try_into()?))),
			Self::F64 => Element::Value(RawValue::F64(f64::from_le_bytes(bytes.try_into()?))),
			Self::Managed => Element::Ref(Ptr::from(u32::from_le_bytes(bytes.try_into()?))),
		};
		Ok(element)
	}
}

impl fmt::Display for ElementKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let name = match self {
			Self::I8 => "i8",
			Self::U8 => "u8",
			Self::I16 => "i16",
			Self::U16 => "u16",
			Self::I32 => "i32",
			Self::U32 => "u32",
			Self::I64 => "i64",
			Self::U64 => "u64",
			Self::F32 => "f32",
			Self::F64 => "f64",
			Self::Managed => "ref",
		};
		f.write_str(name)
	}
}

/// Whether the element count is stored explicitly or derived from the byte length.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Shape {
	/// `Array<T>`
	Array,
	/// A typed array such as `Int32Array`
	View,
}

/// A single decoded element.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Element {
	Value(RawValue),
	/// The address of a managed element, `Ptr::NULL` for a null entry
	Ref(Ptr),
}

/// Everything needed to walk the elements of a sequence.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct SequenceLayout {
	pub shape: Shape,
	pub kind: ElementKind,
}

impl SequenceLayout {
	pub fn new(shape: Shape, kind: ElementKind) -> Self {
		Self {
			shape,
			kind,
		}
	}

	/// The layout of the sequence type described by an RTTI entry.
	pub fn from_rtti(ty: &RttiType, address: Ptr) -> Result<Self, Error> {
		let shape = if ty.flags.is_array() {
			Shape::Array
		} else if ty.flags.is_view() {
			Shape::View
		} else {
			return Err(Error::TypeMismatch {
				address,
				expected: "Array".to_string(),
				found: ty.id,
			});
		};
		let kind = ElementKind::from_rtti(ty).ok_or(Error::UnresolvedType {
			address,
			id: ty.id,
		})?;
		Ok(Self::new(shape, kind))
	}

	/// Read the elements of the sequence at `address`, in source order.
	pub fn read(&self, controller: &dyn MemoryController, address: Ptr) -> Result<Vec<Element>> {
		let data = Ptr::from(controller.read_u32(address.checked_add(ARRAYBUFFERVIEW_DATASTART_OFFSET)?)?);
		let length = match self.shape {
			Shape::Array => controller.read_u32(address.checked_add(ARRAY_LENGTH_OFFSET)?)?,
			Shape::View => {
				controller.read_u32(address.checked_add(ARRAYBUFFERVIEW_DATALENGTH_OFFSET)?)?
					>> self.kind.align()
			}
		};
		let stride = self.kind.size();
		let total = length as u64 * stride as u64;
		if total > *MAX_DECODE_LENGTH as u64 {
			return Err(Error::MemoryFault {
				address: *data as u64,
				length: total,
				memory_size: controller.memory_size(),
			}
			.into());
		}
		let bytes = controller.read(data, total as u32)?;
		trace!(%address, %data, length, kind = %self.kind, "reading sequence");
		bytes.chunks_exact(stride as usize).map(|c| self.kind.decode(c)).collect()
	}

	/// Sequences are decode only.
	pub fn write(&self, _: &mut dyn MemoryController, _: &[Element]) -> Result<Ptr> {
		Err(Error::UnsupportedEncoding("sequence").into())
	}
}
