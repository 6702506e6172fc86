//! Engine-level values crossing the module boundary.
//!
//! WebAssembly exports only ever exchange the four numeric value types. A
//! managed object is passed as an `i32` holding its address, which is why the
//! same raw value may be either a number or a pointer depending on context.

use std::fmt;
use std::ops::Deref;

use crate::err::Error;

/// An address in the module's linear memory, pointing at the payload of an object.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Ptr(u32);

impl Ptr {
	/// The module's null reference
	pub const NULL: Ptr = Ptr(0);

	pub fn is_null(&self) -> bool {
		self.0 == 0
	}

	/// Offset this address forwards, failing instead of wrapping around.
	pub fn checked_add(self, offset: u32) -> Result<Ptr, Error> {
		self.0.checked_add(offset).map(Ptr).ok_or(Error::MemoryFault {
			address: self.0 as u64,
			length: offset as u64,
			memory_size: u32::MAX as u64,
		})
	}

	/// Offset this address backwards, failing instead of wrapping around.
	pub fn checked_sub(self, offset: u32) -> Result<Ptr, Error> {
		self.0.checked_sub(offset).map(Ptr).ok_or(Error::MemoryFault {
			address: self.0 as u64,
			length: offset as u64,
			memory_size: u32::MAX as u64,
		})
	}
}

impl Deref for Ptr {
	type Target = u32;

	fn deref(&self) -> &Self::Target {
		&self.0
	}
}

impl From<u32> for Ptr {
	fn from(ptr: u32) -> Self {
		Ptr(ptr)
	}
}

impl From<Ptr> for RawValue {
	fn from(ptr: Ptr) -> Self {
		RawValue::I32(ptr.0 as i32)
	}
}

impl fmt::Display for Ptr {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "0x{:08x}", self.0)
	}
}

/// The numeric value types an export can take or return.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum ValType {
	I32,
	I64,
	F32,
	F64,
}

impl fmt::Display for ValType {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			ValType::I32 => f.write_str("i32"),
			ValType::I64 => f.write_str("i64"),
			ValType::F32 => f.write_str("f32"),
			ValType::F64 => f.write_str("f64"),
		}
	}
}

/// A single engine-level value.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum RawValue {
	I32(i32),
	I64(i64),
	F32(f32),
	F64(f64),
}

impl RawValue {
	pub fn ty(&self) -> ValType {
		match self {
			RawValue::I32(_) => ValType::I32,
			RawValue::I64(_) => ValType::I64,
			RawValue::F32(_) => ValType::F32,
			RawValue::F64(_) => ValType::F64,
		}
	}

	/// Interpret this value as an address. Only `i32` values can be addresses.
	pub fn as_ptr(&self) -> Option<Ptr> {
		match self {
			RawValue::I32(v) => Some(Ptr(*v as u32)),
			_ => None,
		}
	}

	/// Interpret this value as an integer, if it is one.
	pub fn as_i64(&self) -> Option<i64> {
		match self {
			RawValue::I32(v) => Some(*v as i64),
			RawValue::I64(v) => Some(*v),
			_ => None,
		}
	}
}

/// The parameter and result types of a function export.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Signature {
	pub params: Vec<ValType>,
	pub results: Vec<ValType>,
}

impl Signature {
	pub fn new(params: &[ValType], results: &[ValType]) -> Self {
		Self {
			params: params.to_vec(),
			results: results.to_vec(),
		}
	}

	/// The single result type, if the function returns anything.
	pub fn result(&self) -> Option<ValType> {
		self.results.first().copied()
	}
}

impl fmt::Display for Signature {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let params = self.params.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ");
		match self.result() {
			Some(result) => write!(f, "({params}) -> {result}"),
			None => write!(f, "({params})"),
		}
	}
}

/// A function exported by the module.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Export {
	pub name: String,
	pub signature: Signature,
}
