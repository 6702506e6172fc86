use std::sync::Arc;

use asbind_types::opaque::{Handle, OpaqueValue};
use asbind_types::raw::RawValue;

use crate::proxy::ClassProxy;

/// A host-side value passed to or returned from a module export.
#[derive(Clone, Debug, Default)]
pub enum Value {
	/// The export returned nothing
	#[default]
	None,
	/// The module's null reference
	Null,
	Bool(bool),
	I32(i32),
	I64(i64),
	F32(f32),
	F64(f64),
	String(String),
	Bytes(Vec<u8>),
	/// A decoded array, copied out of module memory
	Array(Vec<Value>),
	/// An instance of an exported class, still living in module memory
	Object(ClassProxy),
	/// A host value that went through the module as a handle
	Opaque(OpaqueValue),
	/// A registered host value being passed to the module
	Handle(Handle),
}

impl Value {
	pub fn is_none(&self) -> bool {
		matches!(self, Value::None)
	}

	pub fn is_null(&self) -> bool {
		matches!(self, Value::Null)
	}

	pub fn as_bool(&self) -> Option<bool> {
		match self {
			Value::Bool(v) => Some(*v),
			Value::I32(v) => Some(*v != 0),
			_ => None,
		}
	}

	pub fn as_i32(&self) -> Option<i32> {
		match self {
			Value::I32(v) => Some(*v),
			Value::I64(v) => i32::try_from(*v).ok(),
			_ => None,
		}
	}

	pub fn as_i64(&self) -> Option<i64> {
		match self {
			Value::I32(v) => Some(*v as i64),
			Value::I64(v) => Some(*v),
			_ => None,
		}
	}

	pub fn as_f64(&self) -> Option<f64> {
		match self {
			Value::I32(v) => Some(*v as f64),
			Value::F32(v) => Some(*v as f64),
			Value::F64(v) => Some(*v),
			_ => None,
		}
	}

	pub fn as_str(&self) -> Option<&str> {
		match self {
			Value::String(v) => Some(v),
			_ => None,
		}
	}

	pub fn as_bytes(&self) -> Option<&[u8]> {
		match self {
			Value::Bytes(v) => Some(v),
			_ => None,
		}
	}

	pub fn as_array(&self) -> Option<&[Value]> {
		match self {
			Value::Array(v) => Some(v),
			_ => None,
		}
	}

	pub fn as_object(&self) -> Option<&ClassProxy> {
		match self {
			Value::Object(v) => Some(v),
			_ => None,
		}
	}

	pub fn into_object(self) -> Option<ClassProxy> {
		match self {
			Value::Object(v) => Some(v),
			_ => None,
		}
	}

	pub fn as_opaque(&self) -> Option<&OpaqueValue> {
		match self {
			Value::Opaque(v) => Some(v),
			_ => None,
		}
	}

	/// Downcast an opaque value to its concrete host type.
	pub fn downcast<T: Send + Sync + 'static>(&self) -> Option<&T> {
		self.as_opaque().and_then(|v| v.downcast_ref::<T>())
	}

	/// A short name for the kind of value, used in error messages.
	pub fn kind(&self) -> &'static str {
		match self {
			Value::None => "none",
			Value::Null => "null",
			Value::Bool(_) => "bool",
			Value::I32(_) => "i32",
			Value::I64(_) => "i64",
			Value::F32(_) => "f32",
			Value::F64(_) => "f64",
			Value::String(_) => "string",
			Value::Bytes(_) => "bytes",
			Value::Array(_) => "array",
			Value::Object(_) => "object",
			Value::Opaque(_) => "opaque",
			Value::Handle(_) => "handle",
		}
	}
}

impl PartialEq for Value {
	fn eq(&self, other: &Self) -> bool {
		match (self, other) {
			(Value::None, Value::None) => true,
			(Value::Null, Value::Null) => true,
			(Value::Bool(a), Value::Bool(b)) => a == b,
			(Value::I32(a), Value::I32(b)) => a == b,
			(Value::I64(a), Value::I64(b)) => a == b,
			(Value::F32(a), Value::F32(b)) => a == b,
			(Value::F64(a), Value::F64(b)) => a == b,
			(Value::String(a), Value::String(b)) => a == b,
			(Value::Bytes(a), Value::Bytes(b)) => a == b,
			(Value::Array(a), Value::Array(b)) => a == b,
			(Value::Object(a), Value::Object(b)) => a == b,
			// Opaque values are equal only if they are the same allocation
			(Value::Opaque(a), Value::Opaque(b)) => Arc::ptr_eq(a, b),
			(Value::Handle(a), Value::Handle(b)) => a == b,
			_ => false,
		}
	}
}

impl From<RawValue> for Value {
	fn from(v: RawValue) -> Self {
		match v {
			RawValue::I32(v) => Value::I32(v),
			RawValue::I64(v) => Value::I64(v),
			RawValue::F32(v) => Value::F32(v),
			RawValue::F64(v) => Value::F64(v),
		}
	}
}

impl From<bool> for Value {
	fn from(v: bool) -> Self {
		Value::Bool(v)
	}
}

impl From<i32> for Value {
	fn from(v: i32) -> Self {
		Value::I32(v)
	}
}

impl From<u32> for Value {
	fn from(v: u32) -> Self {
		Value::I64(v as i64)
	}
}

impl From<i64> for Value {
	fn from(v: i64) -> Self {
		Value::I64(v)
	}
}

impl From<f32> for Value {
	fn from(v: f32) -> Self {
		Value::F32(v)
	}
}

impl From<f64> for Value {
	fn from(v: f64) -> Self {
		Value::F64(v)
	}
}

impl From<&str> for Value {
	fn from(v: &str) -> Self {
		Value::String(v.to_string())
	}
}

impl From<String> for Value {
	fn from(v: String) -> Self {
		Value::String(v)
	}
}

impl From<Vec<u8>> for Value {
	fn from(v: Vec<u8>) -> Self {
		Value::Bytes(v)
	}
}

impl From<Vec<Value>> for Value {
	fn from(v: Vec<Value>) -> Self {
		Value::Array(v)
	}
}

impl From<ClassProxy> for Value {
	fn from(v: ClassProxy) -> Self {
		Value::Object(v)
	}
}

impl From<Handle> for Value {
	fn from(v: Handle) -> Self {
		Value::Handle(v)
	}
}

impl<T: Into<Value>> From<Option<T>> for Value {
	fn from(v: Option<T>) -> Self {
		v.map(Into::into).unwrap_or(Value::Null)
	}
}
