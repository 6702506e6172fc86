//! Turning raw export results into host values, and host values into raw
//! export arguments.
//!
//! Resolution is total over `(RawValue, Option<TypeHint>)`:
//!
//! - Without a hint, or with a numeric hint, the raw value is a number.
//! - With a reference hint, the raw value is an address. `0` is the null
//!   reference; any other address is decoded by the codec the hint names.
//! - [`TypeHint::Auto`] reads the allocation header and dispatches on the
//!   runtime id: strings, buffers, arrays from the RTTI flags, and finally the
//!   nearest known class in the inheritance chain.

use anyhow::Result;
use asbind_types::controller::MemoryController;
use asbind_types::err::Error;
use asbind_types::header::Header;
use asbind_types::layout::{ARRAYBUFFER_ID, STRING_ID, is_builtin};
use asbind_types::opaque::OpaqueRegistry;
use asbind_types::raw::{Ptr, RawValue, Signature, ValType};
use asbind_types::rtti::RttiRegistry;
use asbind_types::sequence::{Element, ElementKind, SequenceLayout, Shape};
use asbind_types::transfer::Transfer;
use tracing::trace;

use crate::class::ClassRegistry;
use crate::hint::TypeHint;
use crate::proxy::ClassProxy;
use crate::value::Value;

/// Borrowed binding state needed to move values across the boundary.
pub struct Resolver<'a> {
	controller: &'a mut dyn MemoryController,
	rtti: &'a RttiRegistry,
	classes: &'a mut ClassRegistry,
	opaque: &'a OpaqueRegistry,
}

impl<'a> Resolver<'a> {
	pub fn new(
		controller: &'a mut dyn MemoryController,
		rtti: &'a RttiRegistry,
		classes: &'a mut ClassRegistry,
		opaque: &'a OpaqueRegistry,
	) -> Self {
		Self {
			controller,
			rtti,
			classes,
			opaque,
		}
	}

	/// Resolve the result of an export.
	pub fn resolve(&mut self, raw: Option<RawValue>, hint: Option<&TypeHint>) -> Result<Value> {
		let Some(raw) = raw else {
			return Ok(Value::None);
		};
		let hint = match hint {
			None | Some(TypeHint::Primitive) => return Ok(raw.into()),
			Some(TypeHint::Number(kind)) => return Ok(number(raw, *kind)),
			Some(TypeHint::Bool) => return Ok(Value::Bool(raw.as_i64().is_some_and(|v| v != 0))),
			Some(TypeHint::Opaque) => return Ok(Value::Opaque(self.opaque.decode(raw)?)),
			Some(hint) => hint,
		};
		let Some(ptr) = raw.as_ptr() else {
			return Err(Error::NotAReference {
				hint: hint.to_string(),
				found: raw.ty(),
			}
			.into());
		};
		if ptr.is_null() {
			return Ok(Value::Null);
		}
		self.resolve_pointer(ptr, hint)
	}

	/// Resolve a non-null address under a reference hint.
	pub fn resolve_pointer(&mut self, ptr: Ptr, hint: &TypeHint) -> Result<Value> {
		trace!(%ptr, %hint, "resolving pointer");
		match hint {
			TypeHint::Auto => self.detect(ptr),
			TypeHint::Text => Ok(Value::String(String::receive(ptr, &*self.controller)?)),
			TypeHint::Bytes => Ok(Value::Bytes(Vec::<u8>::receive(ptr, &*self.controller)?)),
			TypeHint::Sequence(element) => self.resolve_sequence(ptr, element),
			TypeHint::Class(name) => Ok(Value::Object(self.resolve_class(ptr, name)?)),
			// Numeric hints never reach here through `resolve`
			other => self.resolve(Some(ptr.into()), Some(other)),
		}
	}

	/// Determine the type of the object at `ptr` from its header.
	pub fn detect(&mut self, ptr: Ptr) -> Result<Value> {
		let id = Header::id_of(&*self.controller, ptr)?;
		match id {
			STRING_ID => return self.resolve_pointer(ptr, &TypeHint::Text),
			ARRAYBUFFER_ID => return self.resolve_pointer(ptr, &TypeHint::Bytes),
			_ => (),
		}
		if self.rtti.get(id).is_some_and(|ty| ty.flags.is_sequence()) {
			return self.resolve_sequence(ptr, &TypeHint::Auto);
		}
		if let Some(class) = self.classes.nearest(id, self.rtti) {
			return Ok(Value::Object(ClassProxy::new(ptr, id, class.clone())));
		}
		Err(Error::UnresolvedType {
			address: ptr,
			id,
		}
		.into())
	}

	/// Wrap the object at `ptr` as an instance of `name`.
	///
	/// The object's concrete class must be `name` or one of its subclasses.
	/// If the runtime id of `name` is not fixed yet, it is inferred from the
	/// object, see [`ClassRegistry::infer`].
	pub fn resolve_class(&mut self, ptr: Ptr, name: &str) -> Result<ClassProxy> {
		let class = self.classes.descriptor(name)?.clone();
		let id = Header::id_of(&*self.controller, ptr)?;
		if !self.classes.infer(name, id, self.rtti) {
			return Err(Error::TypeMismatch {
				address: ptr,
				expected: name.to_string(),
				found: id,
			}
			.into());
		}
		Ok(ClassProxy::new(ptr, id, class))
	}

	/// Decode the array at `ptr`, resolving each element with `element`.
	pub fn resolve_sequence(&mut self, ptr: Ptr, element: &TypeHint) -> Result<Value> {
		let id = Header::id_of(&*self.controller, ptr)?;
		let mismatch = || Error::TypeMismatch {
			address: ptr,
			expected: TypeHint::sequence(element.clone()).to_string(),
			found: id,
		};
		let layout = if self.rtti.is_empty() {
			// Without RTTI the element type can only come from the hint
			if is_builtin(id) {
				return Err(mismatch().into());
			}
			fallback_layout(element).ok_or(Error::UnresolvedType {
				address: ptr,
				id,
			})?
		} else {
			SequenceLayout::from_rtti(self.rtti.lookup(id)?, ptr)?
		};
		if !accepts(layout.kind, element) {
			return Err(mismatch().into());
		}
		let elements = layout.read(&*self.controller, ptr)?;
		let mut values = Vec::with_capacity(elements.len());
		for e in elements {
			let value = match (e, element) {
				(Element::Value(raw), TypeHint::Opaque) => Value::Opaque(self.opaque.decode(raw)?),
				(Element::Value(raw), TypeHint::Bool) => Value::Bool(raw.as_i64().is_some_and(|v| v != 0)),
				(Element::Value(raw), _) => raw.into(),
				(Element::Ref(item), _) if item.is_null() => Value::Null,
				(Element::Ref(item), hint) if hint.is_pointer() => self.resolve_pointer(item, hint)?,
				(Element::Ref(item), _) => self.detect(item)?,
			};
			values.push(value);
		}
		Ok(Value::Array(values))
	}

	/// Encode call arguments for an export with the given signature.
	///
	/// `leading` arguments, such as the `this` pointer of a method, are
	/// passed through unchanged. Objects allocated for the arguments are
	/// pinned as soon as they are written, so allocating the next one cannot
	/// collect them. Returns the raw arguments together with the pinned
	/// addresses, which the caller unpins once the call has returned. If
	/// encoding fails, everything pinned so far is unpinned again.
	pub fn encode_args(
		&mut self,
		export: &str,
		signature: &Signature,
		leading: &[RawValue],
		args: &[Value],
	) -> Result<(Vec<RawValue>, Vec<Ptr>)> {
		let expected = signature.params.len();
		if leading.len() + args.len() != expected {
			return Err(Error::ArgumentMismatch {
				export: export.to_string(),
				reason: format!(
					"expected {} arguments, found {}",
					expected.saturating_sub(leading.len()),
					args.len()
				),
			}
			.into());
		}
		let mut raw = leading.to_vec();
		let mut pinned = Vec::new();
		for (value, ty) in args.iter().zip(&signature.params[leading.len()..]) {
			match self.encode(export, value, *ty) {
				Ok((v, ptr)) => {
					raw.push(v);
					pinned.extend(ptr);
				}
				Err(e) => {
					// Unpin failures are logged, the encoding failure is returned
					self.controller.unpin_all(&pinned).ok();
					return Err(e);
				}
			}
		}
		Ok((raw, pinned))
	}

	/// Encode a single argument as a value of type `ty`.
	///
	/// Returns the raw value and, for values moved into module memory, the
	/// pinned address of the new object.
	pub fn encode(&mut self, export: &str, value: &Value, ty: ValType) -> Result<(RawValue, Option<Ptr>)> {
		let mismatch = |reason: String| Error::ArgumentMismatch {
			export: export.to_string(),
			reason,
		};
		let reference = |ptr: Ptr| -> Result<RawValue, Error> {
			match ty {
				ValType::I32 => Ok(ptr.into()),
				_ => Err(mismatch(format!("a {ty} parameter cannot take a reference"))),
			}
		};
		let encoded = match value {
			Value::None | Value::Null => (reference(Ptr::NULL)?, None),
			Value::Bool(v) => {
				let raw = integer(*v as i64, ty).ok_or_else(|| mismatch(format!("expected {ty}, found bool")))?;
				(raw, None)
			}
			Value::I32(v) => {
				let raw = integer(*v as i64, ty).ok_or_else(|| mismatch(format!("{v} does not fit {ty}")))?;
				(raw, None)
			}
			Value::I64(v) => {
				let raw = integer(*v, ty).ok_or_else(|| mismatch(format!("{v} does not fit {ty}")))?;
				(raw, None)
			}
			Value::F32(v) => {
				let raw = float(*v as f64, ty).ok_or_else(|| mismatch(format!("expected {ty}, found f32")))?;
				(raw, None)
			}
			Value::F64(v) => {
				let raw = float(*v, ty).ok_or_else(|| mismatch(format!("expected {ty}, found f64")))?;
				(raw, None)
			}
			Value::String(v) => {
				reference(Ptr::NULL)?;
				let ptr = self.transfer_pinned(v.clone())?;
				(ptr.into(), Some(ptr))
			}
			Value::Bytes(v) => {
				reference(Ptr::NULL)?;
				let ptr = self.transfer_pinned(v.clone())?;
				(ptr.into(), Some(ptr))
			}
			Value::Array(_) => return Err(Error::UnsupportedEncoding("sequence").into()),
			Value::Object(proxy) => {
				proxy.validate(&*self.controller)?;
				(reference(proxy.address())?, None)
			}
			Value::Handle(handle) => {
				let raw = integer(handle.id() as i64, ty)
					.ok_or_else(|| mismatch(format!("expected {ty}, found handle")))?;
				(raw, None)
			}
			Value::Opaque(_) => {
				let reason = "opaque values must be registered and passed as a handle";
				return Err(mismatch(reason.to_string()).into());
			}
		};
		Ok(encoded)
	}

	fn transfer_pinned<T: Transfer>(&mut self, value: T) -> Result<Ptr> {
		let ptr = value.transfer(self.controller)?;
		self.controller.pin(ptr)?;
		Ok(ptr)
	}
}

/// Whether elements stored as `kind` can be read under `hint`.
fn accepts(kind: ElementKind, hint: &TypeHint) -> bool {
	match hint {
		TypeHint::Auto => true,
		TypeHint::Number(expected) => kind == *expected,
		TypeHint::Primitive => kind != ElementKind::Managed,
		TypeHint::Bool => !matches!(kind, ElementKind::F32 | ElementKind::F64 | ElementKind::Managed),
		TypeHint::Opaque => matches!(kind, ElementKind::I32 | ElementKind::U32),
		TypeHint::Text | TypeHint::Bytes | TypeHint::Sequence(_) | TypeHint::Class(_) => {
			kind == ElementKind::Managed
		}
	}
}

/// Convert a raw number according to its storage type.
fn number(raw: RawValue, kind: ElementKind) -> Value {
	match (raw, kind) {
		(RawValue::I32(v), ElementKind::I8) => Value::I32(v as i8 as i32),
		(RawValue::I32(v), ElementKind::U8) => Value::I32(v as u8 as i32),
		(RawValue::I32(v), ElementKind::I16) => Value::I32(v as i16 as i32),
		(RawValue::I32(v), ElementKind::U16) => Value::I32(v as u16 as i32),
		(RawValue::I32(v), ElementKind::U32) => Value::I64(v as u32 as i64),
		(RawValue::I32(v), ElementKind::I64 | ElementKind::U64) => Value::I64(v as i64),
		(raw, _) => raw.into(),
	}
}

fn integer(v: i64, ty: ValType) -> Option<RawValue> {
	match ty {
		ValType::I32 => i32::try_from(v)
			.ok()
			// Unsigned 32-bit values are passed by their bit pattern
			.or_else(|| u32::try_from(v).ok().map(|v| v as i32))
			.map(RawValue::I32),
		ValType::I64 => Some(RawValue::I64(v)),
		ValType::F32 => Some(RawValue::F32(v as f32)),
		ValType::F64 => Some(RawValue::F64(v as f64)),
	}
}

fn float(v: f64, ty: ValType) -> Option<RawValue> {
	match ty {
		ValType::F32 => Some(RawValue::F32(v as f32)),
		ValType::F64 => Some(RawValue::F64(v)),
		_ => None,
	}
}

/// The layout of an `Array<T>` whose element type is implied by `element`.
fn fallback_layout(element: &TypeHint) -> Option<SequenceLayout> {
	let kind = match element {
		TypeHint::Number(kind) => *kind,
		TypeHint::Bool => ElementKind::U8,
		TypeHint::Opaque => ElementKind::I32,
		TypeHint::Text | TypeHint::Bytes | TypeHint::Sequence(_) | TypeHint::Class(_) => ElementKind::Managed,
		TypeHint::Primitive | TypeHint::Auto => return None,
	};
	Some(SequenceLayout::new(Shape::Array, kind))
}
