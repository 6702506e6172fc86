use std::fmt;
use std::str::FromStr;

use asbind_types::err::Error;
use asbind_types::sequence::ElementKind;
use serde::{Deserialize, Serialize};

/// How a raw value returned by the module should be interpreted.
///
/// Hints can be written as strings, which is how they appear in a
/// [`BindConfig`](crate::config::BindConfig):
///
/// | String                          | Hint                      |
/// |---------------------------------|---------------------------|
/// | `primitive`, `number`           | [`TypeHint::Primitive`]   |
/// | `i8`, `u32`, `f64`, ...         | [`TypeHint::Number`]      |
/// | `bool`                          | [`TypeHint::Bool`]        |
/// | `auto`, `any`                   | [`TypeHint::Auto`]        |
/// | `text`, `string`                | [`TypeHint::Text`]        |
/// | `bytes`, `buffer`, `arraybuffer`| [`TypeHint::Bytes`]       |
/// | `opaque`                        | [`TypeHint::Opaque`]      |
/// | `class:Name`                    | [`TypeHint::Class`]       |
/// | `array`, `array:<hint>`         | [`TypeHint::Sequence`]    |
#[derive(Clone, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum TypeHint {
	/// The raw value is returned as a number
	Primitive,
	/// The raw value is a number stored with a specific width and signedness
	Number(ElementKind),
	/// The raw value is a boolean stored as an `i32`
	Bool,
	/// The raw value is a heap reference whose type is read from its header
	Auto,
	Text,
	Bytes,
	/// An array whose elements are resolved with the inner hint
	Sequence(Box<TypeHint>),
	/// An instance of the named class or one of its subclasses
	Class(String),
	/// A handle previously issued by the opaque value registry
	Opaque,
}

impl TypeHint {
	pub fn class(name: impl Into<String>) -> Self {
		Self::Class(name.into())
	}

	pub fn sequence(element: TypeHint) -> Self {
		Self::Sequence(Box::new(element))
	}

	/// Whether the raw value is a heap reference under this hint.
	pub fn is_pointer(&self) -> bool {
		matches!(self, Self::Auto | Self::Text | Self::Bytes | Self::Sequence(_) | Self::Class(_))
	}
}

impl FromStr for TypeHint {
	type Err = Error;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let hint = match s.trim() {
			"primitive" | "number" => Self::Primitive,
			"bool" => Self::Bool,
			"auto" | "any" => Self::Auto,
			"text" | "string" => Self::Text,
			"bytes" | "buffer" | "arraybuffer" => Self::Bytes,
			"opaque" => Self::Opaque,
			"array" => Self::sequence(Self::Auto),
			"i8" => Self::Number(ElementKind::I8),
			"u8" => Self::Number(ElementKind::U8),
			"i16" => Self::Number(ElementKind::I16),
			"u16" => Self::Number(ElementKind::U16),
			"i32" => Self::Number(ElementKind::I32),
			"u32" => Self::Number(ElementKind::U32),
			"i64" => Self::Number(ElementKind::I64),
			"u64" => Self::Number(ElementKind::U64),
			"f32" => Self::Number(ElementKind::F32),
			"f64" => Self::Number(ElementKind::F64),
			v => {
				if let Some(element) = v.strip_prefix("array:") {
					Self::sequence(element.parse().map_err(|_| Error::InvalidHint(s.to_string()))?)
				} else if let Some(name) = v.strip_prefix("class:").filter(|n| !n.is_empty()) {
					Self::class(name)
				} else {
					return Err(Error::InvalidHint(s.to_string()));
				}
			}
		};
		Ok(hint)
	}
}

impl TryFrom<String> for TypeHint {
	type Error = Error;

	fn try_from(value: String) -> Result<Self, Self::Error> {
		value.parse()
	}
}

impl From<TypeHint> for String {
	fn from(value: TypeHint) -> Self {
		value.to_string()
	}
}

impl fmt::Display for TypeHint {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Primitive => f.write_str("primitive"),
			Self::Number(kind) => write!(f, "{kind}"),
			Self::Bool => f.write_str("bool"),
			Self::Auto => f.write_str("auto"),
			Self::Text => f.write_str("text"),
			Self::Bytes => f.write_str("bytes"),
			Self::Sequence(element) => write!(f, "array:{element}"),
			Self::Class(name) => write!(f, "class:{name}"),
			Self::Opaque => f.write_str("opaque"),
		}
	}
}
