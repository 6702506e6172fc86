use std::collections::BTreeMap;

use anyhow::Result;
use asbind_types::err::PrefixError;
use serde::{Deserialize, Serialize};

use crate::hint::TypeHint;

/// Type knowledge about a module that its exports cannot express.
///
/// Export signatures only carry numeric types, so a function returning a
/// string looks exactly like one returning an `i32`. The configuration
/// declares which exports and class members return references, and what they
/// reference.
///
/// ```toml
/// [exports]
/// helloworld = "text"
/// getFoo = "class:Foo"
///
/// [classes.File]
/// id = 4
///
/// [classes.File.properties]
/// name = "text"
///
/// [classes.File.methods]
/// lines = "array:text"
/// ```
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BindConfig {
	/// Result hints of top level function exports
	pub exports: BTreeMap<String, TypeHint>,
	/// Per class runtime ids and member hints
	pub classes: BTreeMap<String, ClassConfig>,
}

#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ClassConfig {
	/// The runtime id of the class, if known ahead of time
	pub id: Option<u32>,
	pub properties: BTreeMap<String, TypeHint>,
	pub methods: BTreeMap<String, TypeHint>,
}

impl BindConfig {
	pub fn parse(s: &str) -> Result<Self> {
		toml::from_str(s).prefix_err(|| "Failed to parse binding configuration")
	}

	pub fn to_toml(&self) -> Result<String> {
		toml::to_string(self).prefix_err(|| "Failed to serialize binding configuration")
	}

	/// Declare the result hint of a function export.
	pub fn export(mut self, name: &str, hint: TypeHint) -> Self {
		self.exports.insert(name.to_string(), hint);
		self
	}

	/// Declare the runtime id of a class.
	pub fn class_id(mut self, class: &str, id: u32) -> Self {
		self.classes.entry(class.to_string()).or_default().id = Some(id);
		self
	}

	/// Declare the hint of a property getter.
	pub fn property(mut self, class: &str, property: &str, hint: TypeHint) -> Self {
		self.classes.entry(class.to_string()).or_default().properties.insert(property.to_string(), hint);
		self
	}

	/// Declare the result hint of a method.
	pub fn method(mut self, class: &str, method: &str, hint: TypeHint) -> Self {
		self.classes.entry(class.to_string()).or_default().methods.insert(method.to_string(), hint);
		self
	}
}
