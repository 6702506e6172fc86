//! Classes reconstructed from export names.
//!
//! The compiler exports every public class member as a flat function named
//! `Class#member`:
//!
//! ```text
//! File#constructor   constructor, called with a null `this`
//! File#get:size      property getter
//! File#set:size      property setter
//! File#addLine       method
//! ```
//!
//! Grouping these yields one [`ClassDescriptor`] per class. Descriptors are
//! built once when a module is bound and never change afterwards. The runtime
//! id of each class is not part of any export name, so the registry learns it:
//!
//! - from configuration or construction, which fix the id for good;
//! - from objects returned under an explicit class hint. Such an object may
//!   be an instance of a subclass, so the inferred id stays provisional and
//!   moves up to the closest shared base when a later object disagrees.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use asbind_types::err::Error;
use asbind_types::layout::is_builtin;
use asbind_types::raw::Export;
use asbind_types::rtti::RttiRegistry;
use tracing::{debug, trace, warn};

use crate::config::BindConfig;
use crate::hint::TypeHint;

/// What a single class export does, parsed from its name.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Member {
	Constructor,
	Getter(String),
	Setter(String),
	Method(String),
}

impl Member {
	/// Split an export name into its class name and member.
	pub fn parse(export: &str) -> Option<(&str, Member)> {
		let (class, member) = export.split_once('#')?;
		if class.is_empty() || member.is_empty() {
			return None;
		}
		let member = match member.split_once(':') {
			_ if member == "constructor" => Member::Constructor,
			Some(("get", property)) => Member::Getter(property.to_string()),
			Some(("set", property)) => Member::Setter(property.to_string()),
			_ => Member::Method(member.to_string()),
		};
		Some((class, member))
	}
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Property {
	pub name: String,
	pub getter: String,
	pub setter: Option<String>,
	/// How to interpret the getter result when the caller gives no hint
	pub hint: Option<TypeHint>,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Method {
	pub name: String,
	pub export: String,
	/// How to interpret the result when the caller gives no hint
	pub hint: Option<TypeHint>,
}

/// The exported surface of one class.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ClassDescriptor {
	pub name: String,
	pub constructor: Option<String>,
	/// Properties in export order
	pub properties: Vec<Property>,
	pub methods: Vec<Method>,
}

impl ClassDescriptor {
	fn new(name: &str) -> Self {
		Self {
			name: name.to_string(),
			constructor: None,
			properties: Vec::new(),
			methods: Vec::new(),
		}
	}

	pub fn is_constructible(&self) -> bool {
		self.constructor.is_some()
	}

	pub fn property(&self, name: &str) -> Option<&Property> {
		self.properties.iter().find(|p| p.name == name)
	}

	pub fn method(&self, name: &str) -> Option<&Method> {
		self.methods.iter().find(|m| m.name == name)
	}
}

/// All classes of a bound module, with the runtime ids learned so far.
#[derive(Clone, Debug, Default)]
pub struct ClassRegistry {
	classes: BTreeMap<String, Arc<ClassDescriptor>>,
	ids: HashMap<u32, String>,
	names: HashMap<String, u32>,
	/// Classes whose id was inferred from a hint
	provisional: HashSet<String>,
}

impl ClassRegistry {
	/// Group class exports into descriptors and apply configured hints and ids.
	pub fn discover(exports: &[Export], config: &BindConfig) -> Self {
		let mut building: BTreeMap<String, ClassDescriptor> = BTreeMap::new();
		let mut setters: Vec<(String, String, String)> = Vec::new();
		for export in exports {
			let Some((class, member)) = Member::parse(&export.name) else {
				continue;
			};
			trace!(class, ?member, "discovered class member");
			let descriptor =
				building.entry(class.to_string()).or_insert_with(|| ClassDescriptor::new(class));
			match member {
				Member::Constructor => descriptor.constructor = Some(export.name.clone()),
				Member::Getter(name) => descriptor.properties.push(Property {
					name,
					getter: export.name.clone(),
					setter: None,
					hint: None,
				}),
				// Setters are attached once every getter is known
				Member::Setter(name) => setters.push((class.to_string(), name, export.name.clone())),
				Member::Method(name) => descriptor.methods.push(Method {
					name,
					export: export.name.clone(),
					hint: None,
				}),
			}
		}
		for (class, name, export) in setters {
			let Some(descriptor) = building.get_mut(&class) else {
				continue;
			};
			match descriptor.properties.iter_mut().find(|p| p.name == name) {
				Some(property) => property.setter = Some(export),
				// A setter without a getter is only reachable as a method
				None => descriptor.methods.push(Method {
					name: format!("set:{name}"),
					export,
					hint: None,
				}),
			}
		}
		let mut registry = Self::default();
		for (class, cnf) in &config.classes {
			let descriptor =
				building.entry(class.clone()).or_insert_with(|| ClassDescriptor::new(class));
			for (name, hint) in &cnf.properties {
				match descriptor.properties.iter_mut().find(|p| &p.name == name) {
					Some(property) => property.hint = Some(hint.clone()),
					None => warn!(class, property = name, "configured property is not exported"),
				}
			}
			for (name, hint) in &cnf.methods {
				match descriptor.methods.iter_mut().find(|m| &m.name == name) {
					Some(method) => method.hint = Some(hint.clone()),
					None => warn!(class, method = name, "configured method is not exported"),
				}
			}
			if let Some(id) = cnf.id {
				if !registry.adopt(class, id) {
					warn!(class, id, "configured runtime id cannot be assigned");
				}
			}
		}
		registry.classes = building.into_iter().map(|(name, d)| (name, Arc::new(d))).collect();
		debug!(classes = registry.classes.len(), "discovered classes");
		registry
	}

	pub fn len(&self) -> usize {
		self.classes.len()
	}

	pub fn is_empty(&self) -> bool {
		self.classes.is_empty()
	}

	/// Class names in alphabetical order.
	pub fn names(&self) -> impl Iterator<Item = &str> {
		self.classes.keys().map(String::as_str)
	}

	pub fn get(&self, name: &str) -> Option<&Arc<ClassDescriptor>> {
		self.classes.get(name)
	}

	pub fn descriptor(&self, name: &str) -> Result<&Arc<ClassDescriptor>, Error> {
		self.get(name).ok_or_else(|| Error::UnknownClass(name.to_string()))
	}

	/// The runtime id of a class, if it has been learned.
	pub fn id_of(&self, name: &str) -> Option<u32> {
		self.names.get(name).copied()
	}

	/// The class registered under exactly this runtime id.
	pub fn class_of(&self, id: u32) -> Option<&Arc<ClassDescriptor>> {
		self.ids.get(&id).and_then(|name| self.classes.get(name))
	}

	/// The known class nearest to `id` in its inheritance chain.
	pub fn nearest(&self, id: u32, rtti: &RttiRegistry) -> Option<&Arc<ClassDescriptor>> {
		rtti.ancestors(id).find_map(|id| self.class_of(id))
	}

	/// Whether the runtime id of `name` was inferred from a hint and may still change.
	pub fn is_provisional(&self, name: &str) -> bool {
		self.provisional.contains(name)
	}

	/// Fix `id` as the runtime id of `name`.
	///
	/// An id inferred earlier, for this class or for the class that held
	/// `id`, is replaced. Fails if the id belongs to a runtime type, is fixed
	/// for another class, or if the class already has a different fixed id.
	pub fn adopt(&mut self, name: &str, id: u32) -> bool {
		if is_builtin(id) {
			return false;
		}
		if self.names.get(name).is_some_and(|known| *known != id) && !self.is_provisional(name) {
			return false;
		}
		let owner = self.ids.get(&id).filter(|owner| *owner != name).cloned();
		if let Some(owner) = owner {
			if !self.is_provisional(&owner) {
				return false;
			}
			self.release(&owner);
		}
		if self.names.get(name) != Some(&id) {
			debug!(class = name, id, "learned class runtime id");
			self.release(name);
			self.assign(name, id);
		}
		self.provisional.remove(name);
		true
	}

	/// Check that an object with runtime id `id` can be viewed as `name`,
	/// inferring the id of the class if it is not fixed yet.
	pub fn infer(&mut self, name: &str, id: u32, rtti: &RttiRegistry) -> bool {
		match self.names.get(name).copied() {
			Some(known) if rtti.is_ancestor(id, known) => true,
			Some(known) if self.is_provisional(name) => {
				// Both objects are instances of the class, so it is a base of both
				let Some(common) = rtti.ancestors(id).find(|base| rtti.is_ancestor(known, *base)) else {
					return false;
				};
				if !self.is_free(common, name) {
					return false;
				}
				debug!(class = name, from = known, to = common, "widened inferred class runtime id");
				self.release(name);
				self.assign(name, common);
				self.provisional.insert(name.to_string());
				true
			}
			Some(_) => false,
			None => {
				let Some(candidate) = rtti.ancestors(id).find(|base| self.is_free(*base, name)) else {
					return false;
				};
				debug!(class = name, id = candidate, "inferred class runtime id");
				self.assign(name, candidate);
				self.provisional.insert(name.to_string());
				true
			}
		}
	}

	fn is_free(&self, id: u32, name: &str) -> bool {
		!is_builtin(id) && self.ids.get(&id).is_none_or(|owner| owner == name)
	}

	fn assign(&mut self, name: &str, id: u32) {
		self.names.insert(name.to_string(), id);
		self.ids.insert(id, name.to_string());
	}

	fn release(&mut self, name: &str) {
		if let Some(id) = self.names.remove(name) {
			self.ids.remove(&id);
		}
		self.provisional.remove(name);
	}
}

#[cfg(test)]
mod tests {
	use asbind_types::raw::{Signature, ValType};
	use rstest::rstest;

	use super::*;

	fn export(name: &str) -> Export {
		Export {
			name: name.to_string(),
			signature: Signature::new(&[ValType::I32], &[ValType::I32]),
		}
	}

	fn exports() -> Vec<Export> {
		[
			"helloworld",
			"File#constructor",
			"File#get:size",
			"File#set:size",
			"File#get:name",
			"File#addLine",
			"File#set:secret",
			"Line#get:text",
			"__new",
		]
		.into_iter()
		.map(export)
		.collect()
	}

	#[rstest]
	#[case::constructor("File#constructor", Some(("File", Member::Constructor)))]
	#[case::getter("File#get:size", Some(("File", Member::Getter("size".into()))))]
	#[case::setter("File#set:size", Some(("File", Member::Setter("size".into()))))]
	#[case::method("File#addLine", Some(("File", Member::Method("addLine".into()))))]
	#[case::plain_function("helloworld", None)]
	#[case::no_class("#addLine", None)]
	fn test_parse_member(#[case] export: &str, #[case] expected: Option<(&str, Member)>) {
		assert_eq!(Member::parse(export), expected);
	}

	#[test]
	fn test_discover() {
		let registry = ClassRegistry::discover(&exports(), &BindConfig::default());
		assert_eq!(registry.names().collect::<Vec<_>>(), vec!["File", "Line"]);

		let file = registry.descriptor("File").unwrap();
		assert_eq!(file.constructor.as_deref(), Some("File#constructor"));
		assert_eq!(file.properties.len(), 2);
		let size = file.property("size").unwrap();
		assert_eq!(size.getter, "File#get:size");
		assert_eq!(size.setter.as_deref(), Some("File#set:size"));
		assert_eq!(file.property("name").unwrap().setter, None);
		assert_eq!(file.method("addLine").unwrap().export, "File#addLine");
		assert_eq!(file.method("set:secret").unwrap().export, "File#set:secret");

		let line = registry.descriptor("Line").unwrap();
		assert!(!line.is_constructible());
		assert_eq!(registry.descriptor("Nope").unwrap_err(), Error::UnknownClass("Nope".to_string()));
	}

	#[test]
	fn test_discover_applies_config() {
		let config = BindConfig::default()
			.class_id("File", 4)
			.property("File", "name", TypeHint::Text)
			.method("File", "addLine", TypeHint::Primitive)
			.class_id("Plain", 9);
		let registry = ClassRegistry::discover(&exports(), &config);
		let file = registry.descriptor("File").unwrap();
		assert_eq!(file.property("name").unwrap().hint, Some(TypeHint::Text));
		assert_eq!(file.method("addLine").unwrap().hint, Some(TypeHint::Primitive));
		assert_eq!(registry.id_of("File"), Some(4));
		assert_eq!(registry.class_of(4).unwrap().name, "File");
		// Configured classes without exports are still decode targets
		assert!(registry.descriptor("Plain").unwrap().properties.is_empty());
		assert_eq!(registry.id_of("Plain"), Some(9));
	}

	#[test]
	fn test_adopt() {
		let mut registry = ClassRegistry::discover(&exports(), &BindConfig::default());
		assert!(!registry.adopt("File", 1));
		assert!(registry.adopt("File", 4));
		assert!(registry.adopt("File", 4));
		assert!(!registry.adopt("File", 5));
		assert!(!registry.adopt("Line", 4));
		assert!(registry.adopt("Line", 5));
	}

	/// 3: Animal, 4: Dog extends Animal, 5: Puppy extends Dog, 6: Cat extends Animal
	fn animals() -> RttiRegistry {
		RttiRegistry::from_types(
			[(0, None), (1, None), (2, None), (3, None), (4, Some(3)), (5, Some(4)), (6, Some(3))]
				.into_iter()
				.map(|(id, base)| asbind_types::rtti::RttiType {
					id,
					base,
					flags: Default::default(),
				})
				.collect(),
		)
	}

	#[test]
	fn test_nearest_walks_bases() {
		let rtti = animals();
		let mut registry = ClassRegistry::discover(&exports(), &BindConfig::default());
		registry.adopt("File", 3);
		assert_eq!(registry.nearest(5, &rtti).unwrap().name, "File");
		assert!(registry.nearest(2, &rtti).is_none());
	}

	#[test]
	fn test_inferred_ids_widen_to_a_shared_base() {
		let rtti = animals();
		let mut registry = ClassRegistry::default();
		// A puppy seen as an Animal only bounds the id from below
		assert!(registry.infer("Animal", 5, &rtti));
		assert_eq!(registry.id_of("Animal"), Some(5));
		assert!(registry.is_provisional("Animal"));
		// A cat shares only id 3 with it
		assert!(registry.infer("Animal", 6, &rtti));
		assert_eq!(registry.id_of("Animal"), Some(3));
		assert!(registry.infer("Animal", 4, &rtti));
		assert_eq!(registry.id_of("Animal"), Some(3));
		// The released id is free for the subclass
		assert!(registry.infer("Puppy", 5, &rtti));
		assert_eq!(registry.id_of("Puppy"), Some(5));
		assert!(!registry.infer("Puppy", 3, &rtti));
	}

	#[test]
	fn test_inference_skips_ids_of_other_classes() {
		let rtti = animals();
		let mut registry = ClassRegistry::default();
		assert!(registry.adopt("Dog", 4));
		assert!(registry.infer("Animal", 4, &rtti));
		assert_eq!(registry.id_of("Animal"), Some(3));
		assert!(!registry.infer("Dog", 6, &rtti));
		assert!(!registry.infer("Animal", 1, &rtti));
	}

	#[test]
	fn test_adopt_replaces_inferred_ids() {
		let rtti = animals();
		let mut registry = ClassRegistry::default();
		assert!(registry.infer("Animal", 4, &rtti));
		assert!(registry.adopt("Dog", 4));
		assert_eq!(registry.id_of("Animal"), None);
		assert_eq!(registry.id_of("Dog"), Some(4));
		assert!(!registry.is_provisional("Dog"));
		assert!(registry.infer("Animal", 5, &rtti));
		assert_eq!(registry.id_of("Animal"), Some(5));
		assert!(registry.adopt("Animal", 3));
		assert!(!registry.is_provisional("Animal"));
		// Fixed ids never widen
		assert!(!registry.infer("Dog", 6, &rtti));
		assert!(!registry.adopt("Dog", 5));
	}
}
