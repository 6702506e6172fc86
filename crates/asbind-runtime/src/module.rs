use std::any::Any;
use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::Result;
use asbind_types::cnf::{COLLECT_EXPORT, RTTI_BASE_EXPORT};
use asbind_types::controller::MemoryController;
use asbind_types::err::{Error, PrefixError};
use asbind_types::header::Header;
use asbind_types::opaque::{Handle, OpaqueRegistry, OpaqueValue};
use asbind_types::raw::{Ptr, RawValue, Signature};
use asbind_types::rtti::{RttiRegistry, RttiType};
use tracing::{debug, trace, warn};

use crate::class::{ClassDescriptor, ClassRegistry, Member};
use crate::config::BindConfig;
use crate::hint::TypeHint;
use crate::proxy::ClassProxy;
use crate::resolver::Resolver;
use crate::value::Value;

/// A plain function export of a bound module.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Function {
	name: String,
	signature: Signature,
	returns: Option<TypeHint>,
}

impl Function {
	pub fn name(&self) -> &str {
		&self.name
	}

	pub fn signature(&self) -> &Signature {
		&self.signature
	}

	/// The declared result hint, if any.
	pub fn returns(&self) -> Option<&TypeHint> {
		self.returns.as_ref()
	}

	pub fn call<C: MemoryController>(&self, module: &mut Module<C>, args: &[Value]) -> Result<Value> {
		module.call(&self.name, args, None)
	}

	pub fn call_as<C: MemoryController>(
		&self,
		module: &mut Module<C>,
		args: &[Value],
		hint: TypeHint,
	) -> Result<Value> {
		module.call(&self.name, args, Some(hint))
	}
}

/// A module bound to host values.
///
/// Binding reads the runtime type information once, groups class exports into
/// descriptors, and wraps the remaining exports as [`Function`]s. All state
/// belongs to this binding: two bindings never share classes or opaque
/// handles, even for the same module.
pub struct Module<C: MemoryController> {
	controller: C,
	rtti: RttiRegistry,
	classes: ClassRegistry,
	opaque: OpaqueRegistry,
	functions: BTreeMap<String, Function>,
}

impl<C: MemoryController> Module<C> {
	pub fn bind(controller: C) -> Result<Self> {
		Self::bind_with(controller, BindConfig::default())
	}

	pub fn bind_with(mut controller: C, config: BindConfig) -> Result<Self> {
		let rtti = RttiRegistry::load(&mut controller, &RTTI_BASE_EXPORT)
			.prefix_err(|| "Failed to load runtime type information")?;
		let classes = ClassRegistry::discover(controller.exports(), &config);
		let functions = controller
			.exports()
			.iter()
			.filter(|e| !e.name.starts_with("__") && Member::parse(&e.name).is_none())
			.map(|e| {
				let function = Function {
					name: e.name.clone(),
					signature: e.signature.clone(),
					returns: config.exports.get(&e.name).cloned(),
				};
				(e.name.clone(), function)
			})
			.collect::<BTreeMap<_, _>>();
		for name in config.exports.keys() {
			if !functions.contains_key(name) {
				warn!(export = name, "configured export is not a module function");
			}
		}
		debug!(
			functions = functions.len(),
			classes = classes.len(),
			types = rtti.len(),
			"bound module"
		);
		Ok(Self {
			controller,
			rtti,
			classes,
			opaque: OpaqueRegistry::new(),
			functions,
		})
	}

	pub fn controller(&self) -> &C {
		&self.controller
	}

	pub fn controller_mut(&mut self) -> &mut C {
		&mut self.controller
	}

	pub fn into_controller(self) -> C {
		self.controller
	}

	pub fn rtti(&self) -> &RttiRegistry {
		&self.rtti
	}

	pub fn classes(&self) -> &ClassRegistry {
		&self.classes
	}

	pub fn class(&self, name: &str) -> Result<Arc<ClassDescriptor>> {
		Ok(self.classes.descriptor(name)?.clone())
	}

	/// Function exports in alphabetical order.
	pub fn functions(&self) -> impl Iterator<Item = &Function> {
		self.functions.values()
	}

	pub fn function(&self, name: &str) -> Result<Function> {
		self.functions.get(name).cloned().ok_or_else(|| Error::UnknownExport(name.to_string()).into())
	}

	fn resolver(&mut self) -> Resolver<'_> {
		Resolver::new(&mut self.controller, &self.rtti, &mut self.classes, &self.opaque)
	}

	/// Call a function export.
	///
	/// The result is interpreted with `hint`, or else with the hint declared
	/// for the export, or else as a number.
	pub fn call(&mut self, name: &str, args: &[Value], hint: Option<TypeHint>) -> Result<Value> {
		let function = self.functions.get(name).ok_or_else(|| Error::UnknownExport(name.to_string()))?;
		let hint = hint.or_else(|| function.returns.clone());
		let raw = self.invoke(name, &[], args)?;
		self.resolver().resolve(raw, hint.as_ref())
	}

	/// Encode arguments, invoke an export and return its raw result.
	///
	/// Objects allocated for the arguments stay pinned until the call returns
	/// when the module exports a pinning runtime. They are unpinned even if
	/// the call fails.
	fn invoke(&mut self, export: &str, leading: &[RawValue], args: &[Value]) -> Result<Option<RawValue>> {
		let signature =
			self.controller.signature(export).cloned().ok_or_else(|| Error::UnknownExport(export.to_string()))?;
		let (raw, pinned) = self.resolver().encode_args(export, &signature, leading, args)?;
		trace!(export, args = ?raw, "invoking export");
		let result = self.controller.invoke(export, &raw).prefix_err(|| format!("Failed to invoke '{export}'"));
		let released = self.controller.unpin_all(&pinned);
		let result = result?;
		released?;
		trace!(export, ?result, "export returned");
		Ok(result)
	}

	/// Construct a new instance of a class.
	///
	/// The runtime id of the new object becomes the fixed id of `class`.
	pub fn construct(&mut self, class: &str, args: &[Value]) -> Result<ClassProxy> {
		let descriptor = self.class(class)?;
		let Some(constructor) = &descriptor.constructor else {
			return Err(Error::NonConstructibleClass(class.to_string()).into());
		};
		// The constructor allocates the object itself when given a null `this`
		let raw = self.invoke(constructor, &[Ptr::NULL.into()], args)?;
		let Some(ptr) = raw.and_then(|r| r.as_ptr()).filter(|p| !p.is_null()) else {
			return Err(Error::NullConstruction(class.to_string()).into());
		};
		let id = Header::id_of(&self.controller, ptr)?;
		if !self.classes.adopt(class, id) {
			return Err(Error::TypeMismatch {
				address: ptr,
				expected: class.to_string(),
				found: id,
			}
			.into());
		}
		Ok(ClassProxy::new(ptr, id, descriptor))
	}

	/// Read a property of an object.
	///
	/// Without an explicit `hint` the property's declared hint is used. A
	/// declared reference property whose object cannot be identified fails
	/// with [`Error::AmbiguousType`].
	pub fn get(&mut self, proxy: &ClassProxy, property: &str, hint: Option<TypeHint>) -> Result<Value> {
		proxy.validate(&self.controller)?;
		let prop = proxy.class().property(property).ok_or_else(|| Error::UnknownMember {
			class: proxy.name().to_string(),
			member: property.to_string(),
		})?;
		let explicit = hint.is_some();
		let hint = hint.or_else(|| prop.hint.clone());
		let raw = self.invoke(&prop.getter, &[proxy.address().into()], &[])?;
		match self.resolver().resolve(raw, hint.as_ref()) {
			Err(e) if !explicit && matches!(e.downcast_ref::<Error>(), Some(Error::UnresolvedType { .. })) => {
				Err(Error::AmbiguousType {
					class: proxy.name().to_string(),
					property: property.to_string(),
					address: raw.and_then(|r| r.as_ptr()).unwrap_or_default(),
				}
				.into())
			}
			result => result,
		}
	}

	/// Write a property of an object.
	pub fn set(&mut self, proxy: &ClassProxy, property: &str, value: Value) -> Result<()> {
		proxy.validate(&self.controller)?;
		let setter = match proxy.class().property(property) {
			Some(prop) => prop.setter.clone().ok_or_else(|| Error::ReadOnlyProperty {
				class: proxy.name().to_string(),
				property: property.to_string(),
			})?,
			// A setter without a getter is exported as a method
			None => match proxy.class().method(&format!("set:{property}")) {
				Some(method) => method.export.clone(),
				None => {
					return Err(Error::UnknownMember {
						class: proxy.name().to_string(),
						member: property.to_string(),
					}
					.into());
				}
			},
		};
		self.invoke(&setter, &[proxy.address().into()], &[value])?;
		Ok(())
	}

	/// Call a method of an object.
	pub fn invoke_method(
		&mut self,
		proxy: &ClassProxy,
		method: &str,
		args: &[Value],
		hint: Option<TypeHint>,
	) -> Result<Value> {
		proxy.validate(&self.controller)?;
		let m = proxy.class().method(method).ok_or_else(|| Error::UnknownMember {
			class: proxy.name().to_string(),
			member: method.to_string(),
		})?;
		let hint = hint.or_else(|| m.hint.clone());
		let raw = self.invoke(&m.export, &[proxy.address().into()], args)?;
		self.resolver().resolve(raw, hint.as_ref())
	}

	/// View an object as another class in its inheritance chain.
	pub fn cast(&mut self, proxy: &ClassProxy, class: &str) -> Result<ClassProxy> {
		proxy.validate(&self.controller)?;
		self.resolver().resolve_class(proxy.address(), class)
	}

	/// Interpret an address obtained outside of a call, such as a global.
	///
	/// Unlike call results, a value passed here is taken to be a reference, so
	/// without a hint its type is detected from the allocation header.
	pub fn resolve(&mut self, raw: RawValue, hint: Option<&TypeHint>) -> Result<Value> {
		let hint = hint.unwrap_or(&TypeHint::Auto);
		self.resolver().resolve(Some(raw), Some(hint))
	}

	/// The RTTI entry of the object at `ptr`.
	pub fn type_of(&self, ptr: Ptr) -> Result<RttiType> {
		let id = Header::id_of(&self.controller, ptr)?;
		Ok(*self.rtti.lookup(id)?)
	}

	/// Read an exported global as a number.
	pub fn global(&mut self, name: &str) -> Result<Option<Value>> {
		Ok(self.controller.global(name)?.map(Value::from))
	}

	/// Register a host value and return the handle the module sees.
	pub fn register_opaque<T: Any + Send + Sync>(&mut self, value: T) -> Result<Handle> {
		self.register_shared(Arc::new(value))
	}

	/// Register an already shared host value without copying it.
	pub fn register_shared(&mut self, value: OpaqueValue) -> Result<Handle> {
		Ok(self.opaque.register(value)?)
	}

	pub fn opaque(&self, handle: Handle) -> Result<OpaqueValue> {
		Ok(self.opaque.lookup(handle)?)
	}

	pub fn release_opaque(&mut self, handle: Handle) -> Option<OpaqueValue> {
		self.opaque.release(handle)
	}

	/// Run the module's garbage collector, if it exports one.
	pub fn collect(&mut self) -> Result<()> {
		if self.controller.has_export(&COLLECT_EXPORT) {
			self.controller.invoke(&COLLECT_EXPORT, &[]).prefix_err(|| "Failed to collect garbage")?;
		}
		Ok(())
	}
}
