use std::fmt;
use std::sync::Arc;

use anyhow::Result;
use asbind_types::cnf::VALIDATE_PROXIES;
use asbind_types::controller::MemoryController;
use asbind_types::err::Error;
use asbind_types::header::Header;
use asbind_types::raw::Ptr;

use crate::class::ClassDescriptor;
use crate::hint::TypeHint;
use crate::module::Module;
use crate::value::Value;

/// A host-side view of a class instance living in module memory.
///
/// A proxy borrows the object: it neither owns nor retains it, and two
/// proxies for the same address alias the same memory. Every access first
/// checks that the allocation header still carries the runtime id observed
/// when the proxy was created, so a proxy to freed and reused memory fails
/// with [`Error::StaleProxy`] instead of reading garbage.
#[derive(Clone)]
pub struct ClassProxy {
	address: Ptr,
	id: u32,
	class: Arc<ClassDescriptor>,
}

impl ClassProxy {
	pub fn new(address: Ptr, id: u32, class: Arc<ClassDescriptor>) -> Self {
		Self {
			address,
			id,
			class,
		}
	}

	pub fn address(&self) -> Ptr {
		self.address
	}

	/// The concrete runtime id of the object, which may belong to a subclass.
	pub fn id(&self) -> u32 {
		self.id
	}

	pub fn class(&self) -> &Arc<ClassDescriptor> {
		&self.class
	}

	pub fn name(&self) -> &str {
		&self.class.name
	}

	/// Check that the object has not been replaced since the proxy was created.
	pub fn validate(&self, controller: &dyn MemoryController) -> Result<()> {
		if !*VALIDATE_PROXIES {
			return Ok(());
		}
		let found = Header::id_of(controller, self.address)?;
		if found != self.id {
			return Err(Error::StaleProxy {
				address: self.address,
				expected: self.id,
				found,
			}
			.into());
		}
		Ok(())
	}

	/// Read a property, using its declared hint.
	pub fn get<C: MemoryController>(&self, module: &mut Module<C>, property: &str) -> Result<Value> {
		module.get(self, property, None)
	}

	/// Read a property, interpreting the result with `hint`.
	pub fn get_as<C: MemoryController>(
		&self,
		module: &mut Module<C>,
		property: &str,
		hint: TypeHint,
	) -> Result<Value> {
		module.get(self, property, Some(hint))
	}

	pub fn set<C: MemoryController>(
		&self,
		module: &mut Module<C>,
		property: &str,
		value: impl Into<Value>,
	) -> Result<()> {
		module.set(self, property, value.into())
	}

	/// Call a method, using its declared result hint.
	pub fn call<C: MemoryController>(
		&self,
		module: &mut Module<C>,
		method: &str,
		args: &[Value],
	) -> Result<Value> {
		module.invoke_method(self, method, args, None)
	}

	pub fn call_as<C: MemoryController>(
		&self,
		module: &mut Module<C>,
		method: &str,
		args: &[Value],
		hint: TypeHint,
	) -> Result<Value> {
		module.invoke_method(self, method, args, Some(hint))
	}

	/// View the same object as another class in its inheritance chain.
	pub fn cast<C: MemoryController>(&self, module: &mut Module<C>, class: &str) -> Result<ClassProxy> {
		module.cast(self, class)
	}
}

impl PartialEq for ClassProxy {
	fn eq(&self, other: &Self) -> bool {
		self.address == other.address && self.id == other.id
	}
}

impl fmt::Debug for ClassProxy {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "<{}@{} id={}>", self.class.name, self.address, self.id)
	}
}
