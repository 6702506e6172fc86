//! An in-memory stand-in for a compiled AssemblyScript module.
//!
//! [`FakeModule`] owns a linear memory with a bump allocator that writes the
//! same allocation headers as the AssemblyScript runtime, and dispatches
//! exports to Rust closures. It is enough to exercise every codec and the
//! class machinery without an execution engine.

use std::collections::HashMap;

use anyhow::{Result, bail};

use crate::cnf::{ALLOC_EXPORT, RTTI_BASE_EXPORT};
use crate::controller::{MemoryController, check_bounds};
use crate::err::Error;
use crate::layout::{
	ARRAY_LENGTH_OFFSET, ARRAY_SIZE, ARRAYBUFFER_ID, ARRAYBUFFERVIEW_BUFFER_OFFSET,
	ARRAYBUFFERVIEW_DATALENGTH_OFFSET, ARRAYBUFFERVIEW_DATASTART_OFFSET, ARRAYBUFFERVIEW_SIZE,
	HEADER_SIZE,
};
use crate::raw::{Export, Ptr, RawValue, Signature, ValType};
use crate::rtti::Flags;
use crate::transfer::Transfer;

const PAGE_SIZE: usize = 64 * 1024;
const HEAP_START: u32 = 1024;

/// The implementation of one export.
pub type HostFn = Box<dyn FnMut(&mut Heap, &[RawValue]) -> Result<Option<RawValue>>>;

/// Linear memory with a bump allocator.
///
/// Exposed to export implementations so they can allocate and inspect
/// objects the way compiled module code would.
pub struct Heap {
	memory: Vec<u8>,
	next: u32,
}

impl Default for Heap {
	fn default() -> Self {
		Self {
			memory: vec![0; PAGE_SIZE],
			next: HEAP_START,
		}
	}
}

impl Heap {
	fn reserve(&mut self, len: u32) -> Result<Ptr> {
		let start = self.next;
		let end = start.checked_add(len).ok_or(Error::AllocationFailed {
			size: len,
			id: 0,
		})?;
		self.next = end.next_multiple_of(16);
		while self.memory.len() < self.next as usize {
			self.memory.extend(std::iter::repeat_n(0, PAGE_SIZE));
		}
		Ok(Ptr::from(start))
	}

	/// Allocate a managed object, writing its header.
	pub fn allocate(&mut self, size: u32, id: u32) -> Result<Ptr> {
		let block = self.reserve(HEADER_SIZE + size)?;
		// mmInfo, gcInfo, rtId, rtSize
		self.write_u32(block, size)?;
		self.write_u32(block.checked_add(4)?, 0)?;
		self.write_u32(block.checked_add(8)?, id)?;
		self.write_u32(block.checked_add(12)?, size)?;
		Ok(block.checked_add(HEADER_SIZE)?)
	}

	pub fn new_string(&mut self, text: &str) -> Result<Ptr> {
		text.to_string().transfer(self)
	}

	pub fn string(&self, ptr: Ptr) -> Result<String> {
		String::receive(ptr, self)
	}

	/// Allocate an `Array<T>` or typed array whose elements are the raw bytes `data`.
	pub fn new_array(&mut self, flags: u32, id: u32, data: &[u8]) -> Result<Ptr> {
		let flags = Flags::new(flags);
		let align = flags.value_align().unwrap_or(0);
		let buffer = self.allocate(data.len() as u32, ARRAYBUFFER_ID)?;
		self.write(buffer, data)?;
		let size = if flags.is_array() {
			ARRAY_SIZE
		} else {
			ARRAYBUFFERVIEW_SIZE
		};
		let ptr = self.allocate(size, id)?;
		self.write_u32(ptr.checked_add(ARRAYBUFFERVIEW_BUFFER_OFFSET)?, *buffer)?;
		self.write_u32(ptr.checked_add(ARRAYBUFFERVIEW_DATASTART_OFFSET)?, *buffer)?;
		self.write_u32(ptr.checked_add(ARRAYBUFFERVIEW_DATALENGTH_OFFSET)?, data.len() as u32)?;
		if flags.is_array() {
			self.write_u32(ptr.checked_add(ARRAY_LENGTH_OFFSET)?, (data.len() as u32) >> align)?;
		}
		Ok(ptr)
	}

	/// Overwrite the runtime id in the header of an existing object.
	pub fn retag(&mut self, ptr: Ptr, id: u32) -> Result<()> {
		self.write_u32(ptr.checked_sub(8)?, id)
	}
}

impl MemoryController for Heap {
	fn memory_size(&self) -> u64 {
		self.memory.len() as u64
	}

	fn read(&self, ptr: Ptr, len: u32) -> Result<Vec<u8>> {
		check_bounds(ptr, len, self.memory_size())?;
		Ok(self.memory[*ptr as usize..(*ptr + len) as usize].to_vec())
	}

	fn write(&mut self, ptr: Ptr, data: &[u8]) -> Result<()> {
		check_bounds(ptr, data.len() as u32, self.memory_size())?;
		self.memory[*ptr as usize..*ptr as usize + data.len()].copy_from_slice(data);
		Ok(())
	}

	fn exports(&self) -> &[Export] {
		&[]
	}

	fn global(&mut self, _: &str) -> Result<Option<RawValue>> {
		Ok(None)
	}

	fn invoke(&mut self, name: &str, args: &[RawValue]) -> Result<Option<RawValue>> {
		match (name == ALLOC_EXPORT.as_str(), args) {
			(true, [RawValue::I32(size), RawValue::I32(id)]) => {
				Ok(Some(self.allocate(*size as u32, *id as u32)?.into()))
			}
			_ => Err(Error::UnknownExport(name.to_string()).into()),
		}
	}
}

/// A module whose exports are Rust closures over a shared [`Heap`].
pub struct FakeModule {
	heap: Heap,
	exports: Vec<Export>,
	functions: HashMap<String, HostFn>,
	globals: HashMap<String, RawValue>,
	calls: Vec<String>,
}

impl Default for FakeModule {
	fn default() -> Self {
		Self::new()
	}
}

impl FakeModule {
	/// An empty module exporting only the allocator.
	pub fn new() -> Self {
		let module = Self {
			heap: Heap::default(),
			exports: Vec::new(),
			functions: HashMap::new(),
			globals: HashMap::new(),
			calls: Vec::new(),
		};
		module.function(&ALLOC_EXPORT, &[ValType::I32, ValType::I32], &[ValType::I32], |heap, args| {
			heap.invoke(&ALLOC_EXPORT, args)
		})
	}

	/// Add an export implemented by `f`.
	pub fn function<F>(mut self, name: &str, params: &[ValType], results: &[ValType], f: F) -> Self
	where
		F: FnMut(&mut Heap, &[RawValue]) -> Result<Option<RawValue>> + 'static,
	{
		self.exports.retain(|e| e.name != name);
		self.exports.push(Export {
			name: name.to_string(),
			signature: Signature::new(params, results),
		});
		self.functions.insert(name.to_string(), Box::new(f));
		self
	}

	pub fn with_global(mut self, name: &str, value: RawValue) -> Self {
		self.globals.insert(name.to_string(), value);
		self
	}

	/// Write an RTTI table of `(flags, base)` entries, indexed by runtime id.
	pub fn with_rtti(mut self, entries: &[(u32, u32)]) -> Self {
		let len = 4 + entries.len() as u32 * 8;
		let Ok(base) = self.heap.reserve(len) else {
			return self;
		};
		let mut table = (entries.len() as u32).to_le_bytes().to_vec();
		for (flags, parent) in entries {
			table.extend(flags.to_le_bytes());
			table.extend(parent.to_le_bytes());
		}
		if self.heap.write(base, &table).is_ok() {
			self.globals.insert(RTTI_BASE_EXPORT.to_string(), base.into());
		}
		self
	}

	pub fn heap(&self) -> &Heap {
		&self.heap
	}

	pub fn heap_mut(&mut self) -> &mut Heap {
		&mut self.heap
	}

	pub fn new_string(&mut self, text: &str) -> Result<Ptr> {
		self.heap.new_string(text)
	}

	pub fn new_array(&mut self, flags: u32, id: u32, data: &[u8]) -> Result<Ptr> {
		self.heap.new_array(flags, id, data)
	}

	/// Names of the exports invoked so far, in call order.
	pub fn calls(&self) -> &[String] {
		&self.calls
	}
}

impl MemoryController for FakeModule {
	fn memory_size(&self) -> u64 {
		self.heap.memory_size()
	}

	fn read(&self, ptr: Ptr, len: u32) -> Result<Vec<u8>> {
		self.heap.read(ptr, len)
	}

	fn write(&mut self, ptr: Ptr, data: &[u8]) -> Result<()> {
		self.heap.write(ptr, data)
	}

	fn exports(&self) -> &[Export] {
		&self.exports
	}

	fn global(&mut self, name: &str) -> Result<Option<RawValue>> {
		Ok(self.globals.get(name).copied())
	}

	fn invoke(&mut self, name: &str, args: &[RawValue]) -> Result<Option<RawValue>> {
		let Some(signature) = self.signature(name) else {
			return Err(Error::UnknownExport(name.to_string()).into());
		};
		let found = args.iter().map(RawValue::ty).collect::<Vec<_>>();
		if found != signature.params {
			bail!(Error::ArgumentMismatch {
				export: name.to_string(),
				reason: format!("expected {signature}, found {found:?}"),
			});
		}
		self.calls.push(name.to_string());
		match self.functions.get_mut(name) {
			Some(f) => f(&mut self.heap, args),
			None => Err(Error::UnknownExport(name.to_string()).into()),
		}
	}
}
