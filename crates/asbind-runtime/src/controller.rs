use std::path::Path;

use anyhow::Result;
use asbind_types::controller::{MemoryController, check_bounds};
use asbind_types::err::{Error, PrefixError};
use asbind_types::raw::{Export, Ptr, RawValue, Signature, ValType};
use tracing::{debug, trace};
use wasmtime::{Caller, Engine, ExternType, FuncType, Instance, Linker, Memory, Store, Val};

/// A [`MemoryController`] backed by a wasmtime instance.
pub struct Controller {
	pub store: Store<()>,
	pub instance: Instance,
	pub memory: Memory,
	exports: Vec<Export>,
}

impl Controller {
	/// Compile and instantiate a module from binary or text format.
	pub fn new(wasm: impl AsRef<[u8]>) -> Result<Self> {
		let engine = Engine::default();
		let module = wasmtime::Module::new(&engine, wasm).prefix_err(|| "Failed to construct module from bytes")?;
		Self::instantiate(&engine, &module)
	}

	pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
		let engine = Engine::default();
		let module = wasmtime::Module::from_file(&engine, path.as_ref())
			.prefix_err(|| format!("Failed to load module from {}", path.as_ref().display()))?;
		Self::instantiate(&engine, &module)
	}

	fn instantiate(engine: &Engine, module: &wasmtime::Module) -> Result<Self> {
		let mut linker: Linker<()> = Linker::new(engine);
		implement_abort(&mut linker).prefix_err(|| "Failed to implement the abort import")?;
		let mut store = Store::new(engine, ());
		let instance =
			linker.instantiate(&mut store, module).prefix_err(|| "Failed to instantiate WASM module")?;
		let memory = instance
			.get_memory(&mut store, "memory")
			.prefix_err(|| "WASM module must export 'memory'")?;
		let exports = module
			.exports()
			.filter_map(|export| match export.ty() {
				ExternType::Func(ty) => signature(&ty).map(|signature| Export {
					name: export.name().to_string(),
					signature,
				}),
				_ => None,
			})
			.collect::<Vec<_>>();
		debug!(exports = exports.len(), "instantiated module");
		Ok(Self {
			store,
			instance,
			memory,
			exports,
		})
	}
}

/// The AssemblyScript runtime imports `env.abort(message, file, line, column)`
/// and calls it on assertion failures. The call is turned into a trap carrying
/// the decoded message.
fn implement_abort(linker: &mut Linker<()>) -> Result<()> {
	linker.func_wrap(
		"env",
		"abort",
		|mut caller: Caller<'_, ()>, message: i32, file: i32, line: i32, column: i32| -> Result<()> {
			let memory = caller.get_export("memory").and_then(|e| e.into_memory());
			let read = |ptr: i32| -> Option<String> {
				let memory = memory?;
				let data = memory.data(&caller);
				let start = ptr as usize;
				let size = data.get(start.checked_sub(4)?..start)?;
				let size = u32::from_le_bytes(size.try_into().ok()?) as usize;
				let bytes = data.get(start..start.checked_add(size)?)?;
				let units = bytes.chunks_exact(2).map(|c| u16::from_le_bytes([c[0], c[1]])).collect::<Vec<_>>();
				Some(String::from_utf16_lossy(&units))
			};
			let message = read(message).unwrap_or_default();
			let file = read(file).unwrap_or_default();
			anyhow::bail!("Module aborted: {message} at {file}:{line}:{column}")
		},
	)?;
	Ok(())
}

fn signature(ty: &FuncType) -> Option<Signature> {
	let params = ty.params().map(|t| val_type(&t)).collect::<Option<Vec<_>>>()?;
	let results = ty.results().map(|t| val_type(&t)).collect::<Option<Vec<_>>>()?;
	Some(Signature {
		params,
		results,
	})
}

/// Reference and vector types never appear in AssemblyScript exports.
fn val_type(ty: &wasmtime::ValType) -> Option<ValType> {
	match ty {
		wasmtime::ValType::I32 => Some(ValType::I32),
		wasmtime::ValType::I64 => Some(ValType::I64),
		wasmtime::ValType::F32 => Some(ValType::F32),
		wasmtime::ValType::F64 => Some(ValType::F64),
		_ => None,
	}
}

fn to_val(value: &RawValue) -> Val {
	match value {
		RawValue::I32(v) => Val::I32(*v),
		RawValue::I64(v) => Val::I64(*v),
		RawValue::F32(v) => Val::F32(v.to_bits()),
		RawValue::F64(v) => Val::F64(v.to_bits()),
	}
}

fn from_val(value: &Val) -> Option<RawValue> {
	match value {
		Val::I32(v) => Some(RawValue::I32(*v)),
		Val::I64(v) => Some(RawValue::I64(*v)),
		Val::F32(v) => Some(RawValue::F32(f32::from_bits(*v))),
		Val::F64(v) => Some(RawValue::F64(f64::from_bits(*v))),
		_ => None,
	}
}

impl MemoryController for Controller {
	fn memory_size(&self) -> u64 {
		self.memory.data_size(&self.store) as u64
	}

	fn read(&self, ptr: Ptr, len: u32) -> Result<Vec<u8>> {
		check_bounds(ptr, len, self.memory_size())?;
		let mut buffer = vec![0; len as usize];
		self.memory.read(&self.store, *ptr as usize, &mut buffer)?;
		Ok(buffer)
	}

	fn write(&mut self, ptr: Ptr, data: &[u8]) -> Result<()> {
		check_bounds(ptr, data.len() as u32, self.memory_size())?;
		self.memory.write(&mut self.store, *ptr as usize, data)?;
		Ok(())
	}

	fn exports(&self) -> &[Export] {
		&self.exports
	}

	fn global(&mut self, name: &str) -> Result<Option<RawValue>> {
		let Some(global) = self.instance.get_global(&mut self.store, name) else {
			return Ok(None);
		};
		Ok(from_val(&global.get(&mut self.store)))
	}

	fn invoke(&mut self, name: &str, args: &[RawValue]) -> Result<Option<RawValue>> {
		let func = self
			.instance
			.get_func(&mut self.store, name)
			.ok_or_else(|| Error::UnknownExport(name.to_string()))?;
		let params = args.iter().map(to_val).collect::<Vec<_>>();
		let mut results = vec![Val::I32(0); func.ty(&self.store).results().len()];
		trace!(name, "calling wasm function");
		func.call(&mut self.store, &params, &mut results)?;
		Ok(results.first().and_then(from_val))
	}
}
