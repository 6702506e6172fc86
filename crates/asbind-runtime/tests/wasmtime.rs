#![cfg(feature = "wasmtime")]

use asbind_runtime::prelude::*;
use asbind_types::raw::RawValue;

/// A hand written module following the AssemblyScript runtime conventions: a
/// bump allocator behind `__new` writing 16 byte headers, an RTTI table, the
/// `env.abort` import and `Class#member` exports.
const MODULE: &str = r#"
(module
	(import "env" "abort" (func $abort (param i32 i32 i32 i32)))
	(memory (export "memory") 1)
	(global $next (mut i32) (i32.const 1024))
	(global (export "answer") i32 (i32.const 42))
	(global (export "__rtti_base") i32 (i32.const 64))
	;; "boom" as a string payload at 32, its size at 28
	(data (i32.const 28) "\08\00\00\00b\00o\00o\00m\00")
	;; four runtime types without flags
	(data (i32.const 64) "\04\00\00\00")

	(func $new (export "__new") (param $size i32) (param $id i32) (result i32)
		(local $block i32)
		(local.set $block (global.get $next))
		(i32.store (local.get $block) (local.get $size))
		(i32.store offset=8 (local.get $block) (local.get $id))
		(i32.store offset=12 (local.get $block) (local.get $size))
		(global.set $next
			(i32.and
				(i32.add (i32.add (local.get $block) (i32.const 31)) (local.get $size))
				(i32.const -16)))
		(i32.add (local.get $block) (i32.const 16)))

	(func (export "add") (param i32 i32) (result i32)
		(i32.add (local.get 0) (local.get 1)))

	(func (export "half") (param f64) (result f64)
		(f64.mul (local.get 0) (f64.const 0.5)))

	(func (export "echo") (param i32) (result i32)
		(local.get 0))

	(func (export "fail")
		(call $abort (i32.const 32) (i32.const 0) (i32.const 1) (i32.const 2))
		(unreachable))

	(func (export "Point#constructor") (param $this i32) (param $x i32) (param $y i32) (result i32)
		(if (i32.eqz (local.get $this))
			(then (local.set $this (call $new (i32.const 8) (i32.const 3)))))
		(i32.store (local.get $this) (local.get $x))
		(i32.store offset=4 (local.get $this) (local.get $y))
		(local.get $this))

	(func (export "Point#get:x") (param i32) (result i32)
		(i32.load (local.get 0)))

	(func (export "Point#set:x") (param i32 i32)
		(i32.store (local.get 0) (local.get 1)))

	(func (export "Point#get:y") (param i32) (result i32)
		(i32.load offset=4 (local.get 0)))

	(func (export "Point#length2") (param i32) (result i32)
		(i32.add
			(i32.mul (i32.load (local.get 0)) (i32.load (local.get 0)))
			(i32.mul (i32.load offset=4 (local.get 0)) (i32.load offset=4 (local.get 0)))))
)
"#;

fn bind() -> Module<Controller> {
	let controller = Controller::new(MODULE).unwrap();
	Module::bind(controller).unwrap()
}

#[test_log::test]
fn binds_a_compiled_module() {
	let module = bind();
	let functions = module.functions().map(|f| f.name()).collect::<Vec<_>>();
	assert_eq!(functions, vec!["add", "echo", "fail", "half"]);
	assert_eq!(module.classes().names().collect::<Vec<_>>(), vec!["Point"]);
	assert_eq!(module.rtti().len(), 4);
}

#[test_log::test]
fn calls_numeric_exports() {
	let mut module = bind();
	assert_eq!(module.call("add", &[2.into(), 40.into()], None).unwrap(), Value::I32(42));
	assert_eq!(module.call("half", &[5.0_f64.into()], None).unwrap(), Value::F64(2.5));
	assert_eq!(module.global("answer").unwrap(), Some(Value::I32(42)));
}

#[test_log::test]
fn strings_cross_the_boundary() {
	let mut module = bind();
	let echoed = module.call("echo", &["héllo 🦀".into()], Some(TypeHint::Text)).unwrap();
	assert_eq!(echoed, Value::from("héllo 🦀"));
	let bytes = module.call("echo", &[vec![1_u8, 2, 3].into()], Some(TypeHint::Bytes)).unwrap();
	assert_eq!(bytes, Value::Bytes(vec![1, 2, 3]));
}

#[test_log::test]
fn drives_class_instances() {
	let mut module = bind();
	let point = module.construct("Point", &[3.into(), 4.into()]).unwrap();
	assert_eq!(point.get(&mut module, "x").unwrap(), Value::I32(3));
	assert_eq!(point.get(&mut module, "y").unwrap(), Value::I32(4));
	assert_eq!(point.call(&mut module, "length2", &[]).unwrap(), Value::I32(25));
	point.set(&mut module, "x", 6).unwrap();
	assert_eq!(point.call(&mut module, "length2", &[]).unwrap(), Value::I32(52));
	let err = point.set(&mut module, "y", 1).unwrap_err();
	assert!(matches!(err.downcast_ref::<Error>(), Some(Error::ReadOnlyProperty { .. })));

	// The same object comes back through a plain export
	let same = module.call("echo", &[point.clone().into()], Some(TypeHint::Auto)).unwrap();
	assert_eq!(same.as_object(), Some(&point));
	assert_eq!(module.type_of(point.address()).unwrap().id, 3);
}

#[test_log::test]
fn opaque_handles_survive_a_round_trip() {
	let mut module = bind();
	let handle = module.register_opaque(String::from("host state")).unwrap();
	let back = module.call("echo", &[handle.into()], Some(TypeHint::Opaque)).unwrap();
	assert_eq!(back.downcast::<String>().map(String::as_str), Some("host state"));
	assert!(module.release_opaque(handle).is_some());
	let err = module.call("echo", &[RawValue::I32(handle.id()).into()], Some(TypeHint::Opaque)).unwrap_err();
	assert!(matches!(err.downcast_ref::<Error>(), Some(Error::UnknownOpaqueHandle(_))));
}

#[test_log::test]
fn aborts_surface_the_message() {
	let mut module = bind();
	let err = module.call("fail", &[], None).unwrap_err();
	let message = format!("{err:?}");
	assert!(message.contains("Failed to invoke 'fail'"), "{message}");
	assert!(message.contains("Module aborted: boom at :1:2"), "{message}");
}
