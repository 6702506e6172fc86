use asbind::prelude::*;
use asbind::types::raw::{Ptr, RawValue, ValType::I32};
use asbind::types::testing::FakeModule;

const CONFIG: &str = r#"
[exports]
greet = "text"
getFoo = "class:Foo"

[classes.Foo]
id = 3

[classes.Foo.properties]
label = "text"
"#;

fn module() -> FakeModule {
	FakeModule::new()
		.with_rtti(&[(0, 0), (0, 0), (0, 0), (0, 0)])
		.function("greet", &[I32], &[I32], |heap, args| {
			let name = heap.string(args[0].as_ptr().unwrap_or(Ptr::NULL))?;
			Ok(Some(heap.new_string(&format!("hello {name}"))?.into()))
		})
		.function("getFoo", &[], &[I32], |heap, _| {
			let foo = heap.allocate(4, 3)?;
			let label = heap.new_string("foo")?;
			heap.write_u32(foo, *label)?;
			Ok(Some(foo.into()))
		})
		.function("Foo#get:label", &[I32], &[I32], |heap, args| {
			let foo = args[0].as_ptr().unwrap_or(Ptr::NULL);
			Ok(Some(RawValue::I32(heap.read_i32(foo)?)))
		})
}

#[test_log::test]
fn binds_with_a_configuration_file() {
	let config = BindConfig::parse(CONFIG).unwrap();
	assert_eq!(config.exports.get("getFoo"), Some(&TypeHint::class("Foo")));
	let mut module = Module::bind_with(module(), config).unwrap();
	assert_eq!(module.classes().id_of("Foo"), Some(3));

	let greeting = module.call("greet", &["ada".into()], None).unwrap();
	assert_eq!(greeting.as_str(), Some("hello ada"));

	let foo = module.call("getFoo", &[], None).unwrap().into_object().unwrap();
	assert_eq!(foo.name(), "Foo");
	assert_eq!(foo.get(&mut module, "label").unwrap(), Value::from("foo"));
}

#[test_log::test]
fn rejects_malformed_configuration() {
	let err = BindConfig::parse("[exports]\ngreet = \"text:utf8\"").unwrap_err();
	assert!(format!("{err:#}").contains("Failed to parse binding configuration"));
	let err = BindConfig::parse("[unknown]\nkey = 1").unwrap_err();
	assert!(format!("{err:#}").contains("unknown"));
}
