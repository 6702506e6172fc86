/// A macro that allows lazily parsing a value from the environment variable,
/// with a fallback default value if the variable is not set or parsing fails.
///
/// # Parameters
///
/// - `$key`: An expression representing the name of the environment variable.
/// - `$t`: The type of the value to be parsed.
/// - `$default`: The default value to fall back to if the environment variable is not set or
///   parsing fails.
///
/// # Return Value
///
/// A lazy static variable of type `std::sync::LazyLock`, which holds the parsed
/// value from the environment variable or the default value.
#[macro_export]
macro_rules! lazy_env_parse {
	// With a closure for the default value
	($key:expr, $t:ty, || $default:expr) => {
		std::sync::LazyLock::new(|| {
			std::env::var($key).ok().and_then(|s| s.parse::<$t>().ok()).unwrap_or_else(|| $default)
		})
	};
	// With a static expression for the default value
	($key:expr, $t:ty, $default:expr) => {
		std::sync::LazyLock::new(|| {
			std::env::var($key).ok().and_then(|s| s.parse::<$t>().ok()).unwrap_or($default)
		})
	};
}

#[cfg(test)]
mod tests {
	use std::sync::LazyLock;

	#[test_log::test]
	fn parses_the_environment_or_falls_back() {
		// SAFETY: no other test reads or writes these variables
		unsafe {
			std::env::set_var("ASBIND_TEST_DECODE_LENGTH", "4096");
			std::env::set_var("ASBIND_TEST_VALIDATE", "maybe");
		}
		let parsed: LazyLock<u32> = lazy_env_parse!("ASBIND_TEST_DECODE_LENGTH", u32, 1);
		let invalid: LazyLock<bool> = lazy_env_parse!("ASBIND_TEST_VALIDATE", bool, true);
		let missing: LazyLock<String> =
			lazy_env_parse!("ASBIND_TEST_MISSING_EXPORT", String, || "__new".to_string());
		assert_eq!(*parsed, 4096);
		assert!(*invalid);
		assert_eq!(*missing, "__new");
	}
}
