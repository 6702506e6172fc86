use std::sync::LazyLock;

/// The export used to allocate managed objects, called as `(size, id) -> ptr`.
pub static ALLOC_EXPORT: LazyLock<String> =
	lazy_env_parse!("ASBIND_ALLOC_EXPORT", String, || "__new".to_string());

/// The export used to pin a managed object for the duration of a call.
pub static PIN_EXPORT: LazyLock<String> =
	lazy_env_parse!("ASBIND_PIN_EXPORT", String, || "__pin".to_string());

/// The export used to release a previously pinned managed object.
pub static UNPIN_EXPORT: LazyLock<String> =
	lazy_env_parse!("ASBIND_UNPIN_EXPORT", String, || "__unpin".to_string());

/// The export used to run a full garbage collection cycle.
pub static COLLECT_EXPORT: LazyLock<String> =
	lazy_env_parse!("ASBIND_COLLECT_EXPORT", String, || "__collect".to_string());

/// The global holding the address of the runtime type information table.
pub static RTTI_BASE_EXPORT: LazyLock<String> =
	lazy_env_parse!("ASBIND_RTTI_BASE_EXPORT", String, || "__rtti_base".to_string());

/// The largest payload, in bytes, that a single decode may copy out of module memory (default: 64 MiB)
pub static MAX_DECODE_LENGTH: LazyLock<u32> =
	lazy_env_parse!("ASBIND_MAX_DECODE_LENGTH", u32, 64 * 1024 * 1024);

/// Whether class proxies re-read the allocation header on every access
pub static VALIDATE_PROXIES: LazyLock<bool> =
	lazy_env_parse!("ASBIND_VALIDATE_PROXIES", bool, true);
