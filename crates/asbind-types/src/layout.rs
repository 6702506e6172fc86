//! Fixed offsets, ids and flags of the AssemblyScript managed-object layout.

/// Size of the allocation header preceding every managed object
pub const HEADER_SIZE: u32 = 16;
/// Offset of the runtime type id, relative to the object address
pub const ID_OFFSET: u32 = 8;
/// Offset of the payload size, relative to the object address
pub const SIZE_OFFSET: u32 = 4;

/// Runtime id of `ArrayBuffer`
pub const ARRAYBUFFER_ID: u32 = 0;
/// Runtime id of `String`
pub const STRING_ID: u32 = 1;
/// Runtime id of `ArrayBufferView`, the base of every typed array
pub const ARRAYBUFFERVIEW_ID: u32 = 2;

/// Returns true for the ids the runtime reserves for its own types.
pub fn is_builtin(id: u32) -> bool {
	id <= ARRAYBUFFERVIEW_ID
}

// RTTI flags

pub const ARRAYBUFFERVIEW: u32 = 1 << 0;
pub const ARRAY: u32 = 1 << 1;
pub const SET: u32 = 1 << 2;
pub const MAP: u32 = 1 << 3;
pub const VAL_ALIGN_OFFSET: u32 = 5;
pub const VAL_SIGNED: u32 = 1 << 10;
pub const VAL_FLOAT: u32 = 1 << 11;
pub const VAL_NULLABLE: u32 = 1 << 12;
pub const VAL_MANAGED: u32 = 1 << 13;

// Array and ArrayBufferView fields

pub const ARRAYBUFFERVIEW_BUFFER_OFFSET: u32 = 0;
pub const ARRAYBUFFERVIEW_DATASTART_OFFSET: u32 = 4;
pub const ARRAYBUFFERVIEW_DATALENGTH_OFFSET: u32 = 8;
pub const ARRAYBUFFERVIEW_SIZE: u32 = 12;
pub const ARRAY_LENGTH_OFFSET: u32 = 12;
pub const ARRAY_SIZE: u32 = 16;

/// Encode a value alignment (log2 of the element size) into RTTI flags.
pub const fn value_align_flag(align: u32) -> u32 {
	(1 << align) << VAL_ALIGN_OFFSET
}
