//! Parse, edit, and re-emit JVM class files
//!
//! The entry points are [`class::ClassFile`] for whole-file work,
//! [`pool::PoolScan`] for cheap peeks into raw class bytes, and
//! [`code::Code`] for editing method bodies with position-stable
//! instruction handles.

pub mod binary;
pub mod class;
pub mod code;
pub mod errors;
pub mod pool;

mod access_flags;

pub use access_flags::{
    ClassAccessFlags, FieldAccessFlags, InnerClassAccessFlags, MethodAccessFlags,
};
pub use errors::Error;
