//! Handle-scoped document access: metadata resolution and content reads.
//!
//! Both components are synchronous and talk to the host directly. Callers
//! on an async runtime should run them on the blocking pool.

mod reader;
mod resolver;

pub use reader::ContentReader;
pub use resolver::MetadataResolver;
