pub mod array;
pub mod compiler;
pub mod device;
pub mod runtime;
