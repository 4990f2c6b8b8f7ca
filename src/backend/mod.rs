//! The backend flattens a checked tree into stack machine instructions. Loops
//! and conditionals are simplified to labels and jumps and expression trees
//! become ordered postfix operations.

pub mod bytecode;
pub mod codegen;
pub mod pretty_print;
pub mod verify;
