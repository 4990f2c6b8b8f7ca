//! Names are resolved and types are checked here. Nothing leaves this stage
//! unless the whole program is well typed.

pub mod diagnostic;
pub mod symbol_table;
pub mod ty;
pub mod type_checker;
