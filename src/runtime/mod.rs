//! Loop-Body Runtime
//!
//! The symbol table and child blocks a worker executes for every iteration.
//!
//! ## Submodules
//! - **`context`**: `ExecutionContext`, the name → value symbol table.
//! - **`program`**: Program bundle decoding and the child blocks of the loop body.

pub mod context;
pub mod program;

pub use context::{Data, DataType, ExecutionContext, ScalarObject};
pub use program::{ParForBody, ProgramBlock, ProgramBundle, parse_parfor_body};

#[cfg(test)]
mod tests;
