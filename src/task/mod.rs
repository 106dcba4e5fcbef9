//! Task Module
//!
//! A task is the unit of loop-body work handed to one worker invocation: either a
//! contiguous iteration range or an explicit list of iteration indices.
//!
//! ## Submodules
//! - **`types`**: The immutable `Task` and its iteration designation.
//! - **`codec`**: Parses and renders the compact textual task descriptor.

pub mod codec;
pub mod types;

pub use codec::TaskCodec;
pub use types::{Iterations, Task};
