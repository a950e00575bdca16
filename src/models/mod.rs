pub mod document;
pub mod enums;
pub mod table;
pub mod task;

pub use document::*;
pub use enums::*;
pub use table::*;
pub use task::*;
