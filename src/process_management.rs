//! R side process lifecycle: command templating, spawn and asynchronous
//! reaping.

pub mod child_process;
pub mod template;

pub use child_process::{ChildProcess, ChildStatus};
pub use template::{CommandTemplate, TemplateValues};
