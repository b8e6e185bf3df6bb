//! Source sections for error reporting and line profiling.

use std::rc::Rc;

/// A region of source code attached to a syntax node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceSection {
    /// Path of the source file.
    pub path: Rc<str>,
    /// 1-indexed start line.
    pub line: u32,
    /// 1-indexed start column.
    pub column: u32,
}

impl SourceSection {
    /// Create a section for the given path and position.
    pub fn new(path: &str, line: u32, column: u32) -> Self {
        Self {
            path: Rc::from(path),
            line,
            column,
        }
    }
}
