//! Fenced code block balance check.
//!
//! A line whose left-trimmed content starts with three or more backticks
//! toggles the fence state, whatever follows (language tags, titles). The
//! scan only tracks open/closed, so a backtick line inside an open block
//! always closes it.

/// Outcome of a fence scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FenceBalance {
    Balanced,
    /// A fence opened on this 1-based line was never closed.
    Unclosed { line: usize },
}

impl FenceBalance {
    pub fn is_balanced(self) -> bool {
        matches!(self, Self::Balanced)
    }
}

/// Scan `text` line by line and report whether every fence is closed.
pub fn check_fences(text: &str) -> FenceBalance {
    let mut open_at: Option<usize> = None;

    for (idx, line) in text.split('\n').enumerate() {
        if is_fence_line(line) {
            open_at = match open_at {
                Some(_) => None,
                None => Some(idx + 1),
            };
        }
    }

    match open_at {
        Some(line) => FenceBalance::Unclosed { line },
        None => FenceBalance::Balanced,
    }
}

fn is_fence_line(line: &str) -> bool {
    line.trim_start().starts_with("```")
}
