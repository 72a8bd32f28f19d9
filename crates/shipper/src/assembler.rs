//! Slow-log block assembly
//!
//! MySQL writes one slow query as several lines. A block starts at a
//! `# User@Host:` header and ends when the next block (or a `# Time:` line)
//! begins, so a block is only known to be complete once its successor
//! shows up, or when the file is being closed.

const TIME_MARKER: &str = "# Time:";
const USER_HOST_MARKER: &str = "# User@Host:";

/// Groups raw slow-log lines into blocks, one file at a time
#[derive(Debug, Default)]
pub struct SlowLogAssembler {
    pending: Vec<String>,
}

impl SlowLogAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one line; returns the block it completed, if any
    pub fn push(&mut self, line: String) -> Option<Vec<String>> {
        if line.starts_with(TIME_MARKER) {
            return self.flush();
        }

        if line.starts_with(USER_HOST_MARKER) {
            let completed = self.flush();
            self.pending.push(line);
            return completed;
        }

        if self.pending.is_empty() {
            // Server banner or statement text whose header we never saw
            tracing::trace!(line = %line, "slow log line outside any block");
            return None;
        }

        self.pending.push(line);
        None
    }

    /// Hand out the partial block, if any
    pub fn flush(&mut self) -> Option<Vec<String>> {
        if self.pending.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.pending))
        }
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }
}
