use std::collections::VecDeque;

/// Fixed-capacity line buffer that evicts its oldest lines first.
///
/// Every accepted line gets a sequence number, so readers can ask for the
/// lines pushed since they last looked even after earlier lines were evicted.
#[derive(Debug, Clone)]
pub struct LogRing {
    lines: VecDeque<String>,
    capacity: usize,
    /// Number of lines ever accepted.
    pushed: u64,
}

impl LogRing {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            lines: VecDeque::with_capacity(capacity.min(4096)),
            capacity,
            pushed: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Appends one line. Empty lines are dropped.
    pub fn push(&mut self, line: &str) {
        let line = line.trim_end_matches(['\r', '\n']);
        if line.is_empty() {
            return;
        }
        if self.lines.len() == self.capacity {
            self.lines.pop_front();
        }
        self.lines.push_back(line.to_string());
        self.pushed += 1;
    }

    /// The last `n` lines, oldest first.
    pub fn tail(&self, n: usize) -> Vec<String> {
        let skip = self.lines.len().saturating_sub(n);
        self.lines.iter().skip(skip).cloned().collect()
    }

    /// Lines with a sequence number of at least `cursor`, plus the cursor to
    /// pass next time.
    pub fn since(&self, cursor: u64) -> (Vec<String>, u64) {
        let first = self.pushed - self.lines.len() as u64;
        let skip = cursor.saturating_sub(first) as usize;
        let lines = self.lines.iter().skip(skip).cloned().collect();
        (lines, self.pushed)
    }
}
