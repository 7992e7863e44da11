use std::convert::TryFrom;

/// Invocation count per syscall number, shared by every tracee of a run.
///
/// Counts only ever grow while a run is traced. Only the policy emitter, after the run,
/// overwrites a slot.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct SyscallCounts {
    counts: Vec<u64>,
}

impl SyscallCounts {
    pub fn new(len: usize) -> Self {
        let counts = vec![0; len];
        Self { counts }
    }

    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Count one invocation of `nr`. Returns `false`, leaving the table untouched, if
    /// `nr` is out of bounds.
    pub fn increment(&mut self, nr: u64) -> bool {
        match self.slot_mut(nr) {
            Some(count) => {
                *count += 1;
                true
            },
            None => false,
        }
    }

    pub fn get(&self, nr: u64) -> u64 {
        usize::try_from(nr)
            .ok()
            .and_then(|index| self.counts.get(index))
            .copied()
            .unwrap_or(0)
    }

    /// Overwrite the count of `nr`. Out of bounds numbers are ignored.
    pub fn set(&mut self, nr: u64, value: u64) {
        if let Some(count) = self.slot_mut(nr) {
            *count = value;
        }
    }

    /// Iterate `(number, count)` pairs in ascending syscall number order.
    pub fn iter(&self) -> impl Iterator<Item = (u64, u64)> + '_ {
        self.counts
            .iter()
            .enumerate()
            .map(|(nr, count)| (nr as u64, *count))
    }

    pub fn total(&self) -> u64 {
        self.counts.iter().sum()
    }

    fn slot_mut(&mut self, nr: u64) -> Option<&mut u64> {
        let index = usize::try_from(nr).ok()?;
        self.counts.get_mut(index)
    }
}
