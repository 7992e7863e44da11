//! Static mapping from syscall numbers to their canonical names.

use std::convert::TryFrom;

use syscalls::Sysno;

/// Read-only syscall table, indexed by syscall number.
///
/// Slots inside the table's bounds may be unnamed: architectures leave gaps in their
/// numbering, and a number may be reserved without ever being wired to a syscall.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SyscallTable {
    names: Vec<Option<&'static str>>,
}

impl SyscallTable {
    /// Table for the architecture this crate was compiled for.
    pub fn native() -> Self {
        let len = Sysno::last().id() as usize + 1;

        let names = (0..len)
            .map(|nr| Sysno::new(nr).map(|sysno| sysno.name()))
            .collect();

        Self { names }
    }

    /// Build a table from explicit `(number, name)` entries. Unlisted numbers below the
    /// largest listed one are unnamed.
    pub fn from_entries(entries: impl IntoIterator<Item = (u64, &'static str)>) -> Self {
        let mut names = Vec::new();

        for (nr, name) in entries {
            let nr = nr as usize;

            if nr >= names.len() {
                names.resize(nr + 1, None);
            }

            names[nr] = Some(name);
        }

        Self { names }
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// True if `nr` is within the table's bounds, named or not.
    pub fn contains(&self, nr: u64) -> bool {
        nr < self.names.len() as u64
    }

    pub fn name(&self, nr: u64) -> Option<&'static str> {
        let index = usize::try_from(nr).ok()?;
        self.names.get(index).copied().flatten()
    }

    /// Reverse lookup. Linear, only used off the hot path.
    pub fn number(&self, name: &str) -> Option<u64> {
        self.names
            .iter()
            .position(|slot| *slot == Some(name))
            .map(|nr| nr as u64)
    }
}
