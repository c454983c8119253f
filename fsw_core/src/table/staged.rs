//! Copy, load, validate, commit.

use crate::error::{TableError, TableResult};

/// Load into a copy of `live` and commit only if `load` succeeds.
///
/// On error `live` is left exactly as it was, so a failed load followed by a
/// retry sees the same starting state.
pub fn staged_load<D, F>(live: &mut D, load: F) -> TableResult<()>
where
    D: Clone,
    F: FnOnce(&mut D) -> TableResult<()>,
{
    let mut scratch = live.clone();
    load(&mut scratch)?;
    *live = scratch;
    Ok(())
}

/// How many of a table's objects a load must resolve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoadPolicy {
    /// Every object, every time.
    #[default]
    AllRequired,
    /// Every object on the first load; afterwards any non-empty subset
    /// updates the matching fields and leaves the rest untouched.
    PartialAfterFirstLoad,
}

impl LoadPolicy {
    pub const fn accepts(self, found: usize, expected: usize, loaded_before: bool) -> bool {
        match self {
            Self::AllRequired => found == expected,
            Self::PartialAfterFirstLoad => found == expected || (loaded_before && found >= 1),
        }
    }

    /// [`accepts`](Self::accepts) as a `Result`.
    pub fn check(self, found: usize, expected: usize, loaded_before: bool) -> TableResult<()> {
        if self.accepts(found, expected, loaded_before) {
            Ok(())
        } else {
            Err(TableError::Incomplete { found, expected })
        }
    }
}
