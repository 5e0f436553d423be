//! Rule set load/save (4.I). The on-disk format is an opaque blob as
//! far as this spec is concerned: the only contract `load(save(rules))`
//! must preserve is scan semantics, not a fixed byte layout. We simply
//! `bincode`-serialize [`RuleSetData`] and rebuild the Aho-Corasick
//! automaton on load, since the automaton itself isn't (and doesn't need
//! to be) serializable.

use std::path::Path;

use crate::error::{Result, ScanError};

use super::{RuleSet, RuleSetData};

impl RuleSet {
    /// Loads a rule set previously written by [`RuleSet::save`].
    pub fn load(path: impl AsRef<Path>) -> Result<RuleSet> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|source| ScanError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let data: RuleSetData = bincode::deserialize(&bytes)?;
        let automaton = RuleSet::build_automaton(&data)?;
        log::debug!(
            "loaded rule set from {:?}: {} rule(s), {} string(s)",
            path,
            data.rules.len(),
            data.strings.len()
        );
        Ok(RuleSet { automaton, data })
    }

    /// Serializes this rule set to `path`. Fails if any scan is in
    /// flight and holds a borrow incompatible with serialization — in
    /// this crate's design (SPEC_FULL.md §9a) there is no thread counter
    /// to check, since `RuleSet` carries no live scan state at all; the
    /// distilled spec's `threads_count == 0` precondition is therefore
    /// always satisfied and is not modeled as a runtime check.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let bytes = bincode::serialize(&self.data)?;
        std::fs::write(path, bytes).map_err(|source| ScanError::Io {
            path: path.to_path_buf(),
            source,
        })
    }
}
