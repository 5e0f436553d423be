//! The compiled, shared, read-mostly rule set: Component I of the
//! distilled spec (minus rule *compilation*, which stays an external
//! collaborator — see [`RuleSetBuilder`]'s doc for what this crate
//! stands in for instead).

pub mod condition;
pub mod persist;

use std::ops::{BitOr, BitOrAssign};
use std::sync::Arc;

use aho_corasick::nfa::noncontiguous::NFA;
use aho_corasick::MatchKind;
use serde::{Deserialize, Serialize};

use crate::error::{Result, ScanError};
pub use condition::Condition;

/// Per-string attribute flags from the distilled spec's data model
/// (ASCII/WIDE/NO_CASE/FULL_WORD/HEX/LITERAL/FITS_IN_ATOM/SINGLE_MATCH),
/// plus `FAST_HEX` marking the strings whose regex bytecode the fast hex
/// executor (4.B) can run instead of the general one (4.C).
///
/// Implemented as a plain newtype over `u16` rather than pulling in a
/// flags-macro crate (the teacher workspace's own `bitmask` dependency's
/// exact macro surface isn't available to ground against here — see
/// DESIGN.md).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StringFlags(u16);

impl StringFlags {
    pub const ASCII: StringFlags = StringFlags(1 << 0);
    pub const WIDE: StringFlags = StringFlags(1 << 1);
    pub const NO_CASE: StringFlags = StringFlags(1 << 2);
    pub const FULL_WORD: StringFlags = StringFlags(1 << 3);
    pub const HEX: StringFlags = StringFlags(1 << 4);
    pub const LITERAL: StringFlags = StringFlags(1 << 5);
    pub const FITS_IN_ATOM: StringFlags = StringFlags(1 << 6);
    pub const SINGLE_MATCH: StringFlags = StringFlags(1 << 7);
    pub const FAST_HEX: StringFlags = StringFlags(1 << 8);

    pub const fn empty() -> Self {
        StringFlags(0)
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for StringFlags {
    type Output = StringFlags;
    fn bitor(self, rhs: Self) -> Self::Output {
        StringFlags(self.0 | rhs.0)
    }
}

impl BitOrAssign for StringFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl std::iter::FromIterator<StringFlags> for StringFlags {
    fn from_iter<T: IntoIterator<Item = StringFlags>>(iter: T) -> Self {
        iter.into_iter().fold(StringFlags::empty(), |a, b| a | b)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RuleId(pub u32);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NamespaceId(pub u32);

/// A single string (`$a`, `$hex_pat`, ...) belonging to a rule.
///
/// `id` is also this string's `PatternID` within the rule set's
/// Aho-Corasick automaton: the automaton and this vector are always
/// indexed in lockstep.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StringData {
    pub id: usize,
    pub name: String,
    pub rule_id: RuleId,
    pub flags: StringFlags,
    /// The string's full pattern bytes in their ASCII-range encoding.
    /// Used for the `FITS_IN_ATOM` fast path and as the comparator
    /// pattern for the literal verification path.
    pub raw: Vec<u8>,
    /// The short fixed byte sequence fed to the Aho-Corasick automaton.
    /// Not necessarily a prefix of `raw` — see [`StringData::atom_offset`].
    pub atom: Vec<u8>,
    /// Offset of `atom`'s first byte within `raw`. The AC candidate's
    /// `backtrack` (distance from the atom's last matched byte back to
    /// the pattern start) is `atom.len() + atom_offset`.
    pub atom_offset: usize,
    /// Forward regex bytecode/pattern source. Empty for `LITERAL`
    /// strings, which never run a regex at all (see 4.D).
    pub forward_code: Vec<u8>,
    /// Optional backward regex bytecode/pattern source, used to expand
    /// a zero-length forward anchor match into real offsets (see 4.D's
    /// post-forward handling).
    pub backward_code: Option<Vec<u8>>,
}

impl StringData {
    pub fn backtrack(&self) -> usize {
        self.atom.len() + self.atom_offset
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Namespace {
    pub id: NamespaceId,
    pub name: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Rule {
    pub id: RuleId,
    pub identifier: String,
    pub namespace: NamespaceId,
    pub is_private: bool,
    pub is_global: bool,
    pub string_ids: Vec<usize>,
    pub condition: Condition,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum ExternalValue {
    Integer(i64),
    Boolean(bool),
    String(String),
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExternalVar {
    pub identifier: String,
    pub value: ExternalValue,
}

/// The serializable part of a [`RuleSet`] — everything except the
/// Aho-Corasick automaton, which is rebuilt from `strings[*].atom` on
/// load (see `persist.rs`). This is the crate's stand-in for the
/// distilled spec's opaque on-disk arena: "this spec does not fix the
/// byte layout — the only contract is that `save` followed by `load`
/// preserves semantics."
#[derive(Clone, Debug, Serialize, Deserialize)]
pub(crate) struct RuleSetData {
    pub strings: Vec<StringData>,
    pub rules: Vec<Rule>,
    pub namespaces: Vec<Namespace>,
    pub externals: Vec<ExternalVar>,
}

/// A compiled rule set, shared read-only across concurrently scanning
/// threads (see SPEC_FULL.md §9a: this crate holds no thread counter or
/// mutex — share it as `Arc<RuleSet>`).
pub struct RuleSet {
    pub(crate) automaton: NFA,
    pub(crate) data: RuleSetData,
}

impl RuleSet {
    pub fn strings(&self) -> &[StringData] {
        &self.data.strings
    }

    pub fn rules(&self) -> &[Rule] {
        &self.data.rules
    }

    pub fn namespaces(&self) -> &[Namespace] {
        &self.data.namespaces
    }

    pub fn rule(&self, id: RuleId) -> &Rule {
        &self.data.rules[id.0 as usize]
    }

    pub fn string(&self, id: usize) -> &StringData {
        &self.data.strings[id]
    }

    /// Looks up an external variable's current value by identifier.
    pub fn variable(&self, identifier: &str) -> Option<&ExternalValue> {
        self.data
            .externals
            .iter()
            .find(|v| v.identifier == identifier)
            .map(|v| &v.value)
    }

    /// Linear search by identifier, update in place. Matches
    /// `yr_rules_define_*_variable` in `rules.c`: an identifier with no
    /// matching external falls through the search and returns
    /// successfully without touching anything.
    fn define_variable(&mut self, identifier: &str, value: ExternalValue) -> Result<()> {
        if let Some(slot) = self
            .data
            .externals
            .iter_mut()
            .find(|v| v.identifier == identifier)
        {
            slot.value = value;
        }
        Ok(())
    }

    pub fn define_integer_variable(
        &mut self,
        identifier: &str,
        value: i64,
    ) -> Result<()> {
        self.define_variable(identifier, ExternalValue::Integer(value))
    }

    pub fn define_boolean_variable(
        &mut self,
        identifier: &str,
        value: bool,
    ) -> Result<()> {
        self.define_variable(identifier, ExternalValue::Boolean(value))
    }

    pub fn define_string_variable(
        &mut self,
        identifier: &str,
        value: impl Into<String>,
    ) -> Result<()> {
        self.define_variable(identifier, ExternalValue::String(value.into()))
    }

    fn build_automaton(data: &RuleSetData) -> Result<NFA> {
        let atoms: Vec<Vec<u8>> = data.strings.iter().map(|s| s.atom.clone()).collect();
        aho_corasick::nfa::noncontiguous::Builder::new()
            .match_kind(MatchKind::Standard)
            .build(&atoms)
            .map_err(|e| {
                ScanError::Deserialize(bincode::Error::new(
                    bincode::ErrorKind::Custom(e.to_string()),
                ))
            })
    }
}

/// Stands in for the external rule-compiler collaborator: callers hand
/// this builder already-decided string attributes, atoms and bytecode —
/// exactly what a real YARA-rule-text compiler would have produced —
/// instead of parsing rule source. Parsing YARA's rule language and
/// choosing atoms/bytecode from it is explicitly out of scope (§1).
#[derive(Default)]
pub struct RuleSetBuilder {
    namespaces: Vec<Namespace>,
    rules: Vec<Rule>,
    strings: Vec<StringData>,
    externals: Vec<ExternalVar>,
}

/// Input to [`RuleSetBuilder::add_rule`] describing one string the way
/// the (external) compiler would have produced it.
pub struct StringSpec {
    pub name: String,
    pub flags: StringFlags,
    pub raw: Vec<u8>,
    pub atom: Vec<u8>,
    pub atom_offset: usize,
    pub forward_code: Vec<u8>,
    pub backward_code: Option<Vec<u8>>,
}

impl RuleSetBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_namespace(&mut self, name: impl Into<String>) -> NamespaceId {
        let id = NamespaceId(self.namespaces.len() as u32);
        self.namespaces.push(Namespace { id, name: name.into() });
        id
    }

    pub fn add_external_variable(
        &mut self,
        identifier: impl Into<String>,
        value: ExternalValue,
    ) {
        self.externals.push(ExternalVar { identifier: identifier.into(), value });
    }

    #[allow(clippy::too_many_arguments)]
    pub fn add_rule(
        &mut self,
        identifier: impl Into<String>,
        namespace: NamespaceId,
        is_private: bool,
        is_global: bool,
        strings: Vec<StringSpec>,
        condition: Condition,
    ) -> RuleId {
        let rule_id = RuleId(self.rules.len() as u32);
        let mut string_ids = Vec::with_capacity(strings.len());
        for spec in strings {
            let id = self.strings.len();
            string_ids.push(id);
            self.strings.push(StringData {
                id,
                name: spec.name,
                rule_id,
                flags: spec.flags,
                raw: spec.raw,
                atom: spec.atom,
                atom_offset: spec.atom_offset,
                forward_code: spec.forward_code,
                backward_code: spec.backward_code,
            });
        }
        self.rules.push(Rule {
            id: rule_id,
            identifier: identifier.into(),
            namespace,
            is_private,
            is_global,
            string_ids,
            condition,
        });
        rule_id
    }

    pub fn build(self) -> Result<RuleSet> {
        let data = RuleSetData {
            strings: self.strings,
            rules: self.rules,
            namespaces: self.namespaces,
            externals: self.externals,
        };
        let automaton = RuleSet::build_automaton(&data)?;
        Ok(RuleSet { automaton, data })
    }
}

/// Convenience: wrap a freshly built rule set for sharing across scan
/// threads, matching how this crate expects rule sets to be used (see
/// SPEC_FULL.md §9a).
pub fn shared(rules: RuleSet) -> Arc<RuleSet> {
    Arc::new(rules)
}
