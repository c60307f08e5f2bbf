//! Participant identity and cabinet-ordering primitives.
//!
//! The engine interleaves dense indices and opaque addresses throughout the
//! protocol; this module is the single place that builds and owns the
//! address-to-index mapping, so the rest of the crate only ever needs one side
//! of that relationship at a time.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Dense position of a participant within one DKG instance, `0..n`.
pub type CabinetIndex = u32;

/// Opaque participant identity. Comparison and ordering are byte-wise; the
/// crate never interprets the contents.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Address(Vec<u8>);

impl Address {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for b in &self.0 {
            write!(f, "{:02x}", b)?;
        }
        Ok(())
    }
}

impl From<&str> for Address {
    fn from(s: &str) -> Self {
        Self(s.as_bytes().to_vec())
    }
}

/// An ordered set of participants for one DKG instance. Position within the
/// order is the participant's [`CabinetIndex`]; the mapping is rebuilt
/// wholesale every time a cabinet is installed, never mutated in place.
#[derive(Clone, Debug)]
pub struct Cabinet {
    members: Vec<Address>,
    index_of: HashMap<Address, CabinetIndex>,
}

impl Cabinet {
    pub fn new(members: Vec<Address>) -> Self {
        let index_of = members
            .iter()
            .enumerate()
            .map(|(i, a)| (a.clone(), i as CabinetIndex))
            .collect();
        Self { members, index_of }
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn index_of(&self, address: &Address) -> Option<CabinetIndex> {
        self.index_of.get(address).copied()
    }

    pub fn address_of(&self, index: CabinetIndex) -> Option<&Address> {
        self.members.get(index as usize)
    }

    pub fn contains(&self, address: &Address) -> bool {
        self.index_of.contains_key(address)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Address> {
        self.members.iter()
    }

    pub fn indices(&self) -> impl Iterator<Item = CabinetIndex> {
        0..self.members.len() as CabinetIndex
    }
}
