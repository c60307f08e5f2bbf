//! Complaint-tracking containers (C4).
//!
//! Three bounded, monotone containers record who accused whom and the
//! evidence exchanged in defence. Each co-locates its mutex with a single
//! `Collecting | Finished` state enum rather than a separate atomic flag, so
//! `is_finished` can never observe `Finished` while the collecting map is
//! still being mutated.

use crate::cabinet::{Address, Cabinet, CabinetIndex};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Collecting,
    Finished,
}

/// Tracks phase-1 complaints: who accused whom.
pub struct ComplaintsManager {
    inner: Mutex<ComplaintsInner>,
}

struct ComplaintsInner {
    state: State,
    received_from: HashSet<CabinetIndex>,
    accusations: BTreeMap<Address, BTreeSet<CabinetIndex>>,
    complaints: BTreeSet<Address>,
}

impl ComplaintsManager {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(ComplaintsInner {
                state: State::Collecting,
                received_from: HashSet::new(),
                accusations: BTreeMap::new(),
                complaints: BTreeSet::new(),
            }),
        }
    }

    pub fn reset(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.state = State::Collecting;
        inner.received_from.clear();
        inner.accusations.clear();
        inner.complaints.clear();
    }

    /// Records that `sender` accused every address in `accused`. A second
    /// submission from the same sender is silently discarded.
    pub fn add_complaints_from(&self, sender: CabinetIndex, accused: BTreeSet<Address>) {
        let mut inner = self.inner.lock().unwrap();
        if inner.state == State::Finished || inner.received_from.contains(&sender) {
            tracing::warn!(sender, "duplicate or late complaint submission, discarding");
            return;
        }
        inner.received_from.insert(sender);
        for addr in accused {
            inner.accusations.entry(addr).or_default().insert(sender);
        }
    }

    pub fn num_received(&self, cabinet: &Cabinet) -> usize {
        let inner = self.inner.lock().unwrap();
        inner
            .received_from
            .iter()
            .filter(|i| cabinet.address_of(**i).is_some())
            .count()
    }

    pub fn is_finished(&self, cabinet: &Cabinet) -> bool {
        self.num_received(cabinet) >= cabinet.len().saturating_sub(1)
    }

    /// Fills `complaints` with members who sent nothing, and with any accused
    /// address that drew `≥ threshold` accusers.
    pub fn finish(&self, cabinet: &Cabinet, self_index: CabinetIndex, threshold: usize) -> BTreeSet<Address> {
        let mut inner = self.inner.lock().unwrap();
        for i in cabinet.indices() {
            if i != self_index && !inner.received_from.contains(&i) {
                if let Some(addr) = cabinet.address_of(i) {
                    inner.complaints.insert(addr.clone());
                }
            }
        }
        for (accused, accusers) in &inner.accusations {
            if accusers.len() >= threshold {
                inner.complaints.insert(accused.clone());
            }
        }
        inner.state = State::Finished;
        inner.complaints.clone()
    }

    /// Accusations raised against `address`, used to drive a complaint answer.
    pub fn accusers_of(&self, address: &Address) -> BTreeSet<CabinetIndex> {
        let inner = self.inner.lock().unwrap();
        inner.accusations.get(address).cloned().unwrap_or_default()
    }
}

impl Default for ComplaintsManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Tracks phase-1 complaint answers: for each answerer, the exposed shares
/// that answer each accusation raised against it.
pub struct ComplaintAnswersManager {
    inner: Mutex<AnswersInner>,
}

struct AnswersInner {
    state: State,
    received_from: HashSet<CabinetIndex>,
    answers: BTreeMap<Address, BTreeMap<Address, (String, String)>>,
    complaints: BTreeSet<Address>,
}

impl ComplaintAnswersManager {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(AnswersInner {
                state: State::Collecting,
                received_from: HashSet::new(),
                answers: BTreeMap::new(),
                complaints: BTreeSet::new(),
            }),
        }
    }

    pub fn reset(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.state = State::Collecting;
        inner.received_from.clear();
        inner.answers.clear();
        inner.complaints.clear();
    }

    /// Seeds the expected-answerer set with everyone accused in phase 1, so
    /// `finish` can tell a missing answer from one not yet expected.
    pub fn init(&self, accused: BTreeSet<Address>) {
        let mut inner = self.inner.lock().unwrap();
        inner.complaints = accused;
    }

    pub fn add_answer_from(&self, answerer: CabinetIndex, address: Address, accuser: Address, share: (String, String)) {
        let mut inner = self.inner.lock().unwrap();
        if inner.state == State::Finished || inner.received_from.contains(&answerer) {
            tracing::warn!(sender = answerer, "duplicate or late complaint answer, discarding");
            return;
        }
        inner.received_from.insert(answerer);
        inner.answers.entry(address).or_default().insert(accuser, share);
    }

    pub fn is_finished(&self, cabinet: &Cabinet) -> bool {
        let inner = self.inner.lock().unwrap();
        let expected: BTreeSet<CabinetIndex> = inner
            .complaints
            .iter()
            .filter_map(|addr| cabinet.index_of(addr))
            .collect();
        expected.is_subset(&inner.received_from)
    }

    /// `complaints` grown to include any accused address whose answer never
    /// arrived; `build_qual` still needs to be called afterwards with the
    /// caller's own verification of each arrived answer folded in via
    /// [`Self::mark_failed`].
    pub fn finish(&self) -> BTreeSet<Address> {
        let mut inner = self.inner.lock().unwrap();
        inner.state = State::Finished;
        inner.complaints.clone()
    }

    pub fn mark_failed(&self, address: Address) {
        let mut inner = self.inner.lock().unwrap();
        inner.complaints.insert(address);
    }

    pub fn answers_for(&self, address: &Address) -> BTreeMap<Address, (String, String)> {
        let inner = self.inner.lock().unwrap();
        inner.answers.get(address).cloned().unwrap_or_default()
    }

    pub fn build_qual(&self, cabinet: &Cabinet) -> Vec<Address> {
        let inner = self.inner.lock().unwrap();
        cabinet
            .iter()
            .filter(|addr| !inner.complaints.contains(*addr))
            .cloned()
            .collect()
    }
}

impl Default for ComplaintAnswersManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Tracks phase-2 qual-complaints: who in QUAL accused whom, with evidence.
pub struct QualComplaintsManager {
    inner: Mutex<QualInner>,
}

struct QualInner {
    state: State,
    received_from: HashSet<CabinetIndex>,
    raised_pairs: HashSet<(CabinetIndex, CabinetIndex)>,
    raised: Vec<(CabinetIndex, CabinetIndex, (String, String))>,
    complaints: BTreeSet<Address>,
}

impl QualComplaintsManager {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(QualInner {
                state: State::Collecting,
                received_from: HashSet::new(),
                raised_pairs: HashSet::new(),
                raised: Vec::new(),
                complaints: BTreeSet::new(),
            }),
        }
    }

    pub fn reset(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.state = State::Collecting;
        inner.received_from.clear();
        inner.raised_pairs.clear();
        inner.raised.clear();
        inner.complaints.clear();
    }

    /// Marks `sender` as heard-from for this round, independent of whether it
    /// reports any complaints at all. An honest sender with nothing to
    /// report still has to call this, or `is_finished` never sees it.
    pub fn note_received(&self, sender: CabinetIndex, qual: &[CabinetIndex]) {
        let mut inner = self.inner.lock().unwrap();
        if !qual.contains(&sender) || inner.state == State::Finished {
            return;
        }
        inner.received_from.insert(sender);
    }

    /// Only members of `qual` may contribute; a broadcast that happened to
    /// arrive from someone outside `qual` is silently dropped, not recorded.
    /// A sender may legitimately accuse more than one victim; duplicates are
    /// only suppressed per `(sender, victim)` pair, not per sender.
    pub fn add_complaint_from(&self, sender: CabinetIndex, qual: &[CabinetIndex], victim: CabinetIndex, share: (String, String)) {
        let mut inner = self.inner.lock().unwrap();
        if !qual.contains(&sender) {
            return;
        }
        if inner.state == State::Finished {
            tracing::warn!(sender, "late qual-complaint, discarding");
            return;
        }
        inner.received_from.insert(sender);
        if !inner.raised_pairs.insert((sender, victim)) {
            tracing::warn!(sender, victim, "duplicate qual-complaint against the same victim, discarding");
            return;
        }
        inner.raised.push((sender, victim, share));
    }

    pub fn is_finished(&self, qual: &[CabinetIndex], self_index: CabinetIndex) -> bool {
        let inner = self.inner.lock().unwrap();
        qual.iter().all(|i| *i == self_index || inner.received_from.contains(i))
    }

    pub fn raised(&self) -> Vec<(CabinetIndex, CabinetIndex, (String, String))> {
        let inner = self.inner.lock().unwrap();
        inner.raised.clone()
    }

    /// Folds culpability decisions (from `BeaconManager::verify_qual_complaint`)
    /// into the final `complaints` set and freezes the container.
    pub fn finish(&self, culprits: impl IntoIterator<Item = CabinetIndex>, cabinet: &Cabinet) -> BTreeSet<Address> {
        let mut inner = self.inner.lock().unwrap();
        for i in culprits {
            if let Some(addr) = cabinet.address_of(i) {
                inner.complaints.insert(addr.clone());
            }
        }
        inner.state = State::Finished;
        inner.complaints.clone()
    }
}

impl Default for QualComplaintsManager {
    fn default() -> Self {
        Self::new()
    }
}
