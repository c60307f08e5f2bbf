//! The DKG setup service (C5) — the round-level state machine.
//!
//! The original couples the service, the engine and the complaint managers
//! through a graph of shared pointers, with a callback closure that
//! re-enters the service. Here the service owns the engine and the
//! complaint managers by value, and the two external collaborators
//! (broadcast, point-to-point send) are ordinary function-object parameters
//! supplied at construction — no cycles, no re-entrant callback.

use crate::cabinet::{Address, Cabinet, CabinetIndex};
use crate::complaints::{ComplaintAnswersManager, ComplaintsManager, QualComplaintsManager};
use crate::envelope::{DKGEnvelope, Phase};
use crate::error::DKGError;
use crate::init::Generators;
use crate::manager::{BeaconManager, DkgOutput, DkgStatus};
use std::collections::{BTreeSet, HashSet};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DkgState {
    Initial,
    WaitShares,
    WaitComplaints,
    WaitComplaintAnswers,
    WaitQualShares,
    WaitQualComplaints,
    WaitReconstructionShares,
    Final(DkgStatus),
}

pub struct DkgSetupService<B, P>
where
    B: FnMut(DKGEnvelope),
    P: FnMut(&Address, DKGEnvelope),
{
    cabinet: Cabinet,
    threshold: usize,
    self_address: Address,

    engine: BeaconManager,
    complaints: ComplaintsManager,
    complaint_answers: ComplaintAnswersManager,
    qual_complaints: QualComplaintsManager,

    state: DkgState,

    coeff_received: HashSet<CabinetIndex>,
    share_received: HashSet<CabinetIndex>,
    qual_indices: Vec<CabinetIndex>,
    qual_coeff_received: HashSet<CabinetIndex>,
    excluded_from_qual: Vec<CabinetIndex>,
    reconstruction_received: HashSet<CabinetIndex>,
    expected_reconstruction_contributors: usize,

    broadcast: B,
    send_private: P,
}

impl<B, P> DkgSetupService<B, P>
where
    B: FnMut(DKGEnvelope),
    P: FnMut(&Address, DKGEnvelope),
{
    pub fn new(
        members: Vec<Address>,
        threshold: usize,
        self_address: Address,
        generators: Generators,
        broadcast: B,
        send_private: P,
    ) -> Self {
        let mut engine = BeaconManager::new(generators);
        engine.reset_cabinet(members.clone(), threshold, &self_address);
        let cabinet = Cabinet::new(members);
        Self {
            cabinet,
            threshold,
            self_address,
            engine,
            complaints: ComplaintsManager::new(),
            complaint_answers: ComplaintAnswersManager::new(),
            qual_complaints: QualComplaintsManager::new(),
            state: DkgState::Initial,
            coeff_received: HashSet::new(),
            share_received: HashSet::new(),
            qual_indices: Vec::new(),
            qual_coeff_received: HashSet::new(),
            excluded_from_qual: Vec::new(),
            reconstruction_received: HashSet::new(),
            expected_reconstruction_contributors: 0,
            broadcast,
            send_private,
        }
    }

    pub fn state(&self) -> DkgState {
        self.state
    }

    pub fn finished(&self) -> bool {
        matches!(self.state, DkgState::Final(_))
    }

    pub fn get_dkg_output(&self) -> DkgOutput {
        self.engine.get_dkg_output()
    }

    pub fn engine(&self) -> &BeaconManager {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut BeaconManager {
        &mut self.engine
    }

    fn self_index(&self) -> CabinetIndex {
        self.engine.cabinet_index()
    }

    fn address_of(&self, i: CabinetIndex) -> Address {
        self.cabinet
            .address_of(i)
            .expect("index must resolve within the current cabinet")
            .clone()
    }

    /// Picks random polynomials, broadcasts `Coefficients`, privately sends
    /// `Shares` to every other member, and enters `WaitShares`.
    #[tracing::instrument(skip(self))]
    pub fn start(&mut self) {
        if self.state != DkgState::Initial {
            warn!("start() called outside Initial state, ignoring");
            return;
        }
        self.engine.generate_coefficients();
        let coeffs = self.engine.get_coefficients();
        (self.broadcast)(DKGEnvelope::Coefficients {
            phase: Phase::WaitShares,
            coeffs,
        });
        for j in self.cabinet.indices() {
            if j == self.self_index() {
                continue;
            }
            let (s, sp) = self.engine.get_own_shares(j);
            let addr = self.address_of(j);
            (self.send_private)(
                &addr,
                DKGEnvelope::Shares {
                    phase: Phase::WaitShares,
                    share: (s, sp),
                },
            );
        }
        self.coeff_received.insert(self.self_index());
        self.share_received.insert(self.self_index());
        self.state = DkgState::WaitShares;
        info!("entered WaitShares");
    }

    /// Dispatches one inbound envelope. Drops anything from a sender outside
    /// the cabinet, anything already processed for this `(sender, round)`,
    /// and anything whose phase tag does not match the current state —
    /// logged, never fatal for a single peer's misbehaviour.
    pub fn handle_envelope(&mut self, from: CabinetIndex, envelope: DKGEnvelope) {
        if self.cabinet.address_of(from).is_none() {
            warn!(from, "envelope from unknown sender, dropping");
            return;
        }
        match envelope {
            DKGEnvelope::Coefficients { phase, coeffs } => self.on_coefficients(from, phase, coeffs),
            DKGEnvelope::Shares { phase, share } => self.on_shares(from, phase, share),
            DKGEnvelope::Complaints { accused } => self.on_complaints(from, accused),
            DKGEnvelope::ComplaintAnswer { accuser, share } => self.on_complaint_answer(from, accuser, share),
            DKGEnvelope::QualComplaints { complaints } => self.on_qual_complaints(from, complaints),
            DKGEnvelope::Reconstruction { owner, share } => self.on_reconstruction(from, owner, share),
            DKGEnvelope::NotarisationKey { .. } | DKGEnvelope::FinalState { .. } => {
                debug!(from, "envelope type not part of the DKG round structure, ignoring");
            }
        }
    }

    fn on_coefficients(&mut self, from: CabinetIndex, phase: Phase, coeffs: Vec<String>) {
        match (self.state, phase) {
            (DkgState::WaitShares, Phase::WaitShares) => {
                if self.coeff_received.contains(&from) {
                    warn!(from, "duplicate coefficients, dropping");
                    return;
                }
                match self.engine.add_coefficients(from, &coeffs) {
                    Ok(()) => {
                        self.coeff_received.insert(from);
                        self.maybe_finish_wait_shares();
                    }
                    Err(e) => warn!(from, error = %e, "rejecting coefficients"),
                }
            }
            (DkgState::WaitQualShares, Phase::WaitQualShares) => {
                if !self.qual_indices.contains(&from) || self.qual_coeff_received.contains(&from) {
                    warn!(from, "qual-coefficients from non-QUAL or duplicate sender, dropping");
                    return;
                }
                match self.engine.add_qual_coefficients(from, &coeffs) {
                    Ok(()) => {
                        self.qual_coeff_received.insert(from);
                        self.maybe_finish_wait_qual_shares();
                    }
                    Err(e) => warn!(from, error = %e, "rejecting qual-coefficients"),
                }
            }
            _ => debug!(from, "coefficients envelope outside its expected round, dropping"),
        }
    }

    fn on_shares(&mut self, from: CabinetIndex, phase: Phase, share: (String, String)) {
        if self.state != DkgState::WaitShares || phase != Phase::WaitShares {
            debug!(from, "share envelope outside its expected round, dropping");
            return;
        }
        if self.share_received.contains(&from) {
            warn!(from, "duplicate share, dropping");
            return;
        }
        match self.engine.add_shares(from, (&share.0, &share.1)) {
            Ok(()) => {
                self.share_received.insert(from);
                self.maybe_finish_wait_shares();
            }
            Err(e) => warn!(from, error = %e, "rejecting private share"),
        }
    }

    fn maybe_finish_wait_shares(&mut self) {
        let n = self.cabinet.len();
        if self.state == DkgState::WaitShares && self.coeff_received.len() == n && self.share_received.len() == n {
            self.enter_wait_complaints();
        }
    }

    #[tracing::instrument(skip(self))]
    fn enter_wait_complaints(&mut self) {
        let accused_indices = self.engine.compute_complaints();
        let accused: BTreeSet<Address> = accused_indices.iter().map(|&i| self.address_of(i)).collect();
        self.complaints.add_complaints_from(self.self_index(), accused.clone());
        (self.broadcast)(DKGEnvelope::Complaints { accused });
        self.state = DkgState::WaitComplaints;
        info!("entered WaitComplaints");
        self.maybe_finish_wait_complaints();
    }

    fn on_complaints(&mut self, from: CabinetIndex, accused: BTreeSet<Address>) {
        if self.state != DkgState::WaitComplaints {
            debug!(from, "complaint envelope outside its expected round, dropping");
            return;
        }
        self.complaints.add_complaints_from(from, accused);
        self.maybe_finish_wait_complaints();
    }

    fn maybe_finish_wait_complaints(&mut self) {
        if self.state == DkgState::WaitComplaints && self.complaints.is_finished(&self.cabinet) {
            self.enter_wait_complaint_answers();
        }
    }

    #[tracing::instrument(skip(self))]
    fn enter_wait_complaint_answers(&mut self) {
        let complaints_set = self.complaints.finish(&self.cabinet, self.self_index(), self.threshold);
        self.complaint_answers.init(complaints_set.clone());

        let accusers_of_self = self.complaints.accusers_of(&self.self_address);
        for accuser_idx in &accusers_of_self {
            let accuser_addr = self.address_of(*accuser_idx);
            let (s, sp) = self.engine.get_own_shares(*accuser_idx);
            (self.broadcast)(DKGEnvelope::ComplaintAnswer {
                accuser: accuser_addr.clone(),
                share: (s.clone(), sp.clone()),
            });
            if complaints_set.contains(&self.self_address) {
                self.complaint_answers
                    .add_answer_from(self.self_index(), self.self_address.clone(), accuser_addr, (s, sp));
            }
        }
        self.state = DkgState::WaitComplaintAnswers;
        info!(accused_count = complaints_set.len(), "entered WaitComplaintAnswers");
        self.maybe_finish_wait_complaint_answers();
    }

    fn on_complaint_answer(&mut self, from: CabinetIndex, accuser: Address, share: (String, String)) {
        if self.state != DkgState::WaitComplaintAnswers {
            debug!(from, "complaint answer outside its expected round, dropping");
            return;
        }
        let answerer_addr = self.address_of(from);
        let accuser_idx = match self.cabinet.index_of(&accuser) {
            Some(i) => i,
            None => {
                warn!(from, "complaint answer names an unknown accuser, dropping");
                return;
            }
        };
        match self.engine.verify_complaint_answer(from, accuser_idx, (&share.0, &share.1)) {
            Ok(true) => {}
            Ok(false) => {
                warn!(from, "complaint answer failed verification");
                self.complaint_answers.mark_failed(answerer_addr.clone());
            }
            Err(e) => {
                warn!(from, error = %e, "complaint answer failed to decode");
                self.complaint_answers.mark_failed(answerer_addr.clone());
            }
        }
        self.complaint_answers.add_answer_from(from, answerer_addr, accuser, share);
        self.maybe_finish_wait_complaint_answers();
    }

    fn maybe_finish_wait_complaint_answers(&mut self) {
        if self.state == DkgState::WaitComplaintAnswers && self.complaint_answers.is_finished(&self.cabinet) {
            self.enter_wait_qual_shares_or_fail();
        }
    }

    #[tracing::instrument(skip(self))]
    fn enter_wait_qual_shares_or_fail(&mut self) {
        let _ = self.complaint_answers.finish();
        let qual_addrs = self.complaint_answers.build_qual(&self.cabinet);
        self.qual_indices = qual_addrs.iter().filter_map(|a| self.cabinet.index_of(a)).collect();

        let self_in_qual = qual_addrs.contains(&self.self_address);
        if self_in_qual && qual_addrs.len() > self.threshold {
            self.engine.compute_secret_share(&self.qual_indices);
            let qual_coeffs = self.engine.get_qual_coefficients();
            (self.broadcast)(DKGEnvelope::Coefficients {
                phase: Phase::WaitQualShares,
                coeffs: qual_coeffs,
            });
            self.qual_coeff_received.insert(self.self_index());
            self.state = DkgState::WaitQualShares;
            info!(qual_size = self.qual_indices.len(), "entered WaitQualShares");
            self.maybe_finish_wait_qual_shares();
        } else {
            let status = if !self_in_qual {
                DkgStatus::FailedNotInQual
            } else {
                DkgStatus::FailedQualTooSmall
            };
            warn!(?status, "DKG round failed leaving WaitComplaintAnswers");
            self.state = DkgState::Final(status);
        }
    }

    fn maybe_finish_wait_qual_shares(&mut self) {
        if self.state == DkgState::WaitQualShares && self.qual_indices.iter().all(|i| self.qual_coeff_received.contains(i)) {
            self.enter_wait_qual_complaints();
        }
    }

    #[tracing::instrument(skip(self))]
    fn enter_wait_qual_complaints(&mut self) {
        let raised = self.engine.compute_qual_complaints(&self.qual_indices);
        let complaints_map: std::collections::BTreeMap<Address, (String, String)> = raised
            .iter()
            .map(|(i, share)| (self.address_of(*i), share.clone()))
            .collect();
        (self.broadcast)(DKGEnvelope::QualComplaints {
            complaints: complaints_map,
        });
        self.qual_complaints.note_received(self.self_index(), &self.qual_indices);
        for (victim_idx, share) in &raised {
            self.qual_complaints
                .add_complaint_from(self.self_index(), &self.qual_indices, *victim_idx, share.clone());
        }
        self.state = DkgState::WaitQualComplaints;
        info!("entered WaitQualComplaints");
        self.maybe_finish_wait_qual_complaints();
    }

    fn on_qual_complaints(&mut self, from: CabinetIndex, complaints: std::collections::BTreeMap<Address, (String, String)>) {
        if self.state != DkgState::WaitQualComplaints {
            debug!(from, "qual-complaint outside its expected round, dropping");
            return;
        }
        self.qual_complaints.note_received(from, &self.qual_indices);
        for (victim_addr, share) in complaints {
            if let Some(victim_idx) = self.cabinet.index_of(&victim_addr) {
                self.qual_complaints.add_complaint_from(from, &self.qual_indices, victim_idx, share);
            }
        }
        self.maybe_finish_wait_qual_complaints();
    }

    fn maybe_finish_wait_qual_complaints(&mut self) {
        if self.state == DkgState::WaitQualComplaints && self.qual_complaints.is_finished(&self.qual_indices, self.self_index()) {
            self.check_qual_complaints();
        }
    }

    #[tracing::instrument(skip(self))]
    fn check_qual_complaints(&mut self) {
        let raised = self.qual_complaints.raised();
        let mut culprits = Vec::new();
        for (from, victim, share) in raised {
            let culprit = self
                .engine
                .verify_qual_complaint(from, victim, (&share.0, &share.1))
                .unwrap_or(from);
            culprits.push(culprit);
        }
        let complaints_set = self.qual_complaints.finish(culprits, &self.cabinet);
        self.excluded_from_qual = complaints_set.iter().filter_map(|a| self.cabinet.index_of(a)).collect();

        if complaints_set.len() > self.threshold {
            warn!(count = complaints_set.len(), "too many qual-complaints upheld");
            self.state = DkgState::Final(DkgStatus::FailedQualTooSmall);
            return;
        }

        if complaints_set.contains(&self.self_address) {
            info!("self was upheld as culpable; computing group key without reconstruction");
            self.engine.compute_public_keys(&self.qual_indices);
            self.state = DkgState::Final(DkgStatus::FailedNotInQual);
            return;
        }

        if self.excluded_from_qual.is_empty() {
            self.engine.compute_public_keys(&self.qual_indices);
            info!("no qual-complaints upheld; DKG succeeded without reconstruction");
            self.state = DkgState::Final(DkgStatus::Success);
            return;
        }

        self.expected_reconstruction_contributors = self
            .qual_indices
            .iter()
            .filter(|i| !self.excluded_from_qual.contains(i) && **i != self.self_index())
            .count();
        self.reconstruction_received.clear();
        self.reconstruction_received.insert(self.self_index());

        for &victim_idx in &self.excluded_from_qual {
            if let Some(s) = self.engine.share_from(victim_idx) {
                let owner = self.address_of(victim_idx);
                let _ = self.engine.add_reconstruction_share(self.self_index(), &owner, &s.to_str());
                (self.broadcast)(DKGEnvelope::Reconstruction {
                    owner,
                    share: s.to_str(),
                });
            }
        }
        self.state = DkgState::WaitReconstructionShares;
        info!("entered WaitReconstructionShares");
        self.maybe_finish_reconstruction();
    }

    fn on_reconstruction(&mut self, from: CabinetIndex, owner: Address, share: String) {
        if self.state != DkgState::WaitReconstructionShares {
            debug!(from, "reconstruction share outside its expected round, dropping");
            return;
        }
        match self.engine.add_reconstruction_share(from, &owner, &share) {
            Ok(()) => {
                self.reconstruction_received.insert(from);
                self.maybe_finish_reconstruction();
            }
            Err(e) => warn!(from, error = %e, "rejecting reconstruction share"),
        }
    }

    fn maybe_finish_reconstruction(&mut self) {
        if self.state != DkgState::WaitReconstructionShares {
            return;
        }
        let have = self.reconstruction_received.len().saturating_sub(1);
        if have >= self.expected_reconstruction_contributors {
            self.finish_reconstruction();
        }
    }

    #[tracing::instrument(skip(self))]
    fn finish_reconstruction(&mut self) {
        match self.engine.run_reconstruction(&self.self_address) {
            Ok(()) => {
                self.engine.compute_public_keys(&self.qual_indices);
                info!("DKG succeeded");
                self.state = DkgState::Final(DkgStatus::Success);
            }
            Err(DKGError::InsufficientShares { owner, have, need }) => {
                warn!(%owner, have, need, "reconstruction had insufficient good shares");
                self.state = DkgState::Final(DkgStatus::FailedReconstruction);
            }
            Err(e) => {
                warn!(error = %e, "reconstruction failed");
                self.state = DkgState::Final(DkgStatus::FailedReconstruction);
            }
        }
    }
}
