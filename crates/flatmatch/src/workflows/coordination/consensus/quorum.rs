use std::cmp::Ordering;
use std::collections::BTreeMap;

use serde::Serialize;

use super::config::ConsensusConfig;
use crate::workflows::coordination::domain::{ResidentId, Vote, VoteChoice};

/// Running vote count for one application; always queryable for display
/// regardless of whether quorum has been reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct VoteTally {
    pub invite: usize,
    pub decline: usize,
    pub total_residents: usize,
}

impl VoteTally {
    pub fn cast(&self) -> usize {
        self.invite + self.decline
    }

    pub fn undecided(&self) -> usize {
        self.total_residents.saturating_sub(self.cast())
    }
}

/// Outcome of checking the quorum rules after a vote.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuorumOutcome {
    /// Not enough votes to lock either choice in.
    Open,
    /// Everyone voted and the split is even; only an admin override
    /// resolves the thread.
    Deadlocked,
    Decided(VoteChoice),
}

/// Count votes against the household roster. The vote map holds at most
/// one entry per resident, so the tally never double-counts.
pub fn tally_votes(votes: &BTreeMap<ResidentId, Vote>, total_residents: usize) -> VoteTally {
    let invite = votes
        .values()
        .filter(|vote| vote.choice == VoteChoice::Invite)
        .count();
    let decline = votes.len() - invite;
    VoteTally {
        invite,
        decline,
        total_residents,
    }
}

/// Check the participation rule and the majority lock; whichever fires
/// first finalizes the decision.
///
/// The majority lock fires when the leading choice holds a configured
/// majority and the trailing choice cannot catch up even if every
/// undecided resident joined it.
pub fn evaluate(tally: &VoteTally, config: &ConsensusConfig) -> QuorumOutcome {
    if tally.total_residents == 0 {
        return QuorumOutcome::Open;
    }

    if tally.undecided() == 0 {
        return match tally.invite.cmp(&tally.decline) {
            Ordering::Greater => QuorumOutcome::Decided(VoteChoice::Invite),
            Ordering::Less => QuorumOutcome::Decided(VoteChoice::Decline),
            Ordering::Equal => QuorumOutcome::Deadlocked,
        };
    }

    let (leader, lead, trail) = if tally.invite >= tally.decline {
        (VoteChoice::Invite, tally.invite, tally.decline)
    } else {
        (VoteChoice::Decline, tally.decline, tally.invite)
    };

    let needed = config.majority_needed(tally.total_residents);
    if lead >= needed && trail + tally.undecided() < lead {
        QuorumOutcome::Decided(leader)
    } else {
        QuorumOutcome::Open
    }
}
