//! Design proofs, embedded in their order.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::value_objects::text_enum;

text_enum! {
    /// `pending -> sent -> approved | changes_requested`, and
    /// `changes_requested -> pending` after a replacement upload.
    ProofState {
        Pending => "pending",
        Sent => "sent",
        Approved => "approved",
        ChangesRequested => "changes_requested",
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Proof {
    pub id: Uuid,
    pub proof_url: String,
    pub status: ProofState,
    pub notes: Option<String>,
    pub customer_notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub sent_at: Option<DateTime<Utc>>,
    pub responded_at: Option<DateTime<Utc>>,
}

impl Proof {
    pub fn new(proof_url: impl Into<String>, notes: Option<String>) -> Self {
        Self {
            id: Uuid::now_v7(), proof_url: proof_url.into(), status: ProofState::Pending, notes,
            customer_notes: None, created_at: Utc::now(), sent_at: None, responded_at: None,
        }
    }

    pub fn send(&mut self) -> Result<(), ProofError> {
        self.expect(ProofState::Pending, "send")?;
        self.status = ProofState::Sent;
        self.sent_at = Some(Utc::now());
        Ok(())
    }

    pub fn approve(&mut self) -> Result<(), ProofError> {
        self.expect(ProofState::Sent, "approve")?;
        self.status = ProofState::Approved;
        self.responded_at = Some(Utc::now());
        Ok(())
    }

    pub fn request_changes(&mut self, customer_notes: Option<String>) -> Result<(), ProofError> {
        self.expect(ProofState::Sent, "request changes on")?;
        self.status = ProofState::ChangesRequested;
        self.customer_notes = customer_notes;
        self.responded_at = Some(Utc::now());
        Ok(())
    }

    /// Swaps in a revised design; the proof goes back to pending.
    pub fn replace(&mut self, proof_url: impl Into<String>) -> Result<(), ProofError> {
        self.expect(ProofState::ChangesRequested, "replace")?;
        self.proof_url = proof_url.into();
        self.status = ProofState::Pending;
        self.sent_at = None;
        self.responded_at = None;
        Ok(())
    }

    fn expect(&self, state: ProofState, action: &'static str) -> Result<(), ProofError> {
        if self.status == state { Ok(()) } else { Err(ProofError::InvalidTransition { from: self.status, action }) }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)] pub enum ProofError { NotFound(Uuid), InvalidTransition { from: ProofState, action: &'static str } }
impl std::error::Error for ProofError {}
impl std::fmt::Display for ProofError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound(id) => write!(f, "Proof {} not found", id),
            Self::InvalidTransition { from, action } => write!(f, "Cannot {} a proof that is {}", action, from),
        }
    }
}

impl From<ProofError> for crate::ServiceError {
    fn from(err: ProofError) -> Self {
        match err {
            ProofError::NotFound(id) => crate::ServiceError::NotFound(format!("proof {id}")),
            other => crate::ServiceError::ValidationFailed(other.to_string()),
        }
    }
}
