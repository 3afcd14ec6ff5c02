//! Campaign result aggregation.

use serde::{Deserialize, Serialize};

/// Outcome of one recipient's delivery attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Sent,
    Failed,
}

/// One entry per recipient, in dispatch order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryDetail {
    pub phone: String,
    pub name: String,
    pub status: DeliveryStatus,
    /// Only present when the send raised an error rather than returning `false`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Aggregated result of one campaign run.
///
/// Counters only move through [`record_success`](Self::record_success) and
/// [`record_failure`](Self::record_failure), so they always agree with
/// `details`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CampaignReport {
    sent: usize,
    failed: usize,
    total: usize,
    details: Vec<DeliveryDetail>,
}

impl CampaignReport {
    /// Create an empty report for a campaign of `total` recipients.
    pub(crate) fn new(total: usize) -> Self {
        Self {
            sent: 0,
            failed: 0,
            total,
            details: Vec::with_capacity(total),
        }
    }

    pub(crate) fn record_success(&mut self, phone: &str, name: &str) {
        self.sent += 1;
        self.details.push(DeliveryDetail {
            phone: phone.to_string(),
            name: name.to_string(),
            status: DeliveryStatus::Sent,
            error: None,
        });
    }

    pub(crate) fn record_failure(&mut self, phone: &str, name: &str, error: Option<String>) {
        self.failed += 1;
        self.details.push(DeliveryDetail {
            phone: phone.to_string(),
            name: name.to_string(),
            status: DeliveryStatus::Failed,
            error,
        });
    }

    pub fn sent(&self) -> usize {
        self.sent
    }

    pub fn failed(&self) -> usize {
        self.failed
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn details(&self) -> &[DeliveryDetail] {
        &self.details
    }

    /// Check the counters against `details` and `total`.
    pub fn is_consistent(&self) -> bool {
        let sent = self
            .details
            .iter()
            .filter(|d| d.status == DeliveryStatus::Sent)
            .count();
        let failed = self.details.len() - sent;

        sent == self.sent
            && failed == self.failed
            && self.sent + self.failed == self.total
            && self.details.len() == self.total
    }
}
