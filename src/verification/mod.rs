//! Reconciliation of committed transfer roots against root-chain settlement.

mod reconciler;
mod report;

pub use reconciler::ReconciliationVerifier;
pub use report::VerificationReport;
