// Reconciled auction state: the view state machine and its projections.

pub mod ledger;
pub mod view;
