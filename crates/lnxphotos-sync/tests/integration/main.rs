//! Integration tests for lnxphotos-sync
//!
//! Runs the reconciliation engine and deletion planner against an
//! in-memory fake photo service and tempfile output trees, covering the
//! end-to-end scenarios: basic download with mtime provenance, duplicate
//! naming, live photo naming, until-found termination, filter-aware remote
//! deletion, resume after interruption, and idempotent re-runs.

mod common;

mod test_deletion;
mod test_naming;
mod test_reconcile;
mod test_resume;
