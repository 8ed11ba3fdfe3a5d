//! Shared storage integration tests.
//!
//! Tests the ReferralStore interface against every backend. Each backend
//! test binary imports these functions and runs them via the macro.

pub mod referral_store_tests;
