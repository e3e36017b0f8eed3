//! Fast path scenarios driven through recording collaborators
//!
//! Run with: cargo test --test fastpath

mod harness;

mod eligibility;
mod forwarding;
