//! Services over the relational store.
//!
//! - [`patients`]: registration and admission-number issuance
//! - [`appointments`]: same-day booking and the token queue
//! - [`ward`]: inpatient admissions, outpatient visits and the counts they yield

pub mod appointments;
pub mod patients;
pub mod ward;
