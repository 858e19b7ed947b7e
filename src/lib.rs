//! Back-office building blocks for a yacht charter business: booking calendar
//! layout, bank statement reconciliation and revenue recognition, plus the
//! local tenant store and configuration the `charterdesk` CLI runs on.

pub mod calendar;
pub mod config;
pub mod db;
pub mod domain;
pub mod error;
pub mod reconcile;
pub mod revenue;
