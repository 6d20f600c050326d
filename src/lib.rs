//! # TraceSweep
//!
//! A safe, reversible engine for removing what software leaves behind.
//!
//! TraceSweep discovers leftover resources through pluggable drivers and
//! removes them under a strict per-item pipeline:
//!
//! - **Driver Contract**: one `ResourceDriver` per resource kind (files, services,
//!   scheduled tasks, kernel module configs, network profiles, preferences, startup items)
//! - **Protected Items**: critical system resources are skipped unless forced
//! - **Write-Ahead Backups**: every item is captured to a backup session before it is destroyed
//! - **Restore**: replay any session, sealed or interrupted
//! - **Run Control**: cancel and pause at item boundaries, sequential or parallel runs
//! - **Run Modes**: full sweep, single kind, application sweep, scan only

pub mod backup;
pub mod cli;
pub mod common;
pub mod drivers;
pub mod engine;
