//! Core library for qrops
//!
//! This crate implements the **Functional Core** of the qrops toolkit,
//! following the Functional Core - Imperative Shell architectural pattern.
//!
//! # Architecture Overview
//!
//! The qrops project uses a two-crate architecture to enforce separation of
//! concerns:
//!
//! - **`qrops_core`** (this crate): domain models, file formats, and pure
//!   transformation functions with no network I/O
//! - **`qrops`**: HTTP operations and orchestration (the Imperative Shell)
//!
//! All network-facing decisions the migration pipeline has to make (which
//! domain id a short URL maps to, which records belong in the extract, what
//! may be deleted, how a design payload is normalized) are expressed here as
//! functions over plain data, so they can be tested with fixture data and no
//! mocking.
//!
//! # Module Organization
//!
//! - [`codes`]: vendor API response models, extract records, and report files
//! - [`csv`]: the minimal quoted-CSV reader/writer shared by the file formats
//! - [`design`]: design customization documents and cross-account
//!   normalization
//! - [`domain`]: short-URL host to domain-id resolution
//! - [`ledger`]: the durable source-id → target-id mapping ledger

pub mod codes;
pub mod csv;
pub mod design;
pub mod domain;
pub mod ledger;
