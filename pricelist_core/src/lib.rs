//! # pricelist_core - Materials Price List Engine
//!
//! `pricelist_core` keeps a price list of air-conditioning materials in sync
//! with a remote document collection. Each material carries a real
//! (acquisition) price, a markup and a profit margin; the markup price, final
//! price and profit are always derived, never stored.
//!
//! ## Design Philosophy
//!
//! - **Snapshot-driven**: the remote store delivers the whole collection on
//!   every change, and the in-memory store is replaced wholesale
//! - **Degrades, never dies**: a broken remote watch switches the session to
//!   local storage; failed commands are reported and the session carries on
//! - **Exact money**: prices and percentages are `Decimal`
//! - **JSON-First**: materials, settings and exports serialize with the same
//!   camelCase shape the browser front-end uses
//!
//! ## Quick Start
//!
//! ```rust
//! use pricelist_core::material::{Material, MaterialDraft, MaterialId};
//! use pricelist_core::pricing::compute;
//! use rust_decimal::Decimal;
//!
//! let draft = MaterialDraft::new(
//!     "Pipa Tembaga 1/2\"",
//!     "meter",
//!     Decimal::from(85000),
//!     Decimal::from(25),
//!     Decimal::from(15),
//! );
//! let material = Material::from_draft(MaterialId::new("m1"), &draft);
//!
//! let prices = compute(&material);
//! assert_eq!(prices.final_price, Decimal::new(1221875, 1));
//! ```
//!
//! ## Modules
//!
//! - [`material`] - Material records, ids, drafts and field updates
//! - [`pricing`] - Derived prices and collection totals
//! - [`store`] - The in-memory collection and its change events
//! - [`remote`] - Remote sync adapters (in-memory, Firestore)
//! - [`local`] - Local fallback storage with atomic writes and locking
//! - [`presentation`] - Dashboard view model and currency formatting
//! - [`transfer`] - Export and import documents
//! - [`app`] - Command handlers on a session context
//! - [`errors`] - Structured error types

pub mod app;
pub mod errors;
pub mod local;
pub mod material;
pub mod numeric;
pub mod presentation;
pub mod pricing;
pub mod remote;
pub mod schema;
pub mod settings;
pub mod store;
pub mod transfer;
pub mod validation;

// Re-export commonly used types at crate root for convenience
pub use app::{AddOutcome, BulkOutcome, Confirm, PriceListApp, SyncMode};
pub use errors::{PriceError, PriceResult};
pub use material::{Material, MaterialDraft, MaterialId};
pub use settings::PricingSettings;
pub use store::MaterialStore;
