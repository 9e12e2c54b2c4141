//! Sokoni Commerce
//!
//! Self-hosted storefront checkout service. The catalog, cart, and admin
//! surfaces are thin CRUD; this crate carries the one subsystem with real
//! failure semantics: the M-Pesa payment session lifecycle. A pending
//! order is created first, an STK push is initiated against the gateway,
//! and the gateway's asynchronous callback is reconciled idempotently.

pub mod callback;
pub mod checkout;
pub mod config;
pub mod domain;
pub mod error;
pub mod events;
pub mod gateway;
pub mod ledger;

pub use callback::{CallbackReconciler, ReconcileOutcome};
pub use checkout::{CheckoutPolicy, CheckoutReceipt, CheckoutRequest, PaymentInitiator};
pub use error::CommerceError;
