//! Client-side orchestration for the factor/model evaluation workbench.
//!
//! The session tracks which factor is inspected and which training artifact a
//! backtest may reuse, builds the outbound train/backtest requests, interprets
//! the loosely shaped payloads that come back, and turns every metric into a
//! severity-classified badge on a render-ready view model.
//!
//! ```text
//! intent ──► workflow ──► request ──► ComputeService ──► response ──► view
//!               │            ▲                                         │
//!               └──► selection ◄───────────── record_artifact ◄────────┘
//! ```

pub mod config;
pub mod error;
pub mod format;
pub mod logging;
pub mod metric;
pub mod request;
pub mod response;
pub mod selection;
pub mod service;
pub mod severity;
pub mod view;
pub mod workflow;

pub use error::{WorkbenchError, WorkbenchResult};
pub use workflow::Workbench;
