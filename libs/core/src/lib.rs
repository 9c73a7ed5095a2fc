//! Webhook event model for the CVI gateway.
//!
//! Raw provider deliveries are normalized into [`WebhookEnvelope`] values whose
//! event kinds come from one [`EventTaxonomy`] table, persisted through an
//! [`EventSink`], and fanned out as typed [`AnalyticsRecord`]s.
pub mod dispatch;
pub mod normalize;
pub mod sink;
pub mod taxonomy;
pub mod types;

pub use dispatch::*;
pub use normalize::*;
pub use sink::*;
pub use taxonomy::*;
pub use types::*;
