//! # Herald Core
//!
//! Shared foundation for the Herald broadcast backend: the error type,
//! configuration, the formatting-span adapter, the audience model, and the
//! collaborator traits (transport, audience resolver, id generator) that the
//! broadcast and workflow crates are written against.

pub mod audience;
pub mod config;
pub mod error;
pub mod ids;
pub mod spans;
pub mod traits;
pub mod types;

pub use audience::InMemoryAudience;
pub use config::HeraldConfig;
pub use error::{HeraldError, Result};
pub use ids::HexIdGenerator;
pub use spans::{utf16_len, FormattingSpan, SpanKind};
pub use traits::{AudienceResolver, IdGenerator, Transport};
pub use types::{AudienceFilter, Button, Keyboard, Recipient};
