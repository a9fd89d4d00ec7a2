//! Connection byte plumbing
//!
//! `Lookahead` lets detection stages peek and hand over bytes; `ByteSource`
//! is what the framing stage reads once TLS has or has not been negotiated.

mod lookahead;
mod stream;

pub use lookahead::Lookahead;
pub use stream::ByteSource;
