//! `fr-client`: consumer side of the FieldRep turn stream.
//!
//! A [`ChatSession`] owns the message view of one conversation.  Each
//! [`ChatSession::send`] appends the user's bubble, posts the turn through
//! a [`TurnTransport`], decodes the SSE body with [`SseDecoder`] and folds
//! every [`WireEvent`](fr_domain::wire::WireEvent) into the view.  Only one
//! turn is in flight per session: sending again aborts the previous one.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use fr_client::{ChatSession, ReqwestTransport};
//!
//! # async fn example() -> Result<(), fr_client::ClientError> {
//! let transport = ReqwestTransport::new("http://127.0.0.1:3210", Some("tok".into()))?;
//! let session = ChatSession::new(Arc::new(transport), Duration::from_secs(120));
//! let outcome = session.send("thread_1", "asst_1", "What is the torque spec?").await;
//! println!("{outcome:?}: {:?}", session.snapshot().messages.last());
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod session;
pub mod sse;
pub mod transport;
pub mod view;

pub use error::ClientError;
pub use session::{ChatSession, TurnOutcome};
pub use sse::SseDecoder;
pub use transport::{ReqwestTransport, TurnPayload, TurnResponse, TurnTransport};
pub use view::{ChatMessage, ChatView, Role};
