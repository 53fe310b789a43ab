//! Record stream controller for the insulator topic view.
//!
//! [`RecordStreamController`] runs one consumption session at a time against a
//! topic and keeps the decoded rows in a capped, filterable and sortable table.
//! The presentation layer observes it through watch channels (status, counters,
//! metadata) and a broadcast [`Subscription`] of row events.
//!
//! ```no_run
//! # async fn example(controller: insulator_record_stream::RecordStreamController) -> insulator_record_stream::Result<()> {
//! use insulator_kafka::{ConsumeFrom, DeserializationFormat};
//! use insulator_record_stream::ConsumeRequest;
//!
//! let request = ConsumeRequest::new("orders", ConsumeFrom::Beginning, DeserializationFormat::String);
//! let mut session = controller.start_consumption(request).await?;
//! controller.stop_consumption().await;
//! session.finished().await;
//! # Ok(())
//! # }
//! ```

pub mod confirm;
pub mod controller;
pub mod error;
pub mod events;
pub mod session;
pub mod store;

pub use confirm::{ConfirmAction, DeleteOutcome};
pub use controller::{RecordStreamController, StreamSettings, DEFAULT_MAX_ROWS};
pub use error::{Error, Result};
pub use events::{Counters, StreamEvent, Subscription};
pub use session::{ConsumeRequest, SessionHandle, SessionOutcome, SessionStatus};
pub use store::{RecordFilter, RowStore, SortColumn, SortOrder};
