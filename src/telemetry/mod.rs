// SPDX-License-Identifier: MIT OR Apache-2.0

//! Transaction telemetry: event records, asynchronous dispatch, and the sink
//! seam.

mod dispatcher;
mod event;
mod sink;

pub use dispatcher::{DispatcherConfig, EventDispatcher, OverflowPolicy, ShutdownError};
pub use event::{TransactionEvent, TransactionEventBuilder, TransactionType};
pub use sink::{ConsoleSink, Sink, SinkError};
