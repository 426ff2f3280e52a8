//! UniStacker automation workers.
//!
//! The orchestration layer only knows the [`AutomationWorker`] trait: a
//! long-running, fallible job that reports progress through a [`LogSink`]
//! and returns a JSON document. This crate defines that boundary and the
//! production worker, a [`ScrapePipeline`] that drives the external
//! browser-automation driver and post-processes what it scraped:
//!
//! - [`driver`]: runs the driver process and forwards its progress lines.
//! - [`deadlines`]: finds assignments and quizzes due soon.
//! - [`alerts`]: posts upcoming deadlines to a Discord webhook.
//! - [`quality`]: summarises gaps in the scraped data.

pub mod alerts;
pub mod deadlines;
pub mod driver;
pub mod pipeline;
pub mod quality;
pub mod sink;
pub mod worker;

pub use driver::DriverSource;
pub use pipeline::{CourseSource, ScrapePipeline};
pub use sink::LogSink;
pub use worker::{AutomationWorker, WorkerError};
