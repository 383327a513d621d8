mod service;

pub use service::{BackfillReport, WebBackfillService};
