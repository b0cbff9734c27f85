pub mod dispatcher;
pub mod format;
pub mod log;

pub use dispatcher::{DispatchReport, Dispatcher};
pub use format::{format_opportunity_alert, format_welcome};
pub use log::DeliveryLog;
