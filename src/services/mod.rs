pub mod detector;
pub mod executor;
pub mod poller;
pub mod process_source;

pub use executor::ThrottledExecutor;
pub use poller::Poller;
pub use process_source::{log_snapshot, ProcessSource, SysinfoSource};
