//! Enumerate the S3 buckets a set of credentials can see, check which ones are
//! readable, and dump their keys or contents to local disk.

pub mod config;
pub mod console;
pub mod dumper;
pub mod error;
pub mod layout;
pub mod mode;
pub mod names;
pub mod pager;
pub mod proxy;
pub mod store;

pub use console::{Console, TerminalConsole};
pub use dumper::{BucketDumper, RunSummary};
pub use error::{BucketSkip, DumpError, SampleError, StoreError};
pub use layout::Layout;
pub use mode::Mode;
pub use store::{BucketInfo, ObjectPage, ObjectStore, S3Store};
