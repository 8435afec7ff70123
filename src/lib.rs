pub mod config;
pub mod error;
pub mod utils;
pub mod storage;
pub mod operator;
pub mod layers;

// Driver modules (point to project root drivers via path attribute) / 驱动模块
#[path = "../drivers/mod.rs"]
pub mod drivers;

#[cfg(test)]
mod test_util;

pub use config::ConfigMap;
pub use error::{Error, ErrorKind, Result};
pub use layers::Layer;
pub use operator::{BlockingLister, BlockingOperator, BlockingReader, Lister, Operator, OperatorInfo, Reader};
pub use storage::{Capability, DriverRegistry, Entry, Metadata, Operation, StorageDriver};
