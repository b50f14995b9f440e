//! Disk management module
//!
//! Partition table discovery through sfdisk and lsblk.

pub mod block_device;
pub mod lsblk;
pub mod partition;
pub mod sfdisk;

pub use block_device::BlockDevice;
pub use partition::Partition;
pub use sfdisk::PartitionTable;
