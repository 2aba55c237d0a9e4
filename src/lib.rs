//! A fixed-capacity, single-open-file file system simulated over a block
//! device. The layering is the classic one: a name binds to an inode, the
//! inode carries direct block pointers, and a free-block bitmap arbitrates
//! which data blocks belong to whom. The storage medium sits behind the
//! [`io::BlockStorage`] trait; [`io::MemBlockEmulator`] keeps everything in
//! process memory and [`io::FileBlockEmulator`] lays the same regions out in
//! a backing file.
//!
//! At most one file is open at a time. Opening or creating a second file
//! while one is open fails rather than silently dropping unflushed state.
//!
//! ```
//! use solofs::{io::MemBlockEmulatorBuilder, FileSystem};
//!
//! # fn main() -> Result<(), solofs::FsError> {
//! let dev = MemBlockEmulatorBuilder::new().build()?;
//! let mut fs = FileSystem::new(dev)?;
//!
//! let fd = fs.create("greeting.txt")?;
//! fs.write(fd, b"hello")?;
//! assert_eq!(fs.read(fd)?, b"hello");
//! fs.close(fd)?;
//! # Ok(())
//! # }
//! ```

mod alloc;
mod fs;
mod node;
pub mod io;

pub use alloc::{Bitmap, NextAvailableAllocation, State};
pub use fs::{
    FileSystem, FsError, Fd, BLOCK_SIZE, INODE_SIZE, MAX_FILE_SIZE, MAX_NAME_LEN,
    NUM_BLOCK_POINTERS,
};
pub use node::Inode;
