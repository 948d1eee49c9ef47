pub mod common;
pub mod in_memory;
pub mod local_fs;

pub use common::{
    Backend, BackendError, BackendResult, FileKind, FileStatus, FileWriter, PayloadStream,
    SharedBackend,
};
pub use in_memory::InMemoryBackend;
pub use local_fs::LocalFs;
