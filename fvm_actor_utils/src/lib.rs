pub mod messaging;
pub mod syscalls;
pub mod util;
