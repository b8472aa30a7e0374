pub mod cputime;
pub mod limits;
pub mod memory;
pub mod result;
pub mod supervisor;
pub mod testcase;
pub mod verifier;

pub use limits::*;
pub use result::*;
pub use supervisor::*;
pub use testcase::*;
