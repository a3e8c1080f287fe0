pub mod error;
pub mod evaluate;
pub mod interp;
pub mod io;
pub mod peaks;
pub mod quality;
pub mod signal;
pub mod windowing;

pub use error::{Error, Result};
pub use evaluate::*;
pub use quality::*;
pub use signal::*;
pub use windowing::*;
