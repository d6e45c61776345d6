// Crate root: declare modules and control visibility
pub mod capture;
pub mod decoder;
pub mod header;
pub mod registers;
pub mod transaction;
pub mod utils;

// Re-export commonly used API from the library for binaries/tests
pub use capture::{load_capture, CapturePacket};
pub use decoder::{CaptureDecoder, DecodeStats};
pub use header::load_register_map;
pub use registers::{Field, Register, RegisterMap};
