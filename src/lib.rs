// Crate root - export modules
pub mod eval;
pub mod position;
pub mod search;
pub mod tt;
pub mod usi;
pub mod zobrist;
