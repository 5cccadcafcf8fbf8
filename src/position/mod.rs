//! Position representation, move generation and rules.
//!
//! The position keeps bitboards per piece kind and colour, a square-indexed
//! piece array, packed hands, zobrist keys and the evaluator's piece lists,
//! all updated incrementally by `do_move`/`undo_move` through an
//! append-only stack of state frames.

pub mod attack_tables;
pub mod error;
pub mod movegen;
pub mod sfen;
pub mod types;

mod make_unmake;
mod mate1;
mod see;
mod state;

#[cfg(test)]
mod tests;

pub use error::{SfenError, SquareError, UsiMoveError};
pub use sfen::START_SFEN;
pub use state::{CheckInfo, Position, Repetition, StateInfo};
pub use types::{
    Bitboard, Color, Hand, HandPiece, Move, MoveList, Piece, PieceType, Square, MAX_LEGAL_MOVES,
    SQUARE_NB,
};
