//! Core value types: squares, pieces, bitboards, hands and moves.

mod bitboard;
mod hand;
mod moves;
mod piece;
mod square;

pub use bitboard::{Bitboard, BitboardIter, FILE_MASKS, RANK_MASKS};
pub use hand::Hand;
pub use moves::{ExtMove, Move, MoveList, MAX_LEGAL_MOVES};
pub use piece::{Color, HandPiece, Piece, PieceType};
pub use square::{can_promote, File, Rank, Square, SQUARE_NB};
