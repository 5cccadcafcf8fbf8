//! SFEN serialization and USI move parsing.

use crate::position::error::{SfenError, UsiMoveError};
use crate::position::state::Position;
use crate::position::types::{Color, File, HandPiece, Move, Piece, PieceType, Rank, Square};

/// The standard shogi starting position.
pub const START_SFEN: &str =
    "lnsgkgsnl/1r5b1/ppppppppp/9/9/9/PPPPPPPPP/1B5R1/LNSGKGSNL b - 1";

/// Hand pieces in SFEN emission order, strongest first.
const SFEN_HAND_ORDER: [HandPiece; 7] = [
    HandPiece::Rook,
    HandPiece::Bishop,
    HandPiece::Gold,
    HandPiece::Silver,
    HandPiece::Knight,
    HandPiece::Lance,
    HandPiece::Pawn,
];

impl Position {
    /// Parse an SFEN string into a fresh position.
    pub fn from_sfen(sfen: &str) -> Result<Position, SfenError> {
        let mut fields = sfen.split_whitespace();
        let board_field = fields.next().ok_or(SfenError::MissingField { field: "board" })?;
        let turn_field = fields.next().ok_or(SfenError::MissingField { field: "turn" })?;
        let hand_field = fields.next().ok_or(SfenError::MissingField { field: "hand" })?;
        let ply_field = fields.next().unwrap_or("1");

        let mut pos = Position::empty();

        // Board: ranks top to bottom, files 9 down to 1 within each rank.
        let mut rank = 0u8;
        let mut file = 8i8;
        let mut promote = false;
        for token in board_field.chars() {
            match token {
                '/' => {
                    if file != -1 || rank >= 8 {
                        return Err(SfenError::InvalidBoard {
                            sfen: sfen.to_string(),
                        });
                    }
                    rank += 1;
                    file = 8;
                }
                '1'..='9' => {
                    file -= token as i8 - b'0' as i8;
                }
                '+' => promote = true,
                _ => {
                    let pc = Piece::from_sfen_char(token).ok_or_else(|| {
                        SfenError::InvalidBoard {
                            sfen: sfen.to_string(),
                        }
                    })?;
                    if file < 0 || (promote && !pc.piece_type().can_be_promoted()) {
                        return Err(SfenError::InvalidBoard {
                            sfen: sfen.to_string(),
                        });
                    }
                    let pc = if promote {
                        Piece::new(pc.color(), pc.piece_type().promoted())
                    } else {
                        pc
                    };
                    promote = false;
                    pos.put_piece_init(pc, Square::new(File(file as u8), Rank(rank)));
                    file -= 1;
                }
            }
            if file < -1 {
                return Err(SfenError::InvalidBoard {
                    sfen: sfen.to_string(),
                });
            }
        }
        if rank != 8 || file != -1 {
            return Err(SfenError::InvalidBoard {
                sfen: sfen.to_string(),
            });
        }

        pos.turn = match turn_field {
            "b" => Color::Black,
            "w" => Color::White,
            other => {
                return Err(SfenError::InvalidTurn {
                    token: other.to_string(),
                })
            }
        };

        if hand_field != "-" {
            let mut digits = 0u32;
            for token in hand_field.chars() {
                if let Some(d) = token.to_digit(10) {
                    digits = digits * 10 + d;
                } else if let Some(pc) = Piece::from_sfen_char(token) {
                    let hp = HandPiece::from_piece_type(pc.piece_type()).ok_or_else(|| {
                        SfenError::InvalidHand {
                            token: token.to_string(),
                        }
                    })?;
                    let num = if digits == 0 { 1 } else { digits };
                    let mut hand = pos.hand(pc.color());
                    hand.set(hp, num);
                    pos.hand[pc.color().index()] = hand;
                    digits = 0;
                } else {
                    return Err(SfenError::InvalidHand {
                        token: token.to_string(),
                    });
                }
            }
        }

        for c in [Color::Black, Color::White] {
            let kings = pos.pieces_cp(c, PieceType::KING);
            if !kings.is_single() {
                return Err(SfenError::Inconsistent {
                    reason: "each side needs exactly one king",
                });
            }
            pos.king_square[c.index()] = kings.first();
        }
        pos.refresh_golds();

        let move_number: i32 = ply_field.parse().unwrap_or(1);
        pos.game_ply =
            (2 * (move_number - 1)).max(0) + i32::from(!pos.turn.is_black());

        let board_key = pos.compute_board_key();
        let hand_key = pos.compute_hand_key();
        let material = pos.compute_material();
        let hand = pos.hand(pos.turn());
        {
            let st = pos.state_mut();
            st.board_key = board_key;
            st.hand_key = hand_key;
            st.material = material;
            st.hand = hand;
        }
        pos.rebuild_eval_list();
        pos.find_checkers();

        #[cfg(debug_assertions)]
        debug_assert!(pos.is_ok());

        Ok(pos)
    }

    /// The starting position.
    #[must_use]
    pub fn startpos() -> Position {
        Position::from_sfen(START_SFEN).expect("start SFEN is well-formed")
    }

    /// Serialize back to SFEN with the given move number.
    #[must_use]
    pub fn to_sfen_with_ply(&self, move_number: i32) -> String {
        let mut out = String::new();
        for r in 0..9u8 {
            let mut empties = 0;
            for f in (0..9u8).rev() {
                let pc = self.piece_on(Square::new(File(f), Rank(r)));
                match pc.sfen() {
                    None => empties += 1,
                    Some(s) => {
                        if empties > 0 {
                            out.push_str(&empties.to_string());
                            empties = 0;
                        }
                        out.push_str(&s);
                    }
                }
            }
            if empties > 0 {
                out.push_str(&empties.to_string());
            }
            if r != 8 {
                out.push('/');
            }
        }

        out.push(' ');
        out.push(if self.turn().is_black() { 'b' } else { 'w' });
        out.push(' ');

        let mut any_hand = false;
        for c in [Color::Black, Color::White] {
            for hp in SFEN_HAND_ORDER {
                let num = self.hand(c).num(hp);
                if num == 0 {
                    continue;
                }
                any_hand = true;
                if num > 1 {
                    out.push_str(&num.to_string());
                }
                let pc = Piece::new(c, hp.piece_type());
                out.push_str(&pc.sfen().unwrap_or_default());
            }
        }
        if !any_hand {
            out.push('-');
        }

        out.push(' ');
        out.push_str(&move_number.to_string());
        out
    }

    #[must_use]
    pub fn to_sfen(&self) -> String {
        self.to_sfen_with_ply(self.game_ply() / 2 + 1)
    }

    /// Parse a USI move token against this position, validating full
    /// legality (a stale or hostile token never reaches `do_move`).
    pub fn move_from_usi(&self, token: &str) -> Result<Move, UsiMoveError> {
        let malformed = || UsiMoveError::Malformed {
            token: token.to_string(),
        };
        let chars: Vec<char> = token.chars().collect();
        let mv = if chars.len() >= 2 && chars[1] == '*' {
            if chars.len() != 4 {
                return Err(malformed());
            }
            let pt = match chars[0] {
                'P' => PieceType::PAWN,
                'L' => PieceType::LANCE,
                'N' => PieceType::KNIGHT,
                'S' => PieceType::SILVER,
                'G' => PieceType::GOLD,
                'B' => PieceType::BISHOP,
                'R' => PieceType::ROOK,
                _ => return Err(malformed()),
            };
            let to = square_from_chars(chars[2], chars[3]).ok_or_else(malformed)?;
            Move::new_drop(pt, to)
        } else {
            if chars.len() != 4 && chars.len() != 5 {
                return Err(malformed());
            }
            let from = square_from_chars(chars[0], chars[1]).ok_or_else(malformed)?;
            let to = square_from_chars(chars[2], chars[3]).ok_or_else(malformed)?;
            let promote = chars.len() == 5 && chars[4] == '+';
            if chars.len() == 5 && chars[4] != '+' {
                return Err(malformed());
            }
            let pc = self.piece_on(from);
            if pc.is_empty() || pc.color() != self.turn() {
                return Err(UsiMoveError::Illegal {
                    token: token.to_string(),
                });
            }
            // Mandatory promotions: a piece may not move where it would
            // never move again.
            if !promote {
                let pt = pc.piece_type();
                let dead = if self.turn().is_black() {
                    to.rank().0 < if pt == PieceType::KNIGHT { 2 } else { 1 }
                } else {
                    to.rank().0 > if pt == PieceType::KNIGHT { 6 } else { 7 }
                };
                if dead
                    && matches!(pt, PieceType::PAWN | PieceType::LANCE | PieceType::KNIGHT)
                {
                    return Err(UsiMoveError::Illegal {
                        token: token.to_string(),
                    });
                }
            }
            Move::new(
                pc.piece_type(),
                from,
                to,
                promote,
                self.piece_on(to).piece_type(),
            )
        };

        if self.move_is_pseudo_legal(mv, true)
            && self.pseudo_legal_move_is_legal(mv, self.pinned_bb(), false, false)
        {
            Ok(mv)
        } else {
            Err(UsiMoveError::Illegal {
                token: token.to_string(),
            })
        }
    }
}

fn square_from_chars(fc: char, rc: char) -> Option<Square> {
    Some(Square::new(File::from_usi_char(fc)?, Rank::from_usi_char(rc)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_startpos_basics() {
        let pos = Position::startpos();
        assert_eq!(pos.turn(), Color::Black);
        assert_eq!(pos.occupied().count(), 40);
        assert_eq!(pos.pieces(PieceType::PAWN).count(), 18);
        assert!(pos.hand(Color::Black).is_empty());
        assert!(!pos.in_check());
        assert_eq!(pos.material(), 0);
    }

    #[test]
    fn test_startpos_round_trip() {
        let pos = Position::startpos();
        assert_eq!(pos.to_sfen(), START_SFEN);
    }

    #[test]
    fn test_hand_round_trip() {
        let sfen = "lnsgkgsnl/1r5b1/pppppp1pp/6p2/9/2P6/PP1PPPPPP/1B5R1/LNSGKGSNL w 2Pb 4";
        let pos = Position::from_sfen(sfen).unwrap();
        assert_eq!(pos.hand(Color::Black).num(HandPiece::Pawn), 2);
        assert_eq!(pos.hand(Color::White).num(HandPiece::Bishop), 1);
        assert_eq!(pos.to_sfen_with_ply(4), sfen);
    }

    #[test]
    fn test_malformed_sfen() {
        assert!(Position::from_sfen("").is_err());
        assert!(Position::from_sfen("lnsgkgsnl/1r5b1 b - 1").is_err());
        assert!(Position::from_sfen(
            "lnsgxgsnl/1r5b1/ppppppppp/9/9/9/PPPPPPPPP/1B5R1/LNSGKGSNL b - 1"
        )
        .is_err());
        // No white king.
        assert!(Position::from_sfen(
            "lnsg1gsnl/1r5b1/ppppppppp/9/9/9/PPPPPPPPP/1B5R1/LNSGKGSNL b - 1"
        )
        .is_err());
    }

    #[test]
    fn test_move_from_usi() {
        let pos = Position::startpos();
        let mv = pos.move_from_usi("7g7f").unwrap();
        assert_eq!(mv.piece_type_from(), PieceType::PAWN);
        assert!(!mv.is_drop());
        assert!(pos.move_from_usi("7g7e").is_err()); // pawn cannot double-step
        assert!(pos.move_from_usi("P*5e").is_err()); // nothing in hand
        assert!(pos.move_from_usi("xyz").is_err());
    }
}
