//! The position: piece placement, hands, keys and the incremental state
//! frame stack.

use crate::eval::{EvalDelta, EvalList};
use crate::position::attack_tables as tables;
use crate::position::types::{
    Bitboard, Color, Hand, HandPiece, Piece, PieceType, Move, Square, SQUARE_NB,
};
use crate::zobrist;

/// Classification of a position already seen earlier in the game.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Repetition {
    None,
    /// Same key: fourfold-style repetition, a draw by default.
    Draw,
    /// Repetition inside the opponent's continuous-check run.
    Win,
    /// Repetition inside our own continuous-check run.
    Lose,
    /// Same board, our hand dominates the earlier one.
    Superior,
    /// Same board, the earlier hand dominates ours.
    Inferior,
}

/// One ply's worth of incrementally maintained state. Frames live in an
/// append-only stack owned by the position; the previous frame is simply
/// the one below.
#[derive(Clone, Debug)]
pub struct StateInfo {
    /// Material balance from Black's point of view.
    pub material: i32,
    pub plies_from_null: i32,
    /// Running count of consecutive checking plies, per checking side.
    pub continuous_check: [i32; 2],
    pub board_key: u64,
    pub hand_key: u64,
    /// Pieces of the side not to move that check the side to move's king.
    pub checkers: Bitboard,
    /// The side to move's hand, for fast repetition-superiority tests.
    pub hand: Hand,
    /// The move that produced this frame; `NONE` for a root frame.
    pub last_move: Move,
    /// Evaluator list slots changed by that move.
    pub cl: EvalDelta,
}

impl StateInfo {
    #[inline]
    #[must_use]
    pub fn key(&self) -> u64 {
        self.board_key.wrapping_add(self.hand_key)
    }
}

impl Default for StateInfo {
    fn default() -> Self {
        StateInfo {
            material: 0,
            plies_from_null: 0,
            continuous_check: [0; 2],
            board_key: 0,
            hand_key: 0,
            checkers: Bitboard::EMPTY,
            hand: Hand::EMPTY,
            last_move: Move::NONE,
            cl: EvalDelta::default(),
        }
    }
}

/// Pre-computed check geometry for the side to move: its pinned pieces,
/// its discovered-check candidates, and for each piece kind the squares
/// from which that kind directly checks the opposing king.
pub struct CheckInfo {
    pub dc_bb: Bitboard,
    pub pinned: Bitboard,
    pub check_bb: [Bitboard; PieceType::NB],
}

impl CheckInfo {
    #[must_use]
    pub fn new(pos: &Position) -> CheckInfo {
        let them = pos.turn().opposite();
        let ksq = pos.king_square(them);
        let occ = pos.occupied();

        let mut check_bb = [Bitboard::EMPTY; PieceType::NB];
        check_bb[PieceType::PAWN.index()] = tables::pawn_attack(them, ksq);
        check_bb[PieceType::LANCE.index()] = tables::lance_attack(them, ksq, occ);
        check_bb[PieceType::KNIGHT.index()] = tables::knight_attack(them, ksq);
        check_bb[PieceType::SILVER.index()] = tables::silver_attack(them, ksq);
        check_bb[PieceType::BISHOP.index()] = tables::bishop_attack(ksq, occ);
        check_bb[PieceType::ROOK.index()] = tables::rook_attack(ksq, occ);
        let gold = tables::gold_attack(them, ksq);
        check_bb[PieceType::GOLD.index()] = gold;
        check_bb[PieceType::PRO_PAWN.index()] = gold;
        check_bb[PieceType::PRO_LANCE.index()] = gold;
        check_bb[PieceType::PRO_KNIGHT.index()] = gold;
        check_bb[PieceType::PRO_SILVER.index()] = gold;
        check_bb[PieceType::HORSE.index()] =
            check_bb[PieceType::BISHOP.index()] | tables::king_attack(ksq);
        check_bb[PieceType::DRAGON.index()] =
            check_bb[PieceType::ROOK.index()] | tables::king_attack(ksq);

        CheckInfo {
            dc_bb: pos.discovered_check_bb(),
            pinned: pos.pinned_bb(),
            check_bb,
        }
    }
}

#[derive(Clone)]
pub struct Position {
    /// Per-kind occupancy; slot 0 is the union of every piece.
    pub(crate) by_type: [Bitboard; PieceType::NB],
    pub(crate) by_color: [Bitboard; Color::NB],
    /// Gold plus promoted minors, cached as one set.
    pub(crate) golds: Bitboard,
    pub(crate) board: [Piece; SQUARE_NB],
    pub(crate) king_square: [Square; Color::NB],
    pub(crate) hand: [Hand; Color::NB],
    pub(crate) turn: Color,
    pub(crate) eval_list: EvalList,
    pub(crate) states: Vec<StateInfo>,
    pub(crate) game_ply: i32,
    pub(crate) nodes: u64,
}

impl Position {
    /// An empty board with one root frame. Only useful as SFEN input.
    #[must_use]
    pub(crate) fn empty() -> Position {
        Position {
            by_type: [Bitboard::EMPTY; PieceType::NB],
            by_color: [Bitboard::EMPTY; Color::NB],
            golds: Bitboard::EMPTY,
            board: [Piece::EMPTY; SQUARE_NB],
            king_square: [Square::from_index(0); Color::NB],
            hand: [Hand::EMPTY; Color::NB],
            turn: Color::Black,
            eval_list: EvalList::default(),
            states: vec![StateInfo::default()],
            game_ply: 0,
            nodes: 0,
        }
    }

    // ---- basic accessors ----

    #[inline]
    #[must_use]
    pub fn pieces(&self, pt: PieceType) -> Bitboard {
        self.by_type[pt.index()]
    }

    #[inline]
    #[must_use]
    pub fn pieces_c(&self, c: Color) -> Bitboard {
        self.by_color[c.index()]
    }

    #[inline]
    #[must_use]
    pub fn pieces_cp(&self, c: Color, pt: PieceType) -> Bitboard {
        self.pieces(pt) & self.pieces_c(c)
    }

    #[inline]
    #[must_use]
    pub fn pieces2(&self, pt1: PieceType, pt2: PieceType) -> Bitboard {
        self.pieces(pt1) | self.pieces(pt2)
    }

    #[inline]
    #[must_use]
    pub fn occupied(&self) -> Bitboard {
        self.by_type[PieceType::OCCUPIED.index()]
    }

    #[inline]
    #[must_use]
    pub fn empty_squares(&self) -> Bitboard {
        !self.occupied()
    }

    /// Gold and promoted-minor pieces of both sides.
    #[inline]
    #[must_use]
    pub fn golds(&self) -> Bitboard {
        self.golds
    }

    #[inline]
    #[must_use]
    pub fn golds_of(&self, c: Color) -> Bitboard {
        self.golds & self.pieces_c(c)
    }

    #[inline]
    #[must_use]
    pub fn piece_on(&self, sq: Square) -> Piece {
        self.board[sq.index()]
    }

    #[inline]
    #[must_use]
    pub fn hand(&self, c: Color) -> Hand {
        self.hand[c.index()]
    }

    #[inline]
    #[must_use]
    pub fn turn(&self) -> Color {
        self.turn
    }

    #[inline]
    #[must_use]
    pub fn king_square(&self, c: Color) -> Square {
        self.king_square[c.index()]
    }

    #[inline]
    #[must_use]
    pub fn game_ply(&self) -> i32 {
        self.game_ply
    }

    #[inline]
    #[must_use]
    pub fn nodes_searched(&self) -> u64 {
        self.nodes
    }

    pub fn set_nodes_searched(&mut self, n: u64) {
        self.nodes = n;
    }

    #[inline]
    pub(crate) fn bump_nodes(&mut self) {
        self.nodes += 1;
    }

    #[inline]
    pub(crate) fn state(&self) -> &StateInfo {
        self.states.last().expect("state stack never empty")
    }

    #[inline]
    pub(crate) fn state_mut(&mut self) -> &mut StateInfo {
        self.states.last_mut().expect("state stack never empty")
    }

    #[inline]
    #[must_use]
    pub fn material(&self) -> i32 {
        self.state().material
    }

    /// Material change of the last move, from Black's point of view.
    #[inline]
    #[must_use]
    pub fn material_diff(&self) -> i32 {
        let n = self.states.len();
        self.states[n - 1].material - self.states[n - 2].material
    }

    #[inline]
    #[must_use]
    pub fn checkers(&self) -> Bitboard {
        self.state().checkers
    }

    #[inline]
    #[must_use]
    pub fn in_check(&self) -> bool {
        self.checkers().is_any()
    }

    #[inline]
    #[must_use]
    pub fn last_move(&self) -> Move {
        self.state().last_move
    }

    // ---- keys ----

    #[inline]
    #[must_use]
    pub fn board_key(&self) -> u64 {
        self.state().board_key
    }

    #[inline]
    #[must_use]
    pub fn hand_key(&self) -> u64 {
        self.state().hand_key
    }

    #[inline]
    #[must_use]
    pub fn key(&self) -> u64 {
        self.state().key()
    }

    /// Key with the turn flag dropped; bit 0 is reserved for the turn so
    /// this is a plain shift.
    #[inline]
    #[must_use]
    pub fn key_exclude_turn(&self) -> u64 {
        self.key() >> 1
    }

    /// Key variant distinguishing singular-extension exclusion searches.
    #[inline]
    #[must_use]
    pub fn exclusion_key(&self) -> u64 {
        self.key() ^ zobrist::exclusion_key()
    }

    #[must_use]
    pub(crate) fn compute_board_key(&self) -> u64 {
        let mut key = 0u64;
        for sq in Square::all() {
            let pc = self.piece_on(sq);
            if !pc.is_empty() {
                key = key.wrapping_add(zobrist::piece_key(pc.piece_type(), sq, pc.color()));
            }
        }
        if !self.turn.is_black() {
            key ^= zobrist::TURN_KEY;
        }
        key
    }

    #[must_use]
    pub(crate) fn compute_hand_key(&self) -> u64 {
        let mut key = 0u64;
        for hp in HandPiece::ALL {
            for c in [Color::Black, Color::White] {
                let num = self.hand(c).num(hp);
                for _ in 0..num {
                    key = key.wrapping_add(zobrist::hand_key(hp, c));
                }
            }
        }
        key
    }

    #[must_use]
    pub(crate) fn compute_material(&self) -> i32 {
        let mut score = 0i32;
        for pt in PieceType::all() {
            let diff = self.pieces_cp(Color::Black, pt).count() as i32
                - self.pieces_cp(Color::White, pt).count() as i32;
            score += diff * crate::eval::material::piece_score(pt);
        }
        for hp in HandPiece::ALL {
            let diff = self.hand(Color::Black).num(hp) as i32
                - self.hand(Color::White).num(hp) as i32;
            score += diff * crate::eval::material::piece_score(hp.piece_type());
        }
        score
    }

    // ---- evaluator plumbing ----

    #[inline]
    #[must_use]
    pub fn eval_list(&self) -> &EvalList {
        &self.eval_list
    }

    #[inline]
    pub fn eval_list_mut(&mut self) -> &mut EvalList {
        &mut self.eval_list
    }

    #[inline]
    #[must_use]
    pub fn eval_delta(&self) -> EvalDelta {
        self.state().cl
    }

    /// Rebuild the evaluator lists from scratch: hands first, then every
    /// non-king board piece.
    pub(crate) fn rebuild_eval_list(&mut self) {
        let mut slot = 0usize;
        let mut list = EvalList::default();
        for hp in HandPiece::ALL {
            for c in [Color::Black, Color::White] {
                for n in 1..=self.hand(c).num(hp) {
                    list.set_hand(slot, c, hp, n);
                    slot += 1;
                }
            }
        }
        let non_kings = self.pieces(PieceType::KING).and_not(self.occupied());
        for sq in non_kings.iter() {
            list.set_board(slot, self.piece_on(sq), sq);
            slot += 1;
        }
        // A full game has exactly 38 non-king pieces; reduced-material
        // positions leave trailing zero entries, which both the full and
        // the differential evaluation walk identically.
        debug_assert!(slot <= crate::eval::LIST_SIZE);
        self.eval_list = list;
    }

    // ---- attacks ----

    /// Every piece of either side attacking `sq` under the occupancy.
    #[must_use]
    pub fn attackers_to(&self, sq: Square, occupied: Bitboard) -> Bitboard {
        let golds = self.golds();
        (((tables::pawn_attack(Color::Black, sq) & self.pieces(PieceType::PAWN))
            | (tables::lance_attack(Color::Black, sq, occupied) & self.pieces(PieceType::LANCE))
            | (tables::knight_attack(Color::Black, sq) & self.pieces(PieceType::KNIGHT))
            | (tables::silver_attack(Color::Black, sq) & self.pieces(PieceType::SILVER))
            | (tables::gold_attack(Color::Black, sq) & golds))
            & self.pieces_c(Color::White))
            | (((tables::pawn_attack(Color::White, sq) & self.pieces(PieceType::PAWN))
                | (tables::lance_attack(Color::White, sq, occupied)
                    & self.pieces(PieceType::LANCE))
                | (tables::knight_attack(Color::White, sq) & self.pieces(PieceType::KNIGHT))
                | (tables::silver_attack(Color::White, sq) & self.pieces(PieceType::SILVER))
                | (tables::gold_attack(Color::White, sq) & golds))
                & self.pieces_c(Color::Black))
            | (tables::bishop_attack(sq, occupied)
                & self.pieces2(PieceType::BISHOP, PieceType::HORSE))
            | (tables::rook_attack(sq, occupied)
                & self.pieces2(PieceType::ROOK, PieceType::DRAGON))
            | (tables::king_attack(sq)
                & (self.pieces(PieceType::KING)
                    | self.pieces(PieceType::HORSE)
                    | self.pieces(PieceType::DRAGON)))
    }

    /// Pieces of colour `c` attacking `sq` under the occupancy.
    #[must_use]
    pub fn attackers_to_c(&self, c: Color, sq: Square, occupied: Bitboard) -> Bitboard {
        let opp = c.opposite();
        ((tables::pawn_attack(opp, sq) & self.pieces(PieceType::PAWN))
            | (tables::lance_attack(opp, sq, occupied) & self.pieces(PieceType::LANCE))
            | (tables::knight_attack(opp, sq) & self.pieces(PieceType::KNIGHT))
            | (tables::silver_attack(opp, sq) & self.pieces(PieceType::SILVER))
            | (tables::gold_attack(opp, sq) & self.golds())
            | (tables::bishop_attack(sq, occupied)
                & self.pieces2(PieceType::BISHOP, PieceType::HORSE))
            | (tables::rook_attack(sq, occupied)
                & self.pieces2(PieceType::ROOK, PieceType::DRAGON))
            | (tables::king_attack(sq)
                & (self.pieces(PieceType::KING)
                    | self.pieces(PieceType::HORSE)
                    | self.pieces(PieceType::DRAGON))))
            & self.pieces_c(c)
    }

    #[inline]
    #[must_use]
    pub fn attackers_to_color(&self, c: Color, sq: Square) -> Bitboard {
        self.attackers_to_c(c, sq, self.occupied())
    }

    /// Non-king pieces of colour `c` attacking `sq`.
    #[must_use]
    pub fn attackers_to_except_king(&self, c: Color, sq: Square) -> Bitboard {
        let opp = c.opposite();
        let occ = self.occupied();
        ((tables::pawn_attack(opp, sq) & self.pieces(PieceType::PAWN))
            | (tables::lance_attack(opp, sq, occ) & self.pieces(PieceType::LANCE))
            | (tables::knight_attack(opp, sq) & self.pieces(PieceType::KNIGHT))
            | (tables::silver_attack(opp, sq)
                & self.pieces2(PieceType::SILVER, PieceType::DRAGON))
            | (tables::gold_attack(opp, sq) & (self.golds() | self.pieces(PieceType::HORSE)))
            | (tables::bishop_attack(sq, occ) & self.pieces2(PieceType::BISHOP, PieceType::HORSE))
            | (tables::rook_attack(sq, occ) & self.pieces2(PieceType::ROOK, PieceType::DRAGON)))
            & self.pieces_c(c)
    }

    /// The side to move's pinned pieces.
    #[inline]
    #[must_use]
    pub fn pinned_bb(&self) -> Bitboard {
        self.hidden_checkers(true, true)
    }

    /// The side to move's discovered-check candidate pieces.
    #[inline]
    #[must_use]
    pub fn discovered_check_bb(&self) -> Bitboard {
        self.hidden_checkers(false, true)
    }

    /// Opponent pieces whose removal would reveal a slider onto the
    /// opponent king (used when testing defender captures).
    #[inline]
    #[must_use]
    pub fn discovered_check_bb_them(&self) -> Bitboard {
        self.hidden_checkers(false, false)
    }

    /// Pieces hiding a slider line onto a king. With `find_pinned` the line
    /// points at our king (the hidden piece is pinned); otherwise at the
    /// opponent king (the hidden piece can discover check).
    /// `between_is_us` selects whose piece does the hiding.
    fn hidden_checkers(&self, find_pinned: bool, between_is_us: bool) -> Bitboard {
        let us = self.turn();
        let them = us.opposite();
        let king_owner = if find_pinned { us } else { them };
        let slider_owner = if find_pinned { them } else { us };
        let ksq = self.king_square(king_owner);

        let mut pinners = self.pieces_c(slider_owner)
            & ((self.pieces(PieceType::LANCE) & tables::lance_attack_to_edge(king_owner, ksq))
                | (self.pieces2(PieceType::ROOK, PieceType::DRAGON)
                    & tables::rook_attack_to_edge(ksq))
                | (self.pieces2(PieceType::BISHOP, PieceType::HORSE)
                    & tables::bishop_attack_to_edge(ksq)));

        let hiding_side = if between_is_us { us } else { them };
        let mut result = Bitboard::EMPTY;
        while pinners.is_any() {
            let sq = pinners.pop();
            let between = tables::between(sq, ksq) & self.occupied();
            if between.is_any()
                && between.is_single()
                && between.intersects(self.pieces_c(hiding_side))
            {
                result |= between;
            }
        }
        result
    }

    /// Classify the current position against earlier frames with the same
    /// side to move, looking back at most `check_max_ply` plies and never
    /// across a null move.
    #[must_use]
    pub fn is_draw(&self, check_max_ply: i32) -> Repetition {
        let st = self.state();
        let e = st.plies_from_null.min(check_max_ply);
        let n = self.states.len();
        let mut i = 4;
        while i <= e {
            let stp = &self.states[n - 1 - i as usize];
            if stp.key() == st.key() {
                if i <= st.continuous_check[self.turn.index()] {
                    return Repetition::Lose;
                }
                if i <= st.continuous_check[self.turn.opposite().index()] {
                    return Repetition::Win;
                }
                return Repetition::Draw;
            } else if stp.board_key == st.board_key {
                if st.hand.is_equal_or_superior(stp.hand) {
                    return Repetition::Superior;
                }
                if stp.hand.is_equal_or_superior(st.hand) {
                    return Repetition::Inferior;
                }
            }
            i += 2;
        }
        Repetition::None
    }

    // ---- construction helpers (SFEN parser) ----

    pub(crate) fn put_piece_init(&mut self, pc: Piece, sq: Square) {
        let c = pc.color();
        let pt = pc.piece_type();
        self.board[sq.index()] = pc;
        self.by_type[pt.index()].set(sq);
        self.by_color[c.index()].set(sq);
        self.by_type[PieceType::OCCUPIED.index()].set(sq);
    }

    /// Find the checkers on the side to move's king and store them in the
    /// current frame.
    pub(crate) fn find_checkers(&mut self) {
        let us = self.turn();
        let them = us.opposite();
        let ksq = self.king_square(us);
        let checkers = self.attackers_to_except_king(them, ksq);
        self.state_mut().checkers = checkers;
    }

    pub(crate) fn refresh_golds(&mut self) {
        self.golds = self.pieces(PieceType::GOLD)
            | self.pieces(PieceType::PRO_PAWN)
            | self.pieces(PieceType::PRO_LANCE)
            | self.pieces(PieceType::PRO_KNIGHT)
            | self.pieces(PieceType::PRO_SILVER);
    }

    /// Debug-build consistency audit: bitboards, keys, hand and material
    /// must all agree with a from-scratch recomputation.
    #[cfg(debug_assertions)]
    #[must_use]
    pub fn is_ok(&self) -> bool {
        let mut failed_step = 0;

        // Bitboard disjointness and union coverage.
        if (self.pieces_c(Color::Black) & self.pieces_c(Color::White)).is_any()
            || (self.pieces_c(Color::Black) | self.pieces_c(Color::White)) != self.occupied()
        {
            return self.dump_inconsistency(failed_step);
        }
        failed_step += 1;
        {
            let mut xor = Bitboard::EMPTY;
            for pt in PieceType::all() {
                xor ^= self.pieces(pt);
            }
            if xor != self.occupied() {
                return self.dump_inconsistency(failed_step);
            }
        }
        failed_step += 1;
        // Exactly one king each, where the cached square says.
        for c in [Color::Black, Color::White] {
            let kings = self.pieces_cp(c, PieceType::KING);
            if !kings.is_single() || kings.first() != self.king_square(c) {
                return self.dump_inconsistency(failed_step);
            }
        }
        failed_step += 1;
        // The opponent king may not be capturable.
        let them = self.turn().opposite();
        if self
            .attackers_to_color(self.turn(), self.king_square(them))
            .is_any()
        {
            return self.dump_inconsistency(failed_step);
        }
        failed_step += 1;
        if self.state().checkers.count() > 2 {
            return self.dump_inconsistency(failed_step);
        }
        failed_step += 1;
        if self.board_key() != self.compute_board_key()
            || self.hand_key() != self.compute_hand_key()
        {
            return self.dump_inconsistency(failed_step);
        }
        failed_step += 1;
        if self.state().hand != self.hand(self.turn()) {
            return self.dump_inconsistency(failed_step);
        }
        failed_step += 1;
        for sq in Square::all() {
            let pc = self.piece_on(sq);
            if pc.is_empty() {
                if self.occupied().contains(sq) {
                    return self.dump_inconsistency(failed_step);
                }
            } else if !self.pieces_cp(pc.color(), pc.piece_type()).contains(sq) {
                return self.dump_inconsistency(failed_step);
            }
        }
        failed_step += 1;
        if self.material() != self.compute_material() {
            return self.dump_inconsistency(failed_step);
        }
        true
    }

    #[cfg(debug_assertions)]
    fn dump_inconsistency(&self, failed_step: i32) -> bool {
        eprintln!("position inconsistency, failed step {failed_step}");
        eprintln!("key = {:#x}", self.key());
        eprintln!("{}", self.board_string());
        false
    }

    /// Simple board diagram for diagnostics.
    #[must_use]
    pub fn board_string(&self) -> String {
        let mut out = String::new();
        for r in 0..9u8 {
            for f in (0..9u8).rev() {
                let sq = Square::new(crate::position::types::File(f), crate::position::types::Rank(r));
                let pc = self.piece_on(sq);
                out.push_str(&match pc.sfen() {
                    Some(s) => format!("{s:>3}"),
                    None => "  .".to_string(),
                });
            }
            out.push('\n');
        }
        out
    }
}
