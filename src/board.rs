
use crate::error::{EngineError, EngineResult};

pub const START_FEN: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

const WHITE_KINGSIDE: u8 = 0b0001;
const WHITE_QUEENSIDE: u8 = 0b0010;
const BLACK_KINGSIDE: u8 = 0b0100;
const BLACK_QUEENSIDE: u8 = 0b1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Piece {
    Pawn,
    Knight,
    Bishop,
    Rook,
    Queen,
    King,
}

impl Piece {
    pub const ALL: [Piece; 6] = [
        Piece::Pawn,
        Piece::Knight,
        Piece::Bishop,
        Piece::Rook,
        Piece::Queen,
        Piece::King,
    ];

    pub fn index(self) -> usize {
        match self {
            Piece::Pawn => 0,
            Piece::Knight => 1,
            Piece::Bishop => 2,
            Piece::Rook => 3,
            Piece::Queen => 4,
            Piece::King => 5,
        }
    }

    /// Uppercase letter used by FEN and algebraic notation.
    pub fn letter(self) -> char {
        match self {
            Piece::Pawn => 'P',
            Piece::Knight => 'N',
            Piece::Bishop => 'B',
            Piece::Rook => 'R',
            Piece::Queen => 'Q',
            Piece::King => 'K',
        }
    }

    pub fn from_letter(c: char) -> Option<Piece> {
        match c.to_ascii_uppercase() {
            'P' => Some(Piece::Pawn),
            'N' => Some(Piece::Knight),
            'B' => Some(Piece::Bishop),
            'R' => Some(Piece::Rook),
            'Q' => Some(Piece::Queen),
            'K' => Some(Piece::King),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Color {
    White,
    Black,
}

impl Color {
    pub fn opposite(&self) -> Color {
        match self {
            Color::White => Color::Black,
            Color::Black => Color::White,
        }
    }
}

/// A move resolved against a board: the moving piece and any side effects are known.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Move {
    pub from: u8,
    pub to: u8,
    pub piece: Piece,
    pub captured_piece: Option<Piece>,
    pub promotion: Option<Piece>,
    pub is_en_passant: bool,
    pub is_castling: bool,
}

impl Move {
    pub fn new(from: u8, to: u8, piece: Piece) -> Self {
        Self {
            from,
            to,
            piece,
            captured_piece: None,
            promotion: None,
            is_en_passant: false,
            is_castling: false,
        }
    }
}

pub fn square_name(square: u8) -> String {
    let mut name = String::with_capacity(2);
    name.push((b'a' + square % 8) as char);
    name.push((b'1' + square / 8) as char);
    name
}

pub fn parse_square(s: &str) -> Option<u8> {
    let bytes = s.as_bytes();
    if bytes.len() != 2 {
        return None;
    }
    let file = bytes[0].checked_sub(b'a')?;
    let rank = bytes[1].checked_sub(b'1')?;
    if file > 7 || rank > 7 {
        return None;
    }
    Some(rank * 8 + file)
}

/// Piece placement, side to move and move counters.
///
/// Squares are numbered a1 = 0 .. h8 = 63. The value is cheap to clone and is
/// always handed around by copy; callers replaying a line work on their own clone.
#[derive(Debug, Clone, PartialEq)]
pub struct Board {
    pub white_pieces: [u64; 6], // Pawn, Knight, Bishop, Rook, Queen, King
    pub black_pieces: [u64; 6], // Pawn, Knight, Bishop, Rook, Queen, King
    pub side_to_move: Color,
    pub castling_rights: u8, // 4 bits: qkQK
    pub en_passant_square: Option<u8>,
    pub halfmove_clock: u16,
    pub fullmove_number: u16,
}

impl Default for Board {
    fn default() -> Self {
        Self::new()
    }
}

impl Board {
    pub fn new() -> Self {
        Self {
            white_pieces: [
                0x000000000000FF00, // Pawns
                0x0000000000000042, // Knights
                0x0000000000000024, // Bishops
                0x0000000000000081, // Rooks
                0x0000000000000008, // Queen
                0x0000000000000010, // King
            ],
            black_pieces: [
                0x00FF000000000000, // Pawns
                0x4200000000000000, // Knights
                0x2400000000000000, // Bishops
                0x8100000000000000, // Rooks
                0x0800000000000000, // Queen
                0x1000000000000000, // King
            ],
            side_to_move: Color::White,
            castling_rights: 0b1111,
            en_passant_square: None,
            halfmove_clock: 0,
            fullmove_number: 1,
        }
    }

    pub fn empty() -> Self {
        Self {
            white_pieces: [0; 6],
            black_pieces: [0; 6],
            side_to_move: Color::White,
            castling_rights: 0,
            en_passant_square: None,
            halfmove_clock: 0,
            fullmove_number: 1,
        }
    }

    pub fn from_fen(fen: &str) -> EngineResult<Self> {
        let invalid = |reason: &str| EngineError::InvalidPosition(format!("{reason}: {fen}"));
        let fields: Vec<&str> = fen.split_whitespace().collect();
        if fields.len() < 4 {
            return Err(invalid("expected at least 4 FEN fields"));
        }

        let mut board = Board::empty();
        let ranks: Vec<&str> = fields[0].split('/').collect();
        if ranks.len() != 8 {
            return Err(invalid("expected 8 ranks"));
        }
        for (i, rank_text) in ranks.iter().enumerate() {
            let rank = 7 - i as u8;
            let mut file = 0u8;
            for c in rank_text.chars() {
                if let Some(skip) = c.to_digit(10) {
                    if skip == 0 {
                        return Err(invalid("empty run of zero squares"));
                    }
                    file = file.saturating_add(skip as u8);
                    continue;
                }
                let piece = Piece::from_letter(c).ok_or_else(|| invalid("unknown piece letter"))?;
                if file > 7 {
                    return Err(invalid("rank overflows"));
                }
                let color = if c.is_ascii_uppercase() { Color::White } else { Color::Black };
                board.put(rank * 8 + file, piece, color);
                file += 1;
            }
            if file != 8 {
                return Err(invalid("rank does not cover 8 files"));
            }
        }

        board.side_to_move = match fields[1] {
            "w" => Color::White,
            "b" => Color::Black,
            _ => return Err(invalid("side to move must be w or b")),
        };

        for c in fields[2].chars() {
            board.castling_rights |= match c {
                'K' => WHITE_KINGSIDE,
                'Q' => WHITE_QUEENSIDE,
                'k' => BLACK_KINGSIDE,
                'q' => BLACK_QUEENSIDE,
                '-' => 0,
                _ => return Err(invalid("bad castling field")),
            };
        }

        board.en_passant_square = match fields[3] {
            "-" => None,
            sq => {
                let square = parse_square(sq).ok_or_else(|| invalid("bad en passant square"))?;
                let expected_rank = match board.side_to_move {
                    Color::White => 5,
                    Color::Black => 2,
                };
                if square / 8 != expected_rank {
                    return Err(invalid("en passant square on the wrong rank"));
                }
                Some(square)
            }
        };

        if let Some(halfmove) = fields.get(4) {
            board.halfmove_clock = halfmove.parse().map_err(|_| invalid("bad halfmove clock"))?;
        }
        if let Some(fullmove) = fields.get(5) {
            board.fullmove_number = fullmove.parse().map_err(|_| invalid("bad fullmove number"))?;
        }

        if board.king_square(Color::White).is_none() || board.king_square(Color::Black).is_none() {
            return Err(invalid("both kings must be present"));
        }
        Ok(board)
    }

    pub fn to_fen(&self) -> String {
        let mut fen = String::new();
        for rank in (0..8u8).rev() {
            let mut empty = 0;
            for file in 0..8u8 {
                match self.get_piece_at(rank * 8 + file) {
                    Some((piece, color)) => {
                        if empty > 0 {
                            fen.push_str(&empty.to_string());
                            empty = 0;
                        }
                        let letter = piece.letter();
                        fen.push(if color == Color::White {
                            letter
                        } else {
                            letter.to_ascii_lowercase()
                        });
                    }
                    None => empty += 1,
                }
            }
            if empty > 0 {
                fen.push_str(&empty.to_string());
            }
            if rank > 0 {
                fen.push('/');
            }
        }

        fen.push_str(if self.side_to_move == Color::White { " w " } else { " b " });

        let mut castling = String::new();
        for (bit, c) in [
            (WHITE_KINGSIDE, 'K'),
            (WHITE_QUEENSIDE, 'Q'),
            (BLACK_KINGSIDE, 'k'),
            (BLACK_QUEENSIDE, 'q'),
        ] {
            if self.castling_rights & bit != 0 {
                castling.push(c);
            }
        }
        if castling.is_empty() {
            castling.push('-');
        }
        fen.push_str(&castling);

        fen.push(' ');
        match self.en_passant_square {
            Some(sq) => fen.push_str(&square_name(sq)),
            None => fen.push('-'),
        }
        fen.push_str(&format!(" {} {}", self.halfmove_clock, self.fullmove_number));
        fen
    }

    pub fn pieces(&self, color: Color) -> &[u64; 6] {
        match color {
            Color::White => &self.white_pieces,
            Color::Black => &self.black_pieces,
        }
    }

    fn pieces_mut(&mut self, color: Color) -> &mut [u64; 6] {
        match color {
            Color::White => &mut self.white_pieces,
            Color::Black => &mut self.black_pieces,
        }
    }

    pub fn occupied_by(&self, color: Color) -> u64 {
        self.pieces(color).iter().fold(0, |acc, bb| acc | bb)
    }

    pub fn occupied(&self) -> u64 {
        self.occupied_by(Color::White) | self.occupied_by(Color::Black)
    }

    pub fn king_square(&self, color: Color) -> Option<u8> {
        let king = self.pieces(color)[Piece::King.index()];
        if king == 0 {
            None
        } else {
            Some(king.trailing_zeros() as u8)
        }
    }

    pub fn put(&mut self, square: u8, piece: Piece, color: Color) {
        self.remove(square);
        self.pieces_mut(color)[piece.index()] |= 1u64 << square;
    }

    pub fn remove(&mut self, square: u8) {
        let mask = !(1u64 << square);
        for bb in self.white_pieces.iter_mut().chain(self.black_pieces.iter_mut()) {
            *bb &= mask;
        }
    }

    /// Applies a resolved move. Legality is the caller's concern.
    pub fn make_move(&mut self, mv: Move) {
        let us = self.side_to_move;
        let is_white = us == Color::White;

        // Handle captures
        if mv.captured_piece.is_some() {
            let captured_square = match (mv.is_en_passant, is_white) {
                (false, _) => Some(mv.to),
                (true, true) => mv.to.checked_sub(8),
                (true, false) => Some(mv.to + 8).filter(|square| *square < 64),
            };
            if let Some(square) = captured_square {
                self.remove(square);
            }
        }

        // Move the piece, promoting if needed
        self.pieces_mut(us)[mv.piece.index()] &= !(1u64 << mv.from);
        let placed = mv.promotion.unwrap_or(mv.piece);
        self.pieces_mut(us)[placed.index()] |= 1u64 << mv.to;

        // Handle castling
        if mv.is_castling {
            let (rook_from, rook_to) = if mv.to > mv.from {
                // Kingside
                if is_white {
                    (7, 5) // h1 to f1
                } else {
                    (63, 61) // h8 to f8
                }
            } else if is_white {
                (0, 3) // a1 to d1
            } else {
                (56, 59) // a8 to d8
            };
            let rooks = &mut self.pieces_mut(us)[Piece::Rook.index()];
            *rooks &= !(1u64 << rook_from);
            *rooks |= 1u64 << rook_to;
        }

        // Update castling rights
        if mv.piece == Piece::King {
            self.castling_rights &= if is_white {
                !(WHITE_KINGSIDE | WHITE_QUEENSIDE)
            } else {
                !(BLACK_KINGSIDE | BLACK_QUEENSIDE)
            };
        }
        for square in [mv.from, mv.to] {
            match square {
                0 => self.castling_rights &= !WHITE_QUEENSIDE,
                7 => self.castling_rights &= !WHITE_KINGSIDE,
                56 => self.castling_rights &= !BLACK_QUEENSIDE,
                63 => self.castling_rights &= !BLACK_KINGSIDE,
                _ => {}
            }
        }

        // Update en passant square
        self.en_passant_square = if mv.piece == Piece::Pawn && mv.from.abs_diff(mv.to) == 16 {
            Some(if is_white { mv.from + 8 } else { mv.from - 8 })
        } else {
            None
        };

        // Update move counters
        if mv.piece == Piece::Pawn || mv.captured_piece.is_some() {
            self.halfmove_clock = 0;
        } else {
            self.halfmove_clock = self.halfmove_clock.saturating_add(1);
        }
        if !is_white {
            self.fullmove_number = self.fullmove_number.saturating_add(1);
        }

        self.side_to_move = us.opposite();
    }

    pub fn get_piece_at(&self, square: u8) -> Option<(Piece, Color)> {
        let mask = 1u64 << square;
        for color in [Color::White, Color::Black] {
            for piece in Piece::ALL {
                if self.pieces(color)[piece.index()] & mask != 0 {
                    return Some((piece, color));
                }
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_start_position_fen_round_trip() {
        let board = Board::from_fen(START_FEN).unwrap();
        assert_eq!(board, Board::new());
        assert_eq!(board.to_fen(), START_FEN);
    }

    #[test]
    fn test_fen_rejects_missing_king() {
        let result = Board::from_fen("8/8/8/8/8/8/8/4K3 w - - 0 1");
        assert!(matches!(result, Err(EngineError::InvalidPosition(_))));
    }

    #[test]
    fn test_fen_rejects_short_rank() {
        let result = Board::from_fen("rnbqkbnr/ppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1");
        assert!(result.is_err());
    }

    #[test]
    fn test_double_push_sets_en_passant_square() {
        let mut board = Board::new();
        board.make_move(Move::new(12, 28, Piece::Pawn)); // e2-e4
        assert_eq!(board.en_passant_square, Some(20));
        assert_eq!(board.side_to_move, Color::Black);
        assert_eq!(board.fullmove_number, 1);
        assert_eq!(
            board.to_fen(),
            "rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq e3 0 1"
        );
    }

    #[test]
    fn test_black_move_advances_fullmove_number() {
        let mut board = Board::new();
        board.make_move(Move::new(12, 28, Piece::Pawn));
        board.make_move(Move::new(52, 36, Piece::Pawn));
        assert_eq!(board.fullmove_number, 2);
        assert_eq!(board.side_to_move, Color::White);
    }

    #[test]
    fn test_rook_capture_on_home_square_clears_castling_right() {
        let mut board = Board::from_fen("r3k3/8/8/8/8/8/8/4K2R w Kq - 0 1").unwrap();
        board.make_move(Move::new(7, 63, Piece::Rook)); // Rh1-h8
        assert_eq!(board.castling_rights, BLACK_QUEENSIDE);

        let mut mv = Move::new(56, 63, Piece::Rook); // Ra8xh8
        mv.captured_piece = Some(Piece::Rook);
        board.make_move(mv);
        assert_eq!(board.castling_rights, 0);
        assert_eq!(board.get_piece_at(63), Some((Piece::Rook, Color::Black)));
        assert_eq!(board.get_piece_at(56), None);
    }

    #[test]
    fn test_fen_rejects_absurd_fields() {
        let long_run = format!("{}/8/8/8/8/8/8/4K3 w - - 0 1", "9".repeat(30));
        assert!(Board::from_fen(&long_run).is_err());
        assert!(Board::from_fen("4k3/8/8/8/8/8/8/4K3 w - e1 0 1").is_err());
        assert!(Board::from_fen("4k3/8/8/8/8/8/8/4K3 w - e3 0 1").is_err());
        assert!(Board::from_fen("4k3/8/8/3pP3/8/8/8/4K3 w - d6 0 1").is_ok());
        assert!(Board::from_fen("4k3/8/8/8/8/8/8/4K3 w - - 70000 1").is_err());
    }

    #[test]
    fn test_counters_saturate() {
        let mut board = Board::from_fen("4k3/8/8/8/8/8/8/4K3 b - - 65535 65535").unwrap();
        board.make_move(Move::new(60, 59, Piece::King));
        assert_eq!(board.halfmove_clock, u16::MAX);
        assert_eq!(board.fullmove_number, u16::MAX);
    }

    #[test]
    fn test_square_names() {
        assert_eq!(square_name(0), "a1");
        assert_eq!(square_name(63), "h8");
        assert_eq!(parse_square("e4"), Some(28));
        assert_eq!(parse_square("i4"), None);
        assert_eq!(parse_square("e9"), None);
    }
}
