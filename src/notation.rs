//! Conversion between engine coordinate notation (`e2e4`, `e7e8q`) and
//! standard algebraic notation (`e4`, `e8=Q`, `O-O`).
//!
//! Everything here is a pure function of its inputs. Functions that advance a
//! position take it by `&mut` and expect a working copy the caller can discard.

use tracing::debug;

use crate::attacks::{attackers_of_kind, is_king_in_check};
use crate::board::{parse_square, square_name, Board, Color, Move, Piece};
use crate::error::{EngineError, EngineResult};

/// Resolves a coordinate-notation move against `board`.
///
/// Only the shape of the move is checked: the piece on the source square must
/// belong to the side to move. Full legality is established upstream.
pub fn parse_coordinate_move(board: &Board, text: &str) -> EngineResult<Move> {
    let invalid = |reason: &str| EngineError::InvalidMove(format!("{text}: {reason}"));
    if !text.is_ascii() || (text.len() != 4 && text.len() != 5) {
        return Err(invalid("expected 4 or 5 characters"));
    }

    let from = parse_square(&text[0..2]).ok_or_else(|| invalid("bad source square"))?;
    let to = parse_square(&text[2..4]).ok_or_else(|| invalid("bad target square"))?;
    let promotion = match text[4..].chars().next() {
        None => None,
        Some(c) => match Piece::from_letter(c) {
            Some(p @ (Piece::Knight | Piece::Bishop | Piece::Rook | Piece::Queen)) => Some(p),
            _ => return Err(invalid("bad promotion piece")),
        },
    };

    let (piece, color) = board
        .get_piece_at(from)
        .ok_or_else(|| invalid("no piece on source square"))?;
    if color != board.side_to_move {
        return Err(invalid("piece does not belong to the side to move"));
    }

    let mut mv = Move::new(from, to, piece);
    mv.promotion = promotion;
    mv.captured_piece = match board.get_piece_at(to) {
        Some((_, target_color)) if target_color == color => {
            return Err(invalid("target square holds a friendly piece"))
        }
        Some((captured, _)) => Some(captured),
        None => None,
    };

    if piece == Piece::Pawn
        && from % 8 != to % 8
        && mv.captured_piece.is_none()
        && board.en_passant_square == Some(to)
    {
        mv.is_en_passant = true;
        mv.captured_piece = Some(Piece::Pawn);
    }

    if piece == Piece::King && from.abs_diff(to) == 2 {
        mv.is_castling = true;
    }

    Ok(mv)
}

/// Pieces of the same kind that could also legally land on the target square.
fn rival_sources(board: &Board, mv: &Move) -> Vec<u8> {
    let us = board.side_to_move;
    let mut rivals = attackers_of_kind(board, mv.to, us, mv.piece) & !(1u64 << mv.from);
    let mut sources = Vec::new();
    while rivals != 0 {
        let from = rivals.trailing_zeros() as u8;
        rivals &= rivals - 1;

        let mut alternative = Move::new(from, mv.to, mv.piece);
        alternative.captured_piece = mv.captured_piece;
        let mut scratch = board.clone();
        scratch.make_move(alternative);
        // A pinned rival does not need disambiguating
        if !is_king_in_check(&scratch, us) {
            sources.push(from);
        }
    }
    sources
}

fn disambiguation(board: &Board, mv: &Move) -> String {
    let rivals = rival_sources(board, mv);
    if rivals.is_empty() {
        return String::new();
    }
    let from_name = square_name(mv.from);
    let (file, rank) = from_name.split_at(1);
    if rivals.iter().all(|&sq| sq % 8 != mv.from % 8) {
        file.to_string()
    } else if rivals.iter().all(|&sq| sq / 8 != mv.from / 8) {
        rank.to_string()
    } else {
        from_name
    }
}

fn san_for(board: &Board, mv: &Move) -> String {
    if mv.is_castling {
        return if mv.to > mv.from { "O-O".to_string() } else { "O-O-O".to_string() };
    }

    let mut san = String::new();
    if mv.piece == Piece::Pawn {
        if mv.captured_piece.is_some() {
            san.push((b'a' + mv.from % 8) as char);
        }
    } else {
        san.push(mv.piece.letter());
        san.push_str(&disambiguation(board, mv));
    }
    if mv.captured_piece.is_some() {
        san.push('x');
    }
    san.push_str(&square_name(mv.to));
    if let Some(promotion) = mv.promotion {
        san.push('=');
        san.push(promotion.letter());
    }
    san
}

/// Converts one engine move to algebraic notation and applies it to `position`.
///
/// Returns the algebraic text and whether the move was a castle. On return the
/// position has the move played: side to move flipped, the fullmove number
/// advanced after a Black move, and for castling the rook relocated.
pub fn to_algebraic(engine_move: &str, position: &mut Board) -> EngineResult<(String, bool)> {
    let mv = parse_coordinate_move(position, engine_move)?;
    let mut san = san_for(position, &mv);
    position.make_move(mv);
    if is_king_in_check(position, position.side_to_move) {
        san.push('+');
    }
    Ok((san, mv.is_castling))
}

/// Renders a principal line with move numbers, e.g. `1.e4 e5 2.Nf3`.
///
/// Replays on a private copy of `start`. Rendering stops at the first move that
/// cannot be resolved, so a partially bogus line still shows its valid prefix.
pub fn format_line<S: AsRef<str>>(moves: &[S], start: &Board) -> String {
    let mut working = start.clone();
    let mut parts: Vec<String> = Vec::with_capacity(moves.len());

    for (i, engine_move) in moves.iter().enumerate() {
        let number = working.fullmove_number;
        let mover = working.side_to_move;
        let san = match to_algebraic(engine_move.as_ref(), &mut working) {
            Ok((san, _)) => san,
            Err(err) => {
                debug!("stopped rendering line at {}: {}", engine_move.as_ref(), err);
                break;
            }
        };
        match (mover, i) {
            (Color::White, _) => parts.push(format!("{number}.{san}")),
            (Color::Black, 0) => parts.push(format!("{number}...{san}")),
            (Color::Black, _) => parts.push(san),
        }
    }

    parts.join(" ")
}
