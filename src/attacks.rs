use crate::board::{Board, Color, Piece};

const KNIGHT_STEPS: [(i8, i8); 8] = [
    (-2, -1), (-2, 1), (-1, -2), (-1, 2),
    (1, -2), (1, 2), (2, -1), (2, 1),
];

const KING_STEPS: [(i8, i8); 8] = [
    (-1, -1), (-1, 0), (-1, 1),
    (0, -1), (0, 1),
    (1, -1), (1, 0), (1, 1),
];

const DIAGONALS: [(i8, i8); 4] = [(1, 1), (1, -1), (-1, 1), (-1, -1)];
const ORTHOGONALS: [(i8, i8); 4] = [(1, 0), (-1, 0), (0, 1), (0, -1)];

fn step_targets(square: u8, steps: &[(i8, i8)]) -> u64 {
    let rank = (square / 8) as i8;
    let file = (square % 8) as i8;
    let mut targets = 0u64;
    for &(dr, df) in steps {
        let (r, f) = (rank + dr, file + df);
        if (0..8).contains(&r) && (0..8).contains(&f) {
            targets |= 1u64 << (r * 8 + f);
        }
    }
    targets
}

fn ray_targets(square: u8, directions: &[(i8, i8)], occupied: u64) -> u64 {
    let mut targets = 0u64;
    for &(dr, df) in directions {
        let mut rank = (square / 8) as i8;
        let mut file = (square % 8) as i8;
        loop {
            rank += dr;
            file += df;
            if !(0..8).contains(&rank) || !(0..8).contains(&file) {
                break;
            }
            let target = 1u64 << (rank * 8 + file);
            targets |= target;
            // Stop at the first piece in this direction
            if occupied & target != 0 {
                break;
            }
        }
    }
    targets
}

/// Squares from which a pawn of `color` would attack `square`.
fn pawn_sources(square: u8, color: Color) -> u64 {
    let rank = square / 8;
    let file = square % 8;
    let mut sources = 0u64;
    match color {
        Color::White if rank > 0 => {
            if file > 0 {
                sources |= 1u64 << (square - 9);
            }
            if file < 7 {
                sources |= 1u64 << (square - 7);
            }
        }
        Color::Black if rank < 7 => {
            if file > 0 {
                sources |= 1u64 << (square + 7);
            }
            if file < 7 {
                sources |= 1u64 << (square + 9);
            }
        }
        _ => {}
    }
    sources
}

/// Bitboard of `attacker`'s pieces of kind `piece` that attack `square`.
pub fn attackers_of_kind(board: &Board, square: u8, attacker: Color, piece: Piece) -> u64 {
    let pieces = board.pieces(attacker)[piece.index()];
    let occupied = board.occupied();
    let reach = match piece {
        Piece::Pawn => pawn_sources(square, attacker),
        Piece::Knight => step_targets(square, &KNIGHT_STEPS),
        Piece::King => step_targets(square, &KING_STEPS),
        Piece::Bishop => ray_targets(square, &DIAGONALS, occupied),
        Piece::Rook => ray_targets(square, &ORTHOGONALS, occupied),
        Piece::Queen => {
            ray_targets(square, &DIAGONALS, occupied) | ray_targets(square, &ORTHOGONALS, occupied)
        }
    };
    reach & pieces
}

pub fn is_square_under_attack(board: &Board, square: u8, attacker: Color) -> bool {
    Piece::ALL
        .iter()
        .any(|&piece| attackers_of_kind(board, square, attacker, piece) != 0)
}

pub fn is_king_in_check(board: &Board, color: Color) -> bool {
    match board.king_square(color) {
        Some(king) => is_square_under_attack(board, king, color.opposite()),
        None => false,
    }
}
