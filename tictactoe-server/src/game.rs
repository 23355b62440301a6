//! 틱택토 게임 로직
//!
//! "사라지는 말" 규칙이 적용된 3x3 보드를 관리합니다.
//! 최근에 놓인 칸 6개만 기록하고, 7번째 수가 놓이면 가장 오래된 칸을 비웁니다.
//! 결과적으로 각 플레이어는 최근 3개의 말만 보드에 남아 무승부가 나지 않습니다.
//!
//! ```text
//!  0 | 1 | 2
//! ---+---+---
//!  3 | 4 | 5
//! ---+---+---
//!  6 | 7 | 8
//! ```

use std::collections::VecDeque;

use thiserror::Error;

/// 보드 칸 수
pub const BOARD_CELLS: usize = 9;

/// 기록하는 최근 수의 최대 개수
pub const HISTORY_CAPACITY: usize = 6;

/// 플레이어 번호 (방에 입장한 순서: 0 또는 1)
pub type PlayerNumber = u8;

/// 승리 조건이 되는 8개의 삼목 라인
pub const WIN_LINES: [[usize; 3]; 8] = [
    [0, 1, 2], // 첫 번째 행
    [3, 4, 5], // 두 번째 행
    [6, 7, 8], // 세 번째 행
    [0, 3, 6], // 첫 번째 열
    [1, 4, 7], // 두 번째 열
    [2, 5, 8], // 세 번째 열
    [0, 4, 8], // 대각선 \
    [2, 4, 6], // 대각선 /
];

/// 수 거부 사유
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MoveError {
    #[error("칸 번호가 범위를 벗어났습니다: {0}")]
    IndexOutOfRange(usize),

    #[error("이미 말이 놓인 칸입니다: {0}")]
    CellOccupied(usize),

    #[error("차례가 아닙니다 (현재 차례: 플레이어 {expected}, 요청: 플레이어 {actual})")]
    OutOfTurn {
        expected: PlayerNumber,
        actual: PlayerNumber,
    },

    #[error("플레이어 번호가 좌석과 일치하지 않습니다 (좌석: {seat}, 요청: {claimed})")]
    PlayerMismatch { seat: PlayerNumber, claimed: i32 },

    #[error("잘못된 플레이어 번호입니다: {0}")]
    InvalidPlayer(i32),

    #[error("게임이 진행 중이 아닙니다")]
    NotPlaying,

    #[error("방에 입장한 플레이어가 아닙니다")]
    NotAnOccupant,
}

/// 수 검증 규칙
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MoveRules {
    /// 플레이어 0부터 번갈아 두도록 강제
    pub enforce_turn_order: bool,
    /// 빈 칸에만 둘 수 있도록 강제
    pub enforce_empty_cell: bool,
}

impl MoveRules {
    /// 차례와 빈 칸을 모두 검사하는 규칙
    pub const STRICT: Self = Self {
        enforce_turn_order: true,
        enforce_empty_cell: true,
    };

    /// 칸 범위만 검사하는 예전 클라이언트 호환 규칙
    ///
    /// 이미 말이 있는 칸에 두면 주인이 바뀌고, 그 칸의 이전 기록은 지워져
    /// 새 말이 가장 최근 말로 취급됩니다.
    pub const LOOSE: Self = Self {
        enforce_turn_order: false,
        enforce_empty_cell: false,
    };

    pub fn from_strict_flag(strict: bool) -> Self {
        if strict {
            Self::STRICT
        } else {
            Self::LOOSE
        }
    }
}

impl Default for MoveRules {
    fn default() -> Self {
        Self::STRICT
    }
}

/// 한 수를 적용한 결과
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoveOutcome {
    pub index: usize,
    pub player: PlayerNumber,
    /// 오래되어 비워진 칸
    pub evicted: Option<usize>,
    pub winner: Option<PlayerNumber>,
}

/// 게임 보드
#[derive(Debug, Clone, Default)]
pub struct GameBoard {
    cells: [Option<PlayerNumber>; BOARD_CELLS],
    history: VecDeque<usize>,
    moves_played: u32,
}

impl GameBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cells(&self) -> &[Option<PlayerNumber>; BOARD_CELLS] {
        &self.cells
    }

    pub fn cell(&self, index: usize) -> Option<PlayerNumber> {
        self.cells.get(index).copied().flatten()
    }

    /// 최근에 채워진 칸 번호 (오래된 순)
    pub fn history(&self) -> impl Iterator<Item = usize> + '_ {
        self.history.iter().copied()
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    pub fn occupied_count(&self) -> usize {
        self.cells.iter().filter(|cell| cell.is_some()).count()
    }

    pub fn moves_played(&self) -> u32 {
        self.moves_played
    }

    /// 다음에 둘 차례인 플레이어
    pub fn next_player(&self) -> PlayerNumber {
        (self.moves_played % 2) as PlayerNumber
    }

    /// 보드를 초기 상태로 되돌립니다.
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// 수를 적용합니다.
    ///
    /// 1. 규칙에 따라 수를 검증합니다.
    /// 2. 칸에 말을 놓고 기록 큐에 칸 번호를 넣습니다.
    /// 3. 기록이 6개를 넘으면 가장 오래된 칸을 꺼내 비웁니다.
    /// 4. 8개의 라인을 검사해 승자를 판정합니다.
    ///
    /// # Errors
    ///
    /// * `MoveError::IndexOutOfRange` - 칸 번호가 0..9 밖인 경우 (규칙과 무관하게 항상 검사)
    /// * `MoveError::CellOccupied` - 빈 칸 검사가 켜져 있고 이미 말이 있는 경우
    /// * `MoveError::OutOfTurn` - 차례 검사가 켜져 있고 차례가 아닌 경우
    pub fn apply_move(
        &mut self,
        index: usize,
        player: PlayerNumber,
        rules: MoveRules,
    ) -> Result<MoveOutcome, MoveError> {
        if index >= BOARD_CELLS {
            return Err(MoveError::IndexOutOfRange(index));
        }
        if rules.enforce_turn_order && player != self.next_player() {
            return Err(MoveError::OutOfTurn {
                expected: self.next_player(),
                actual: player,
            });
        }
        if rules.enforce_empty_cell && self.cells[index].is_some() {
            return Err(MoveError::CellOccupied(index));
        }

        if self.cells[index].is_some() {
            self.history.retain(|&placed| placed != index);
        }
        self.cells[index] = Some(player);
        self.history.push_back(index);
        self.moves_played += 1;

        let mut evicted = None;
        if self.history.len() > HISTORY_CAPACITY {
            if let Some(oldest) = self.history.pop_front() {
                self.cells[oldest] = None;
                evicted = Some(oldest);
            }
        }

        Ok(MoveOutcome {
            index,
            player,
            evicted,
            winner: check_winner(&self.cells),
        })
    }
}

/// 승자를 판정합니다.
///
/// 한 라인의 세 칸이 모두 같은 플레이어의 말이어야 승리입니다.
/// 빈 칸은 어떤 플레이어와도 일치하지 않습니다.
pub fn check_winner(cells: &[Option<PlayerNumber>; BOARD_CELLS]) -> Option<PlayerNumber> {
    WIN_LINES.iter().find_map(|&[a, b, c]| match (cells[a], cells[b], cells[c]) {
        (Some(x), Some(y), Some(z)) if x == y && y == z => Some(x),
        _ => None,
    })
}
