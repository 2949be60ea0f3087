//! Plinko execution layer.
//!
//! Derives board geometry and payout curves, resolves drops with a seeded random walk, and settles
//! every balance change through the [`Ledger`].
//!
//! ## Ledger invariants
//! - Every balance change is computed from state read inside the same atomic batch that writes it.
//! - A committed batch is applied exactly once; a conflicting batch is recomputed, never merged.
//! - Change events are published only after a batch commits.
//! - Account events carry the account revision; readers order balances by it, not by arrival.
//!
//! ## Minimal round (example)
//! ```rust
//! # async fn example() -> Result<(), plinko_execution::ledger::Error> {
//! use plinko_execution::{curve::curve_for, drop::DropSimulator, state::Memory, Ledger};
//! use plinko_types::{AccountId, Amount, BoardConfig, GameMode};
//!
//! let ledger = Ledger::new(Memory::new());
//! let player = AccountId::new("player-1")?;
//! let board = BoardConfig::default();
//! let curve = curve_for(board)?;
//!
//! let bet = ledger
//!     .place_bet(&player, Amount::from_units(10), GameMode::Demo, board)
//!     .await?;
//! let mut simulator = DropSimulator::new(7);
//! if let Some(landing) = simulator.resolve(&curve).await {
//!     ledger.settle(&landing.outcome(&bet)).await?;
//! }
//! # Ok(())
//! # }
//! ```

pub mod board;
pub mod clock;
pub mod curve;
pub mod drop;
pub mod feed;
pub mod ledger;
pub mod reconcile;
pub mod sequencer;
pub mod state;

#[cfg(any(test, feature = "mocks"))]
pub mod mocks;

pub use board::BoardGeometry;
pub use clock::{Clock, SystemClock};
pub use curve::{curve_for, generate_curve};
pub use drop::{CenterBias, DropSimulator, DropToken, Landing};
pub use feed::{ChangeEvent, Feed, Subscription, UpdatesFilter};
pub use ledger::{Admin, Error, Ledger, LedgerStats, Settlement, StatusChange};
pub use reconcile::{PendingOp, SharedBalance, TentativeBalance};
pub use sequencer::{
    DropSource, Sequencer, SequencerConfig, SequencerReport, StopHandle, StopReason,
};
pub use state::{Memory, State};
