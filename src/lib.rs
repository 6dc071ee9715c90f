//! Keeps a per-domain ledger of how long browser tabs hold focus.
//! The browser side forwards its tab and window events as JSON lines, `serve` turns them into
//! closed focus intervals on disk and `report` summarizes a day of them.
//!

pub mod cli;
pub mod fs;
pub mod host;
pub mod storage;
pub mod tracker;
pub mod utils;
