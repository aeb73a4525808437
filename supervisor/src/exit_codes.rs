//! Stable exit codes for the supervisor CLI.

/// All work complete: completion sentinel seen, or the store reports nothing
/// pending or in progress.
pub const OK: i32 = 0;
/// Iteration budget exhausted with work remaining. Rerunning resumes.
pub const BUDGET_EXHAUSTED: i32 = 1;
/// Fatal startup or configuration error; no loop progress was possible.
pub const FATAL: i32 = 2;
