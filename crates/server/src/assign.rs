//! Assignment protocol.
//!
//! Applies a [`Choice`] to a session's current snapshot. The whole
//! read-check-apply-append sequence runs under the session lock, so a
//! concurrent request for the same session sees the snapshot from either
//! before or after the assignment, never in between. A rejection leaves the
//! history exactly as it was.

use susen_puzzle::{Choice, PuzzleEngine, PuzzleError, Snapshot, Square};

use crate::session::Session;

/// Assign `choice` in `session` and return the resulting squares.
///
/// Fails with `DuplicateAssignment` when the target square already holds a
/// value; otherwise any engine rejection is returned unchanged.
pub fn assign(
    session: &Session,
    engine: &dyn PuzzleEngine,
    choice: Choice,
) -> Result<Vec<Square>, PuzzleError> {
    let next = apply_to_current(session, engine, choice)?;
    Ok(next.squares())
}

fn apply_to_current(
    session: &Session,
    engine: &dyn PuzzleEngine,
    choice: Choice,
) -> Result<Snapshot, PuzzleError> {
    session.update(|history| {
        let current = history.current();
        if let Some(assigned) = current.value(choice.index).filter(|&v| v != 0) {
            return Err(PuzzleError::duplicate_assignment(choice.index, assigned));
        }
        let next = engine.apply(current, choice)?;
        history.append(next.clone());
        Ok(next)
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::session::{EffectiveScheme, HistoryLog, Scheme, SessionId};
    use susen_puzzle::{Catalog, Condition, Sudoku};
    use tokio::time::Instant;

    fn engine() -> Sudoku {
        Sudoku::new(Catalog::with_builtins().unwrap())
    }

    fn session_on(engine: &Sudoku, puzzle: &str) -> Session {
        Session::new(
            SessionId::from_bytes(&[1; 32]),
            EffectiveScheme::transport(Scheme::Http),
            engine.initial_snapshot(puzzle).unwrap(),
            Instant::now(),
        )
    }

    /// Engine that counts calls and rejects everything.
    struct Refusing {
        calls: AtomicUsize,
    }

    impl PuzzleEngine for Refusing {
        fn initial_snapshot(&self, name: &str) -> Result<Snapshot, PuzzleError> {
            Err(PuzzleError::puzzle_not_found(name))
        }

        fn apply(&self, _: &Snapshot, _: Choice) -> Result<Snapshot, PuzzleError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(PuzzleError::new(Condition::Unsolvable, vec![], "refused"))
        }
    }

    #[test]
    fn test_assign_appends_snapshot() {
        let engine = engine();
        let session = session_on(&engine, "2-star");
        let squares = assign(&session, &engine, Choice { index: 1, value: 8 }).unwrap();
        assert_eq!(squares[0].aval, 8);
        session.view(|history| {
            assert_eq!(history.depth(), 2);
            assert_eq!(history.cursor(), 1);
            assert_eq!(history.current().value(1), Some(8));
        });
    }

    #[test]
    fn test_duplicate_assignment_does_not_reach_engine() {
        let engine = engine();
        let session = session_on(&engine, "2-star");
        let refusing = Refusing {
            calls: AtomicUsize::new(0),
        };

        let err = assign(&session, &refusing, Choice { index: 3, value: 5 }).unwrap_err();
        assert_eq!(err.condition, Condition::DuplicateAssignment);
        assert_eq!(refusing.calls.load(Ordering::SeqCst), 0);
        assert_eq!(session.view(HistoryLog::depth), 1);
    }

    #[test]
    fn test_engine_rejection_is_surfaced_unchanged() {
        let engine = engine();
        let session = session_on(&engine, "2-star");
        let before = session.current();

        let err = assign(&session, &engine, Choice { index: 1, value: 5 }).unwrap_err();
        assert_eq!(err.condition, Condition::Conflict);
        assert_eq!(session.current(), before);
        assert_eq!(session.view(HistoryLog::depth), 1);

        let refusing = Refusing {
            calls: AtomicUsize::new(0),
        };
        let err = assign(&session, &refusing, Choice { index: 1, value: 8 }).unwrap_err();
        assert_eq!(err.condition, Condition::Unsolvable);
        assert_eq!(refusing.calls.load(Ordering::SeqCst), 1);
        assert_eq!(session.current(), before);
    }

    #[test]
    fn test_back_after_assign_restores_squares() {
        let engine = engine();
        let session = session_on(&engine, "2-star");
        let before = session.current().squares();

        assign(&session, &engine, Choice { index: 1, value: 8 }).unwrap();
        assert!(session.back());
        assert_eq!(session.current().squares(), before);
    }

    #[test]
    fn test_racing_assignments_to_one_square() {
        let engine = Arc::new(engine());
        let session = session_on(&engine, "2-star");
        let results: Vec<_> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    scope.spawn(|| assign(&session, engine.as_ref(), Choice { index: 1, value: 8 }))
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        let accepted = results.iter().filter(|r| r.is_ok()).count();
        assert_eq!(accepted, 1);
        assert!(
            results
                .iter()
                .filter_map(|r| r.as_ref().err())
                .all(|e| e.condition == Condition::DuplicateAssignment)
        );
        assert_eq!(session.view(HistoryLog::depth), 2);
    }
}
