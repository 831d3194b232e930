//! Ordered fallback over candidate strategies.
//!
//! Candidates are tried strictly in the order given. The first success wins;
//! every failure is kept and reported together if nothing succeeds.

use std::fmt::Display;
use std::sync::atomic::{AtomicBool, Ordering};

use cmpforge_core::{ComparatorError, Result};
use tracing::{debug, trace};

/// Runs candidates in order until one produces a value.
#[derive(Debug)]
pub struct Fallback<'a> {
    context: String,
    interrupt: Option<&'a AtomicBool>,
}

impl<'a> Fallback<'a> {
    /// `context` names what is being resolved in the aggregate error.
    pub fn new(context: impl Into<String>) -> Self {
        Self {
            context: context.into(),
            interrupt: None,
        }
    }

    /// Checks `flag` before each candidate and aborts once it is set.
    pub fn with_interrupt(mut self, flag: &'a AtomicBool) -> Self {
        self.interrupt = Some(flag);
        self
    }

    /// Applies `action` to each candidate.
    ///
    /// `Ok(Some(_))` wins, `Ok(None)` declines, `Err(_)` is chained and the
    /// walk continues. Fatal errors (interruption, a nested aggregate) abort
    /// the walk and propagate unchanged.
    pub fn apply<C, R, I, F>(self, candidates: I, mut action: F) -> Result<R>
    where
        I: IntoIterator<Item = C>,
        C: Display,
        F: FnMut(C) -> Result<Option<R>>,
    {
        let mut causes = Vec::new();
        for candidate in candidates {
            if self
                .interrupt
                .is_some_and(|flag| flag.load(Ordering::Acquire))
            {
                return Err(ComparatorError::Interrupted);
            }
            let label = candidate.to_string();
            match action(candidate) {
                Ok(Some(value)) => return Ok(value),
                Ok(None) => trace!(context = %self.context, candidate = %label, "Candidate declined"),
                Err(err) if err.is_fatal() => return Err(err),
                Err(err) => {
                    debug!(
                        context = %self.context,
                        candidate = %label,
                        error = %err,
                        "Candidate failed"
                    );
                    causes.push(err);
                }
            }
        }
        Err(ComparatorError::NoStrategiesAvailable {
            context: self.context,
            causes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_success_wins() {
        let mut tried = Vec::new();
        let result = Fallback::new("numbers").apply([1, 2, 3], |n| {
            tried.push(n);
            if n == 2 {
                Ok(Some(n * 10))
            } else {
                Err(ComparatorError::InvalidArgument(format!("{n}")))
            }
        });
        assert_eq!(result.unwrap(), 20);
        assert_eq!(tried, vec![1, 2]);
    }

    #[test]
    fn test_declined_candidates_are_not_causes() {
        let err = Fallback::new("nothing")
            .apply(["a", "b"], |_| Ok::<Option<()>, _>(None))
            .unwrap_err();
        assert!(matches!(
            err,
            ComparatorError::NoStrategiesAvailable { ref causes, .. } if causes.is_empty()
        ));
    }

    #[test]
    fn test_exhaustion_chains_every_cause_in_order() {
        let err = Fallback::new("backends")
            .apply(["x", "y"], |c| {
                Err::<Option<()>, _>(ComparatorError::InvalidArgument(c.to_string()))
            })
            .unwrap_err();
        let causes = err.causes();
        assert_eq!(causes.len(), 2);
        assert!(matches!(&causes[0], ComparatorError::InvalidArgument(m) if m == "x"));
        assert!(matches!(&causes[1], ComparatorError::InvalidArgument(m) if m == "y"));
        assert!(err.to_string().contains("backends"));
    }

    #[test]
    fn test_empty_list_fails_immediately() {
        let candidates: Vec<&str> = Vec::new();
        let err = Fallback::new("empty")
            .apply(candidates, |_| Ok(Some(())))
            .unwrap_err();
        assert!(matches!(err, ComparatorError::NoStrategiesAvailable { .. }));
    }

    #[test]
    fn test_interrupt_aborts_before_next_candidate() {
        let flag = AtomicBool::new(false);
        let mut calls = 0;
        let err = Fallback::new("interruptible")
            .with_interrupt(&flag)
            .apply([1, 2, 3], |_| {
                calls += 1;
                flag.store(true, Ordering::Release);
                Err::<Option<()>, _>(ComparatorError::InvalidArgument("boom".into()))
            })
            .unwrap_err();
        assert!(matches!(err, ComparatorError::Interrupted));
        assert_eq!(calls, 1);
    }

    #[test]
    fn test_fatal_errors_propagate_unchanged() {
        let mut calls = 0;
        let err = Fallback::new("outer")
            .apply([1, 2], |_| {
                calls += 1;
                Err::<Option<()>, _>(ComparatorError::NoStrategiesAvailable {
                    context: "inner".into(),
                    causes: Vec::new(),
                })
            })
            .unwrap_err();
        assert_eq!(calls, 1);
        assert!(matches!(err, ComparatorError::NoStrategiesAvailable { ref context, .. } if context == "inner"));

        let err = Fallback::new("outer")
            .apply([1], |_| Err::<Option<()>, _>(ComparatorError::Interrupted))
            .unwrap_err();
        assert!(matches!(err, ComparatorError::Interrupted));
    }
}
