//! Failure classification.
//!
//! Decides whether an error returned by a guarded operation counts toward the
//! breaker's failure budget. Errors that are expected answers rather than
//! symptoms of an unhealthy dependency should not trip the circuit.

use std::error::Error;
use std::fmt;
use std::sync::Arc;

type Predicate = dyn Fn(&(dyn Error + 'static)) -> bool + Send + Sync;

/// Predicate over errors: `true` means the failure counts.
#[derive(Clone)]
pub struct FailureClassifier {
    predicate: Arc<Predicate>,
}

impl FailureClassifier {
    /// Every error counts.
    pub fn always() -> Self {
        Self::from_fn(|_| true)
    }

    /// Classify with an arbitrary predicate over type-erased errors.
    pub fn from_fn<F>(predicate: F) -> Self
    where
        F: Fn(&(dyn Error + 'static)) -> bool + Send + Sync + 'static,
    {
        Self {
            predicate: Arc::new(predicate),
        }
    }

    /// Classify errors of type `E` with `predicate`; errors of any other type count.
    pub fn for_error<E, F>(predicate: F) -> Self
    where
        E: Error + 'static,
        F: Fn(&E) -> bool + Send + Sync + 'static,
    {
        Self::from_fn(move |err| match err.downcast_ref::<E>() {
            Some(err) => predicate(err),
            None => true,
        })
    }

    /// Whether `err` counts toward the failure budget.
    pub fn counts(&self, err: &(dyn Error + 'static)) -> bool {
        (self.predicate)(err)
    }
}

impl Default for FailureClassifier {
    fn default() -> Self {
        Self::always()
    }
}

impl fmt::Debug for FailureClassifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FailureClassifier").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_default_counts_everything() {
        let classifier = FailureClassifier::default();
        let err = io::Error::new(io::ErrorKind::NotFound, "missing");
        assert!(classifier.counts(&err));
    }

    #[test]
    fn test_typed_predicate() {
        let classifier =
            FailureClassifier::for_error::<io::Error, _>(|e| e.kind() != io::ErrorKind::NotFound);

        let not_found = io::Error::new(io::ErrorKind::NotFound, "missing");
        let refused = io::Error::new(io::ErrorKind::ConnectionRefused, "refused");
        let other = std::fmt::Error;

        assert!(!classifier.counts(&not_found));
        assert!(classifier.counts(&refused));
        assert!(classifier.counts(&other));
    }
}
