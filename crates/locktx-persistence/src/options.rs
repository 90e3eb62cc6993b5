//! Per-transaction options
//!
//! Options are values describing a transformation of [`TransactionOptions`].
//! A transaction folds its options, in order, over the default value, so
//! repeated lock options accumulate and the last timeout option wins.

use std::fmt;
use std::time::Duration;

use crate::cancel::CancelSignal;

/// Configuration applied to one coordinated transaction
#[derive(Clone, Debug, Default)]
pub struct TransactionOptions {
    locks: Vec<String>,
    lock_timeout_secs: u8,
    cancel: Option<CancelSignal>,
}

impl TransactionOptions {
    /// Build options by applying each transformation in order
    pub fn from_options<I>(options: I) -> Self
    where
        I: IntoIterator<Item = TxOption>,
    {
        options
            .into_iter()
            .fold(Self::default(), |opts, option| option.apply(opts))
    }

    /// Append a lock name to acquire
    pub fn advisory_lock(mut self, name: impl Into<String>) -> Self {
        self.locks.push(name.into());
        self
    }

    /// Bound lock waits to `seconds`; `0` disables the bound
    pub fn lock_timeout(mut self, seconds: u8) -> Self {
        self.lock_timeout_secs = seconds;
        self
    }

    pub fn cancel_signal(mut self, signal: CancelSignal) -> Self {
        self.cancel = Some(signal);
        self
    }

    /// Requested lock names, duplicates included, in request order
    pub fn locks(&self) -> &[String] {
        &self.locks
    }

    pub fn lock_timeout_secs(&self) -> Option<u8> {
        (self.lock_timeout_secs > 0).then_some(self.lock_timeout_secs)
    }

    pub fn lock_timeout_duration(&self) -> Option<Duration> {
        self.lock_timeout_secs()
            .map(|secs| Duration::from_secs(u64::from(secs)))
    }

    pub fn cancel(&self) -> Option<&CancelSignal> {
        self.cancel.as_ref()
    }
}

/// One transformation of [`TransactionOptions`]
pub struct TxOption(Box<dyn FnOnce(TransactionOptions) -> TransactionOptions + Send>);

impl TxOption {
    pub fn new<F>(f: F) -> Self
    where
        F: FnOnce(TransactionOptions) -> TransactionOptions + Send + 'static,
    {
        Self(Box::new(f))
    }

    pub fn apply(self, options: TransactionOptions) -> TransactionOptions {
        (self.0)(options)
    }
}

impl fmt::Debug for TxOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("TxOption")
    }
}

/// Acquire the advisory lock `name` for the transaction (repeatable)
pub fn with_advisory_lock(name: impl Into<String>) -> TxOption {
    let name = name.into();
    TxOption::new(move |opts| opts.advisory_lock(name))
}

/// Abort lock waits after `seconds` via a transaction-local `lock_timeout`
pub fn with_lock_timeout(seconds: u8) -> TxOption {
    TxOption::new(move |opts| opts.lock_timeout(seconds))
}

/// Attach a cancellation signal to the transaction
pub fn with_cancel_signal(signal: CancelSignal) -> TxOption {
    TxOption::new(move |opts| opts.cancel_signal(signal))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_has_nothing_configured() {
        let opts = TransactionOptions::from_options([]);
        assert!(opts.locks().is_empty());
        assert_eq!(opts.lock_timeout_secs(), None);
        assert!(opts.cancel().is_none());
    }

    #[test]
    fn test_locks_accumulate_in_order() {
        let opts = TransactionOptions::from_options([
            with_advisory_lock("test1"),
            with_advisory_lock("test2"),
            with_advisory_lock("test1"),
        ]);
        assert_eq!(opts.locks(), ["test1", "test2", "test1"]);
    }

    #[test]
    fn test_last_timeout_wins() {
        let opts = TransactionOptions::from_options([
            with_lock_timeout(5),
            with_advisory_lock("a"),
            with_lock_timeout(1),
        ]);
        assert_eq!(opts.lock_timeout_secs(), Some(1));
        assert_eq!(opts.lock_timeout_duration(), Some(Duration::from_secs(1)));

        let opts = TransactionOptions::from_options([with_lock_timeout(3), with_lock_timeout(0)]);
        assert_eq!(opts.lock_timeout_secs(), None);
    }

    #[test]
    fn test_cancel_signal_attached() {
        let signal = CancelSignal::new();
        let opts = TransactionOptions::from_options([with_cancel_signal(signal.clone())]);

        signal.cancel();
        assert!(opts.cancel().is_some_and(CancelSignal::is_cancelled));
    }
}
