use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use ferry_core::traits::CompletionGate;

/// Completion gate that allows finishing once the model has produced at
/// least one user-facing answer this turn.
#[derive(Debug, Default)]
pub struct AnswerGate {
    answers: AtomicUsize,
    complete: AtomicBool,
}

impl AnswerGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn answers(&self) -> usize {
        self.answers.load(Ordering::SeqCst)
    }
}

impl CompletionGate for AnswerGate {
    fn can_complete(&self) -> bool {
        self.answers() > 0
    }

    fn mark_complete(&self) {
        self.complete.store(true, Ordering::SeqCst);
    }

    fn is_complete(&self) -> bool {
        self.complete.load(Ordering::SeqCst)
    }

    fn record_answer(&self) {
        self.answers.fetch_add(1, Ordering::SeqCst);
    }

    fn reset(&self) {
        self.answers.store(0, Ordering::SeqCst);
        self.complete.store(false, Ordering::SeqCst);
    }
}
